//! Materialized Paths
//!
//! A collection's ancestry is stored as `/root/child/.../parent`, ordered
//! root first. Root collections carry no path (or an empty one).

use super::collection_id::CollectionId;

pub const SEPARATOR: char = '/';

/// Path handed to the children of the collection `parent_id` that itself
/// lives at `parent_path`
pub fn child_path(parent_path: Option<&str>, parent_id: &CollectionId) -> String {
    format!("{}{}{}", parent_path.unwrap_or(""), SEPARATOR, parent_id)
}

/// Ancestor ids encoded in `path`, root first
pub fn segments(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// Id of the immediate parent (last segment), `None` for roots
pub fn parent_id(parent_path: Option<&str>) -> Option<CollectionId> {
    parent_path
        .and_then(|path| segments(path).last().copied())
        .map(CollectionId::from_segment)
}

/// True when `path` is `base` or lies underneath it
pub fn is_within(path: &str, base: &str) -> bool {
    path == base
        || (path.starts_with(base) && path[base.len()..].starts_with(SEPARATOR))
}

/// Swap the leading `old_base` of `path` for `new_base`.
///
/// Returns `None` when `path` is not within `old_base`.
pub fn rebase(path: &str, old_base: &str, new_base: &str) -> Option<String> {
    if old_base.is_empty() {
        return Some(format!("{}{}", new_base, path));
    }
    if !is_within(path, old_base) {
        return None;
    }
    Some(format!("{}{}", new_base, &path[old_base.len()..]))
}

/// Normalise an optional path: empty strings mean "root"
pub fn normalize(path: Option<&str>) -> Option<&str> {
    path.filter(|p| !p.is_empty())
}
