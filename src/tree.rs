//! Tree Utilities
//!
//! Conversion between the flat collection table and nested
//! [`CollectionTree`] values.

use std::collections::HashMap;

use crate::domain::{path, Collection, CollectionId, CollectionTree};

/// How ids are treated when flattening a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlattenMode {
    /// Keep the ids found in the tree (export)
    PreserveIds,
    /// Give every node a fresh id (import)
    ReassignIds,
}

/// Nest `collections` by their parent paths.
///
/// A collection whose parent is missing from the input is treated as a root,
/// so partial lists are accepted. Roots keep their input order, and so do
/// siblings.
pub fn build_trees(collections: &[Collection]) -> Vec<CollectionTree> {
    // Ids are matched by their path segment form so numeric and textual
    // records line up with the segments in parent paths
    let index: HashMap<String, usize> = collections
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.to_string(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); collections.len()];
    let mut roots = Vec::new();

    for (i, collection) in collections.iter().enumerate() {
        let parent = collection
            .parent_id()
            .and_then(|parent_id| index.get(&parent_id.to_string()).copied())
            .filter(|&p| p != i);
        match parent {
            Some(p) => children[p].push(i),
            None => roots.push(i),
        }
    }

    fn assemble(i: usize, collections: &[Collection], children: &[Vec<usize>]) -> CollectionTree {
        let mut node = CollectionTree::leaf(&collections[i]);
        node.collections = children[i]
            .iter()
            .map(|&c| assemble(c, collections, children))
            .collect();
        node
    }

    roots
        .into_iter()
        .map(|i| assemble(i, collections, &children))
        .collect()
}

/// Flatten `tree` in pre-order under `parent_path` (empty for a root).
///
/// Every node gets the path accumulated from its ancestors. With
/// [`FlattenMode::ReassignIds`] each node receives a fresh id before its
/// children's paths are computed, so children reference the new parent id.
pub fn flatten_tree(
    tree: &CollectionTree,
    parent_path: &str,
    mode: FlattenMode,
) -> Vec<Collection> {
    let mut flat = Vec::with_capacity(tree.node_count());
    flatten_into(tree, parent_path, mode, &mut flat);
    flat
}

fn flatten_into(
    node: &CollectionTree,
    parent_path: &str,
    mode: FlattenMode,
    flat: &mut Vec<Collection>,
) {
    let id = match mode {
        FlattenMode::PreserveIds => node.id.clone(),
        FlattenMode::ReassignIds => CollectionId::generate(),
    };
    let own_path = path::child_path(Some(parent_path), &id);
    let parent_path = (!parent_path.is_empty()).then(|| parent_path.to_string());
    flat.push(node.to_collection(id, parent_path));

    for child in &node.collections {
        flatten_into(child, &own_path, mode, flat);
    }
}
