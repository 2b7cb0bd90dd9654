//! Collection Identifier
//!
//! Older records were written with numeric keys, newer ones with string keys.
//! Both shapes refer to the same logical collection, so every storage access
//! probes the id together with its alternate representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a stored collection, either numeric or textual
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollectionId {
    Numeric(i64),
    Textual(String),
}

impl CollectionId {
    /// Fresh textual identifier for a newly created collection
    pub fn generate() -> Self {
        CollectionId::Textual(Uuid::new_v4().to_string())
    }

    /// Parse a path segment back into an identifier.
    ///
    /// Segments are always read as text; lookups reach numeric records
    /// through [`CollectionId::alternate`].
    pub fn from_segment(segment: &str) -> Self {
        CollectionId::Textual(segment.to_string())
    }

    /// The other representation of the same logical id.
    ///
    /// Numeric ids map to their decimal string. Textual ids map to their
    /// numeric parse, or `None` when the text is not a number.
    pub fn alternate(&self) -> Option<CollectionId> {
        match self {
            CollectionId::Numeric(n) => Some(CollectionId::Textual(n.to_string())),
            CollectionId::Textual(s) => s.trim().parse::<i64>().ok().map(CollectionId::Numeric),
        }
    }

    /// This id followed by its alternate, if any
    pub fn candidates(&self) -> Vec<CollectionId> {
        let mut ids = vec![self.clone()];
        ids.extend(self.alternate());
        ids
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionId::Numeric(n) => write!(f, "{}", n),
            CollectionId::Textual(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CollectionId {
    fn from(value: i64) -> Self {
        CollectionId::Numeric(value)
    }
}

impl From<&str> for CollectionId {
    fn from(value: &str) -> Self {
        CollectionId::Textual(value.to_string())
    }
}

impl From<String> for CollectionId {
    fn from(value: String) -> Self {
        CollectionId::Textual(value)
    }
}
