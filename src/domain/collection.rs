//! Collection Entity
//!
//! Collections are folders of saved queries. The hierarchy is kept as a
//! materialized `parentPath` over a flat table; [`CollectionTree`] is the
//! nested, in-memory view used for export, import and recursive reads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::collection_id::CollectionId;
use super::path;
use super::query::QueryItem;

/// A stored collection record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: CollectionId,
    pub title: String,
    /// Ancestor ids, root first. `None` (or empty) for root collections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
    /// Identifier on the remote service. Present once a push succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default)]
    pub queries: Vec<QueryItem>,
    #[serde(rename = "created_at", default)]
    pub created_at: i64,
    #[serde(rename = "updated_at", default)]
    pub updated_at: i64,
    /// Other collection settings (description, environment, scripts ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Collection {
    pub fn new(id: impl Into<CollectionId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            parent_path: None,
            server_id: None,
            queries: Vec::new(),
            created_at: 0,
            updated_at: 0,
            extra: Map::new(),
        }
    }

    /// Check if this is a root collection (no parent)
    pub fn is_root(&self) -> bool {
        path::normalize(self.parent_path.as_deref()).is_none()
    }

    /// A collection is synced once the remote service knows about it
    pub fn is_synced(&self) -> bool {
        self.server_id.is_some()
    }

    pub fn parent_id(&self) -> Option<CollectionId> {
        path::parent_id(self.parent_path.as_deref())
    }

    /// The path this collection hands down to its children
    pub fn own_path(&self) -> String {
        path::child_path(path::normalize(self.parent_path.as_deref()), &self.id)
    }

    /// Index of the stored query `query` refers to (see [`QueryItem::matches`])
    pub fn find_query(&self, query: &QueryItem) -> Option<usize> {
        self.queries.iter().position(|q| q.matches(query))
    }
}

/// Input for creating a collection.
///
/// `id` is normally left empty and generated; import supplies the ids it
/// already reassigned so that children can find their parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCollection {
    pub id: Option<CollectionId>,
    pub title: String,
    pub server_id: Option<String>,
    pub queries: Vec<QueryItem>,
    pub extra: Map<String, Value>,
}

impl NewCollection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_queries(mut self, queries: Vec<QueryItem>) -> Self {
        self.queries = queries;
        self
    }
}

impl From<Collection> for NewCollection {
    fn from(collection: Collection) -> Self {
        Self {
            id: Some(collection.id),
            title: collection.title,
            server_id: collection.server_id,
            queries: collection.queries,
            extra: collection.extra,
        }
    }
}

/// Nested view of a collection and its descendants.
///
/// Never persisted. Rebuilt from the flat table on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTree {
    pub id: CollectionId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default)]
    pub queries: Vec<QueryItem>,
    #[serde(rename = "created_at", default)]
    pub created_at: i64,
    #[serde(rename = "updated_at", default)]
    pub updated_at: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(default)]
    pub collections: Vec<CollectionTree>,
}

impl CollectionTree {
    /// Tree node carrying every field of `collection`, without children yet
    pub fn leaf(collection: &Collection) -> Self {
        Self {
            id: collection.id.clone(),
            title: collection.title.clone(),
            server_id: collection.server_id.clone(),
            queries: collection.queries.clone(),
            created_at: collection.created_at,
            updated_at: collection.updated_at,
            extra: collection.extra.clone(),
            collections: Vec::new(),
        }
    }

    /// Flat record for this node under `parent_path`
    pub fn to_collection(&self, id: CollectionId, parent_path: Option<String>) -> Collection {
        let mut extra = self.extra.clone();
        extra.remove("parentPath");
        Collection {
            id,
            title: self.title.clone(),
            parent_path,
            server_id: self.server_id.clone(),
            queries: self.queries.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            extra,
        }
    }

    /// Number of nodes in this tree, including the root
    pub fn node_count(&self) -> usize {
        1 + self.collections.iter().map(CollectionTree::node_count).sum::<usize>()
    }
}

/// Portable export document: `{ version, type: "collection", ...tree }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportCollectionState {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub tree: CollectionTree,
}
