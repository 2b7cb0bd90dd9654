//! Collection Service - Import/Export
//!
//! A collection travels as one JSON document: the collection tree with
//! `version` and `type` header fields.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use super::collection_service::CollectionService;
use crate::domain::{
    path, CollectionId, CollectionTree, DomainError, DomainResult, ExportCollectionState,
    NewCollection,
};
use crate::tree::{build_trees, flatten_tree, FlattenMode};

pub const EXPORT_VERSION: u32 = 1;
pub const EXPORT_TYPE: &str = "collection";

#[async_trait]
pub trait CollectionTransfer {
    /// Document holding `id` and all of its descendants
    async fn export_data(&self, id: &CollectionId) -> DomainResult<ExportCollectionState>;

    async fn export_collection_json(&self, id: &CollectionId) -> DomainResult<String>;

    /// Create a copy of the document's tree under fresh ids. Returns the new
    /// ids, parents before children.
    async fn import_data(&self, document: ExportCollectionState) -> DomainResult<Vec<CollectionId>>;

    async fn import_collection_data_from_json(&self, text: &str)
        -> DomainResult<Vec<CollectionId>>;

    async fn import_collection_file(&self, file: &Path) -> DomainResult<Vec<CollectionId>>;
}

#[async_trait]
impl CollectionTransfer for CollectionService {
    async fn export_data(&self, id: &CollectionId) -> DomainResult<ExportCollectionState> {
        let root = self.get_collection(id).await?;
        let mut members = vec![root.clone()];
        members.extend(self.repo.query_by_path_prefix(&root.own_path(), true).await?);

        // The subtree root is the only member whose parent is outside the set
        let tree = build_trees(&members)
            .into_iter()
            .find(|tree| tree.id == root.id)
            .ok_or_else(|| DomainError::Internal(format!("no tree built for {}", id)))?;

        log::debug!("Exporting {} collections under {}", tree.node_count(), id);
        Ok(ExportCollectionState {
            version: EXPORT_VERSION,
            kind: EXPORT_TYPE.to_string(),
            tree,
        })
    }

    async fn export_collection_json(&self, id: &CollectionId) -> DomainResult<String> {
        let document = self.export_data(id).await?;
        Ok(serde_json::to_string_pretty(&document)?)
    }

    async fn import_data(
        &self,
        document: ExportCollectionState,
    ) -> DomainResult<Vec<CollectionId>> {
        validate_header(u64::from(document.version), &document.kind)?;

        let tree = strip_server_ids(document.tree);
        let flattened = flatten_tree(&tree, "", FlattenMode::ReassignIds);

        let mut created = Vec::with_capacity(flattened.len());
        for collection in flattened {
            // Parent was created earlier in this loop (pre-order)
            let parent_id = path::parent_id(collection.parent_path.as_deref());
            let id = self
                .create_collection(NewCollection::from(collection), parent_id.as_ref())
                .await?;
            created.push(id);
        }
        log::info!("Imported {} collections", created.len());
        Ok(created)
    }

    async fn import_collection_data_from_json(
        &self,
        text: &str,
    ) -> DomainResult<Vec<CollectionId>> {
        let document = parse_document(text)?;
        self.import_data(document).await
    }

    async fn import_collection_file(&self, file: &Path) -> DomainResult<Vec<CollectionId>> {
        log::debug!("Importing collections from {}", file.display());
        let text = tokio::fs::read_to_string(file).await?;
        self.import_collection_data_from_json(&text).await
    }
}

/// Parse and check an import payload.
///
/// The header is checked on the raw JSON so a missing or wrong `version`
/// or `type` reports an invalid file instead of a decode error.
pub fn parse_document(text: &str) -> DomainResult<ExportCollectionState> {
    if text.trim().is_empty() {
        return Err(DomainError::invalid_document("String is empty."));
    }

    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Err(DomainError::invalid_document(
            "Invalid file: expected a JSON object",
        ));
    };

    let version = object
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| DomainError::invalid_document("Invalid file: missing version"))?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::invalid_document("Invalid file: missing type"))?;
    validate_header(version, kind)?;

    Ok(serde_json::from_value(value)?)
}

fn validate_header(version: u64, kind: &str) -> DomainResult<()> {
    if version != u64::from(EXPORT_VERSION) {
        return Err(DomainError::invalid_document(format!(
            "Invalid file: unsupported version {}",
            version
        )));
    }
    if kind != EXPORT_TYPE {
        return Err(DomainError::invalid_document(format!(
            "Invalid file: unexpected type {:?}",
            kind
        )));
    }
    Ok(())
}

/// Imported copies are local-only until pushed
fn strip_server_ids(mut tree: CollectionTree) -> CollectionTree {
    tree.server_id = None;
    for query in &mut tree.queries {
        query.server_id = None;
    }
    tree.collections = tree.collections.into_iter().map(strip_server_ids).collect();
    tree
}
