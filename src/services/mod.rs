//! Service Module
//!
//! Collection operations split into specialized sub-modules:
//! - collection_service: Core CRUD and push operations
//! - sync: Remote-to-local reconciliation
//! - transfer: Export and import documents

mod collection_service;
mod sync;
mod transfer;

#[cfg(test)]
mod tests;

pub use collection_service::CollectionService;

// Re-export operation traits so they can be used by importing CollectionService
pub use sync::{CollectionSync, SyncReport};
pub use transfer::{parse_document, CollectionTransfer, EXPORT_TYPE, EXPORT_VERSION};
