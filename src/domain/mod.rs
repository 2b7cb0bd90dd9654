//! Domain Layer
//!
//! Contains all domain entities and core abstractions.

mod collection;
mod collection_id;
mod error;
pub mod path;
mod query;

pub use collection::{Collection, CollectionTree, ExportCollectionState, NewCollection};
pub use collection_id::CollectionId;
pub use error::{DomainError, DomainResult};
pub use query::QueryItem;
