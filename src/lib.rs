//! Query Collections
//!
//! Saved GraphQL query collections kept in local storage and synced with a
//! remote service.
//!
//! Layered architecture:
//! - domain: Core entities, ids, paths and errors
//! - repository: Local store adapter over SQLite or memory
//! - tree: Nesting flat collections and flattening them back
//! - remote: Remote service and session contracts
//! - services: CRUD, sync and import/export operations

pub mod config;
pub mod domain;
pub mod logging;
pub mod remote;
pub mod repository;
pub mod services;
pub mod tree;

pub use config::{CollectionsConfig, RemoteConfig};
pub use domain::{
    Collection, CollectionId, CollectionTree, DomainError, DomainResult, ExportCollectionState,
    NewCollection, QueryItem,
};
pub use remote::{HttpRemoteApi, OfflineRemote, RemoteApi, SessionProvider, StaticSession, User};
pub use repository::{CollectionRepository, MemoryStore, SqliteStore};
pub use services::{CollectionService, CollectionSync, CollectionTransfer, SyncReport};
