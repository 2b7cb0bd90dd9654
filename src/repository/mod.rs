//! Repository Layer
//!
//! Data access abstractions and implementations.

mod collection_repo;
mod db;
mod memory;
mod traits;


pub use collection_repo::CollectionRepository;
pub use db::SqliteStore;
pub use memory::MemoryStore;
pub use traits::{CollectionStore, CollectionTable, Filter, MonotonicClock, TxMode, TxWork};
