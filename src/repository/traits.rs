//! Repository Layer - Storage Engine Contract
//!
//! Defines the abstract interface of the flat collection table.
//! Implementations can use SQLite, in-memory, etc.
//!
//! The engine compares keys by exact representation: numeric `42` and
//! textual `"42"` are different keys. Probing both forms is the job of
//! [`super::CollectionRepository`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::domain::{path, Collection, CollectionId, DomainError, DomainResult};

/// Transaction scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Read,
    ReadWrite,
}

/// Where-clause over the collection table
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    IdEquals(CollectionId),
    ParentPathEquals(String),
    ParentPathStartsWith(String),
    ServerIdEquals(String),
    Or(Vec<Filter>),
}

impl Filter {
    /// Evaluate against a record. Missing parent paths compare as "".
    pub fn matches(&self, collection: &Collection) -> bool {
        let parent_path = collection.parent_path.as_deref().unwrap_or("");
        match self {
            Filter::IdEquals(id) => collection.id == *id,
            Filter::ParentPathEquals(p) => parent_path == p,
            Filter::ParentPathStartsWith(prefix) => parent_path.starts_with(prefix.as_str()),
            Filter::ServerIdEquals(server_id) => {
                collection.server_id.as_deref() == Some(server_id.as_str())
            }
            Filter::Or(filters) => filters.iter().any(|f| f.matches(collection)),
        }
    }

    /// Matches `id` or its alternate representation
    pub fn any_id(id: &CollectionId) -> Self {
        Filter::Or(id.candidates().into_iter().map(Filter::IdEquals).collect())
    }

    /// Records whose parent path is `base` or lies below it
    pub fn within(base: &str) -> Self {
        Filter::Or(vec![
            Filter::ParentPathEquals(base.to_string()),
            Filter::ParentPathStartsWith(format!("{}{}", base, path::SEPARATOR)),
        ])
    }
}

/// Table operations available inside a transaction
pub trait CollectionTable {
    fn get(&self, id: &CollectionId) -> DomainResult<Option<Collection>>;

    /// All records in insertion order
    fn all(&self) -> DomainResult<Vec<Collection>>;

    fn select(&self, filter: &Filter) -> DomainResult<Vec<Collection>>;

    /// Insert a new record. Fails if the key is taken.
    fn add(&mut self, collection: &Collection) -> DomainResult<()>;

    /// Replace the whole record stored under `collection.id`, inserting it if absent
    fn put(&mut self, collection: &Collection) -> DomainResult<()>;

    /// Remove the record stored under exactly `id`, returning the number removed
    fn delete(&mut self, id: &CollectionId) -> DomainResult<usize>;
}

/// Unit of work run inside [`CollectionStore::transaction`]
pub type TxWork<'a> = &'a mut (dyn FnMut(&mut dyn CollectionTable) -> DomainResult<()> + Send);

/// Storage engine holding the flat collection table
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Run `work` atomically: either every write lands or none does.
    /// Writes inside a `TxMode::Read` transaction are rejected.
    async fn transaction(&self, mode: TxMode, work: TxWork<'_>) -> DomainResult<()>;

    /// Monotonic timestamp in milliseconds
    fn now(&self) -> i64;
}

/// Read-only view handed to `TxMode::Read` work
pub(crate) struct ReadOnly<'a>(pub(crate) &'a dyn CollectionTable);

impl ReadOnly<'_> {
    fn rejected() -> DomainError {
        DomainError::InvalidInput("write attempted in a read-only transaction".to_string())
    }
}

impl CollectionTable for ReadOnly<'_> {
    fn get(&self, id: &CollectionId) -> DomainResult<Option<Collection>> {
        self.0.get(id)
    }

    fn all(&self) -> DomainResult<Vec<Collection>> {
        self.0.all()
    }

    fn select(&self, filter: &Filter) -> DomainResult<Vec<Collection>> {
        self.0.select(filter)
    }

    fn add(&mut self, _collection: &Collection) -> DomainResult<()> {
        Err(Self::rejected())
    }

    fn put(&mut self, _collection: &Collection) -> DomainResult<()> {
        Err(Self::rejected())
    }

    fn delete(&mut self, _id: &CollectionId) -> DomainResult<usize> {
        Err(Self::rejected())
    }
}

/// Wall clock in milliseconds that never repeats or goes backwards
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_strictly_increasing() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        let c = clock.now();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_filter_within_respects_boundaries() {
        let mut direct = Collection::new("d", "Direct");
        direct.parent_path = Some("/a/12".into());
        let mut deep = Collection::new("e", "Deep");
        deep.parent_path = Some("/a/12/d".into());
        let mut sibling = Collection::new("f", "Sibling");
        sibling.parent_path = Some("/a/123".into());

        let filter = Filter::within("/a/12");
        assert!(filter.matches(&direct));
        assert!(filter.matches(&deep));
        assert!(!filter.matches(&sibling));
    }

    #[test]
    fn test_root_matches_empty_parent_path() {
        let root = Collection::new("r", "Root");
        assert!(Filter::ParentPathEquals(String::new()).matches(&root));
    }

    #[test]
    fn test_any_id_matches_both_forms() {
        let filter = Filter::any_id(&CollectionId::from(42));
        assert!(filter.matches(&Collection::new(42, "n")));
        assert!(filter.matches(&Collection::new("42", "s")));
        assert!(!filter.matches(&Collection::new("420", "x")));
    }
}
