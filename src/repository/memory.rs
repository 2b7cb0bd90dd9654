//! In-memory storage engine
//!
//! Records are kept in insertion order. Read-write transactions work on a
//! copy of the table that replaces the live one only when the work succeeds.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::{
    CollectionStore, CollectionTable, Filter, MonotonicClock, ReadOnly, TxMode, TxWork,
};
use crate::domain::{Collection, CollectionId, DomainError, DomainResult};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Collection>>,
    clock: MonotonicClock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTable<'a> {
    records: &'a mut Vec<Collection>,
}

impl MemoryTable<'_> {
    fn position(&self, id: &CollectionId) -> Option<usize> {
        self.records.iter().position(|c| c.id == *id)
    }
}

impl CollectionTable for MemoryTable<'_> {
    fn get(&self, id: &CollectionId) -> DomainResult<Option<Collection>> {
        Ok(self.position(id).map(|i| self.records[i].clone()))
    }

    fn all(&self) -> DomainResult<Vec<Collection>> {
        Ok(self.records.clone())
    }

    fn select(&self, filter: &Filter) -> DomainResult<Vec<Collection>> {
        Ok(self
            .records
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    fn add(&mut self, collection: &Collection) -> DomainResult<()> {
        if self.position(&collection.id).is_some() {
            return Err(DomainError::InvalidInput(format!(
                "collection {} already exists",
                collection.id
            )));
        }
        self.records.push(collection.clone());
        Ok(())
    }

    fn put(&mut self, collection: &Collection) -> DomainResult<()> {
        match self.position(&collection.id) {
            Some(i) => self.records[i] = collection.clone(),
            None => self.records.push(collection.clone()),
        }
        Ok(())
    }

    fn delete(&mut self, id: &CollectionId) -> DomainResult<usize> {
        let before = self.records.len();
        self.records.retain(|c| c.id != *id);
        Ok(before - self.records.len())
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn transaction(&self, mode: TxMode, work: TxWork<'_>) -> DomainResult<()> {
        let mut guard = self.records.lock().await;
        match mode {
            TxMode::Read => {
                let table = MemoryTable { records: &mut *guard };
                work(&mut ReadOnly(&table))
            }
            TxMode::ReadWrite => {
                let mut draft = guard.clone();
                work(&mut MemoryTable { records: &mut draft })?;
                *guard = draft;
                Ok(())
            }
        }
    }

    fn now(&self) -> i64 {
        self.clock.now()
    }
}
