//! Collection Repository
//!
//! Local store adapter over a [`CollectionStore`]. Every lookup, update and
//! delete by id also probes the alternate representation of that id
//! (numeric vs string) so that records written by older schemas are reached.

use std::sync::Arc;

use super::traits::{CollectionStore, CollectionTable, Filter, TxMode, TxWork};
use crate::domain::{Collection, CollectionId, DomainResult};

#[derive(Clone)]
pub struct CollectionRepository {
    store: Arc<dyn CollectionStore>,
}

impl CollectionRepository {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self { store }
    }

    /// Storage timestamp in milliseconds
    pub fn now(&self) -> i64 {
        self.store.now()
    }

    /// Run `work` in one storage transaction
    pub async fn transaction(&self, mode: TxMode, work: TxWork<'_>) -> DomainResult<()> {
        self.store.transaction(mode, work).await
    }

    /// Record stored under `id` or its alternate
    pub async fn get(&self, id: &CollectionId) -> DomainResult<Option<Collection>> {
        let filter = Filter::any_id(id);
        let mut found = None;
        self.store
            .transaction(TxMode::Read, &mut |table: &mut dyn CollectionTable| {
                found = table.select(&filter)?.into_iter().next();
                Ok(())
            })
            .await?;
        Ok(found)
    }

    pub async fn list(&self) -> DomainResult<Vec<Collection>> {
        let mut collections = Vec::new();
        self.store
            .transaction(TxMode::Read, &mut |table: &mut dyn CollectionTable| {
                collections = table.all()?;
                Ok(())
            })
            .await?;
        Ok(collections)
    }

    pub async fn add(&self, collection: &Collection) -> DomainResult<()> {
        self.store
            .transaction(TxMode::ReadWrite, &mut |table: &mut dyn CollectionTable| {
                table.add(collection)
            })
            .await
    }

    /// Store `collection` under its exact id, replacing any existing record
    pub async fn put(&self, collection: &Collection) -> DomainResult<()> {
        self.store
            .transaction(TxMode::ReadWrite, &mut |table: &mut dyn CollectionTable| {
                table.put(collection)
            })
            .await
    }

    /// Apply `mutator` to every record stored under `id` or its alternate
    /// and persist them atomically. Returns the number of records touched.
    ///
    /// The mutator may replace the whole record; the stored key is kept.
    pub async fn modify<F>(&self, id: &CollectionId, mut mutator: F) -> DomainResult<usize>
    where
        F: FnMut(&mut Collection) + Send,
    {
        let filter = Filter::any_id(id);
        let mut touched = 0;
        self.store
            .transaction(TxMode::ReadWrite, &mut |table: &mut dyn CollectionTable| {
                touched = 0;
                for mut record in table.select(&filter)? {
                    let key = record.id.clone();
                    mutator(&mut record);
                    record.id = key;
                    table.put(&record)?;
                    touched += 1;
                }
                Ok(())
            })
            .await?;
        if touched > 1 {
            log::warn!("Collection {} matched {} records on modify", id, touched);
        }
        Ok(touched)
    }

    /// Remove the records stored under `id` and under its alternate
    pub async fn delete(&self, id: &CollectionId) -> DomainResult<usize> {
        let candidates = id.candidates();
        let mut removed = 0;
        self.store
            .transaction(TxMode::ReadWrite, &mut |table: &mut dyn CollectionTable| {
                removed = 0;
                for candidate in &candidates {
                    removed += table.delete(candidate)?;
                }
                Ok(())
            })
            .await?;
        Ok(removed)
    }

    /// Collections whose parent path is exactly `path`, or (recursive) is
    /// `path` or lies anywhere below it
    pub async fn query_by_path_prefix(
        &self,
        path: &str,
        recursive: bool,
    ) -> DomainResult<Vec<Collection>> {
        let filter = if recursive {
            Filter::within(path)
        } else {
            Filter::ParentPathEquals(path.to_string())
        };
        let mut collections = Vec::new();
        self.store
            .transaction(TxMode::Read, &mut |table: &mut dyn CollectionTable| {
                collections = table.select(&filter)?;
                Ok(())
            })
            .await?;
        Ok(collections)
    }

    pub async fn find_by_server_id(&self, server_id: &str) -> DomainResult<Option<Collection>> {
        let filter = Filter::ServerIdEquals(server_id.to_string());
        let mut found = None;
        self.store
            .transaction(TxMode::Read, &mut |table: &mut dyn CollectionTable| {
                found = table.select(&filter)?.into_iter().next();
                Ok(())
            })
            .await?;
        Ok(found)
    }
}
