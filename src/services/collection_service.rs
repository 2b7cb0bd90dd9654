//! Collection Service - CRUD Operations
//!
//! Orchestrates collection and query changes over the local repository and,
//! when signed in, the remote service.
//!
//! Writes are "local commit, then best-effort remote commit": the local
//! write always lands first and is never rolled back when the remote call
//! fails. The remote failure is returned to the caller.
//!
//! Specialized operations are in separate modules:
//! - sync: pulling remote collections into local storage
//! - transfer: export and import documents

use std::sync::Arc;

use crate::config::CollectionsConfig;
use crate::domain::{
    path, Collection, CollectionId, CollectionTree, DomainError, DomainResult, NewCollection,
    QueryItem,
};
use crate::remote::{HttpRemoteApi, OfflineRemote, RemoteApi, SessionProvider};
use crate::repository::{CollectionRepository, CollectionTable, Filter, SqliteStore, TxMode};
use crate::tree::build_trees;

pub struct CollectionService {
    pub(super) repo: CollectionRepository,
    pub(super) remote: Arc<dyn RemoteApi>,
    pub(super) session: Arc<dyn SessionProvider>,
    pub(super) skew_tolerance_ms: i64,
}

impl CollectionService {
    pub fn new(
        repo: CollectionRepository,
        remote: Arc<dyn RemoteApi>,
        session: Arc<dyn SessionProvider>,
        config: &CollectionsConfig,
    ) -> Self {
        Self {
            repo,
            remote,
            session,
            skew_tolerance_ms: config.skew_tolerance_ms,
        }
    }

    /// Open the SQLite database and remote client described by `config`
    pub fn open(
        config: &CollectionsConfig,
        session: Arc<dyn SessionProvider>,
    ) -> DomainResult<Self> {
        config.validate()?;
        let store = SqliteStore::open(&config.database_path)?;
        let remote: Arc<dyn RemoteApi> = match &config.remote {
            Some(remote) => Arc::new(HttpRemoteApi::new(remote)?),
            None => {
                log::info!("No remote configured, collections stay local");
                Arc::new(OfflineRemote)
            }
        };
        Ok(Self::new(
            CollectionRepository::new(Arc::new(store)),
            remote,
            session,
            config,
        ))
    }

    pub fn repository(&self) -> &CollectionRepository {
        &self.repo
    }

    pub(super) async fn is_authenticated(&self) -> DomainResult<bool> {
        Ok(self.session.get_user().await?.is_some())
    }

    /// Collection stored under `id` (or its alternate)
    pub async fn get_collection(&self, id: &CollectionId) -> DomainResult<Collection> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("collection {}", id)))
    }

    pub async fn list_collections(&self) -> DomainResult<Vec<Collection>> {
        self.repo.list().await
    }

    /// Every collection nested under its parent. Rebuilt on each call.
    pub async fn get_collection_trees(&self) -> DomainResult<Vec<CollectionTree>> {
        Ok(build_trees(&self.repo.list().await?))
    }

    /// Direct children of `id`, or all descendants when `recursive`
    pub async fn get_subcollections(
        &self,
        id: &CollectionId,
        recursive: bool,
    ) -> DomainResult<Vec<Collection>> {
        let collection = self.get_collection(id).await?;
        self.repo
            .query_by_path_prefix(&collection.own_path(), recursive)
            .await
    }

    pub fn get_parent_collection_id(&self, collection: &Collection) -> Option<CollectionId> {
        collection.parent_id()
    }

    /// Server id of the parent of `collection`, if the parent exists and is synced
    pub(super) async fn parent_server_id(
        &self,
        collection: &Collection,
    ) -> DomainResult<Option<String>> {
        let Some(parent_id) = collection.parent_id() else {
            return Ok(None);
        };
        Ok(self
            .repo
            .get(&parent_id)
            .await?
            .and_then(|parent| parent.server_id))
    }

    /// Create a collection locally under `parent_id` (root when `None`).
    ///
    /// Keeps a caller-supplied id, otherwise generates one. Every nested
    /// query gets a fresh id. Nothing is pushed to the remote service.
    pub async fn create_collection(
        &self,
        new: NewCollection,
        parent_id: Option<&CollectionId>,
    ) -> DomainResult<CollectionId> {
        let parent_path = match parent_id {
            Some(pid) => match self.repo.get(pid).await? {
                Some(parent) => Some(parent.own_path()),
                None => {
                    log::warn!("Parent collection {} not found, creating at root", pid);
                    None
                }
            },
            None => None,
        };

        let now = self.repo.now();
        let id = new.id.unwrap_or_else(CollectionId::generate);
        let mut queries = new.queries;
        for query in &mut queries {
            query.stamp_new(now);
        }

        let collection = Collection {
            id: id.clone(),
            title: new.title,
            parent_path,
            server_id: new.server_id,
            queries,
            created_at: now,
            updated_at: now,
            extra: new.extra,
        };
        self.repo.add(&collection).await?;
        log::debug!("Created collection {} ({})", id, collection.title);
        Ok(id)
    }

    /// Create `collection` on the remote service and record the server ids
    /// it hands back (collection and queries, in submission order).
    pub async fn create_remote_collection(
        &self,
        local_id: &CollectionId,
        collection: &Collection,
    ) -> DomainResult<()> {
        if !self.is_authenticated().await? {
            log::info!("Not signed in, skipping remote create of {}", local_id);
            return Ok(());
        }

        let parent_server_id = self.parent_server_id(collection).await?;
        let created = self
            .remote
            .create_query_collection(collection, parent_server_id.as_deref())
            .await?
            .ok_or_else(|| {
                DomainError::remote_rejected(format!("no collection created for {}", local_id))
            })?;

        if created.query_ids.len() != collection.queries.len() {
            log::warn!(
                "Remote returned {} query ids for {} queries",
                created.query_ids.len(),
                collection.queries.len()
            );
        }

        let mut stamped = collection.clone();
        stamped.server_id = Some(created.collection_id.clone());
        for (query, server_id) in stamped.queries.iter_mut().zip(&created.query_ids) {
            query.server_id = Some(server_id.clone());
        }

        let touched = self.repo.modify(local_id, |c| *c = stamped.clone()).await?;
        if touched == 0 {
            return Err(DomainError::not_found(format!("collection {}", local_id)));
        }
        log::info!(
            "Collection {} synced as {}",
            local_id,
            created.collection_id
        );
        Ok(())
    }

    /// Push `local_id` and its descendants that are not yet synced, parents
    /// first. Returns how many collections were pushed.
    pub async fn push_collection_tree(&self, local_id: &CollectionId) -> DomainResult<usize> {
        if !self.is_authenticated().await? {
            log::info!("Not signed in, skipping remote push of {}", local_id);
            return Ok(0);
        }

        let root = self.get_collection(local_id).await?;
        let mut pending = vec![root.clone()];
        pending.extend(self.repo.query_by_path_prefix(&root.own_path(), true).await?);
        // Shallow paths first so every parent holds its server id before its children
        pending.sort_by_key(|c| path::segments(c.parent_path.as_deref().unwrap_or("")).len());

        let mut pushed = 0;
        for collection in pending {
            if collection.is_synced() {
                continue;
            }
            // Re-read: an earlier push may have touched this record
            let current = self.get_collection(&collection.id).await?;
            self.create_remote_collection(&current.id, &current).await?;
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Append `query` to a collection. Pushed to remote only when signed in
    /// and the collection is already synced.
    pub async fn add_query(
        &self,
        collection_id: &CollectionId,
        query: QueryItem,
    ) -> DomainResult<QueryItem> {
        let now = self.repo.now();
        let mut query = query;
        query.stamp_new(now);

        let added = query.clone();
        let touched = self
            .repo
            .modify(collection_id, |c| {
                c.queries.push(added.clone());
                c.updated_at = now;
            })
            .await?;
        if touched == 0 {
            return Err(DomainError::not_found(format!("collection {}", collection_id)));
        }

        if let Some(server_id) = self.remote_target(collection_id).await? {
            self.push_new_query(collection_id, &server_id, &mut query).await?;
        }
        Ok(query)
    }

    /// Replace a stored query (matched by id, or window name for legacy
    /// records).
    pub async fn update_query(
        &self,
        collection_id: &CollectionId,
        query: QueryItem,
    ) -> DomainResult<()> {
        let now = self.repo.now();
        let mut updated = query;
        updated.updated_at = Some(now);

        let mut found = false;
        let replacement = updated.clone();
        let touched = self
            .repo
            .modify(collection_id, |c| {
                if let Some(i) = c.find_query(&replacement) {
                    let existing = &c.queries[i];
                    let mut next = replacement.clone();
                    next.id = next.id.or_else(|| existing.id.clone());
                    next.server_id = next.server_id.or_else(|| existing.server_id.clone());
                    next.created_at = next.created_at.or(existing.created_at);
                    c.queries[i] = next;
                    c.updated_at = now;
                    found = true;
                }
            })
            .await?;
        if touched == 0 {
            return Err(DomainError::not_found(format!("collection {}", collection_id)));
        }
        if !found && updated.id.is_none() {
            log::warn!(
                "No query in collection {} matches window name {:?}, nothing updated",
                collection_id,
                updated.window_name
            );
            return Ok(());
        }
        if !found {
            return Err(DomainError::not_found(format!(
                "query {:?} in collection {}",
                updated.id, collection_id
            )));
        }

        let Some(server_id) = self.remote_target(collection_id).await? else {
            return Ok(());
        };

        // Pick up ids completed from the stored record
        let stored = self.get_collection(collection_id).await?;
        if let Some(i) = stored.find_query(&updated) {
            updated = stored.queries[i].clone();
        }

        match updated.server_id.clone() {
            Some(query_server_id) => self.remote.update_query(&query_server_id, &updated).await,
            None => {
                log::debug!("Query has no server id yet, pushing it as new");
                self.push_new_query(collection_id, &server_id, &mut updated)
                    .await
            }
        }
    }

    /// Remove a query. A query that cannot be matched leaves the collection
    /// untouched and is not an error.
    pub async fn delete_query(
        &self,
        collection_id: &CollectionId,
        query: &QueryItem,
    ) -> DomainResult<()> {
        if query.id.is_none() {
            log::warn!("Deleting a query without id, matching by window name");
        }

        let now = self.repo.now();
        let mut removed: Option<QueryItem> = None;
        let touched = self
            .repo
            .modify(collection_id, |c| {
                if let Some(i) = c.find_query(query) {
                    removed = Some(c.queries.remove(i));
                    c.updated_at = now;
                }
            })
            .await?;
        if touched == 0 {
            return Err(DomainError::not_found(format!("collection {}", collection_id)));
        }

        let Some(removed) = removed else {
            log::warn!(
                "No matching query in collection {}, nothing deleted",
                collection_id
            );
            return Ok(());
        };

        if self.remote_target(collection_id).await?.is_none() {
            return Ok(());
        }
        match removed.server_id.as_deref().or(query.server_id.as_deref()) {
            Some(server_id) => self.remote.delete_query(server_id).await,
            None => {
                log::info!("Deleted query was never synced, no remote delete");
                Ok(())
            }
        }
    }

    /// Replace the stored collection with `new_data`. The stored id and
    /// creation time are kept, and so is the server id when `new_data`
    /// carries none: a synced collection stays synced.
    pub async fn update_collection(
        &self,
        collection_id: &CollectionId,
        new_data: Collection,
    ) -> DomainResult<()> {
        let mut replacement = new_data;
        replacement.updated_at = self.repo.now();

        let touched = self
            .repo
            .modify(collection_id, |c| {
                let mut next = replacement.clone();
                next.server_id = next.server_id.or_else(|| c.server_id.clone());
                next.created_at = c.created_at;
                *c = next;
            })
            .await?;
        if touched == 0 {
            return Err(DomainError::not_found(format!("collection {}", collection_id)));
        }

        if let Some(server_id) = self.remote_target(collection_id).await? {
            let stored = self.get_collection(collection_id).await?;
            let parent_server_id = self.parent_server_id(&stored).await?;
            self.remote
                .update_collection(&server_id, &stored, parent_server_id.as_deref())
                .await?;
        }
        Ok(())
    }

    /// Delete a collection together with every descendant collection
    pub async fn delete_collection(&self, collection_id: &CollectionId) -> DomainResult<()> {
        let collection = self.get_collection(collection_id).await?;
        let subtree = Filter::within(&collection.own_path());
        let candidates = collection_id.candidates();

        let mut removed = 0;
        self.repo
            .transaction(TxMode::ReadWrite, &mut |table: &mut dyn CollectionTable| {
                removed = 0;
                for descendant in table.select(&subtree)? {
                    removed += table.delete(&descendant.id)?;
                }
                for candidate in &candidates {
                    removed += table.delete(candidate)?;
                }
                Ok(())
            })
            .await?;
        log::debug!("Deleted collection {} ({} records)", collection_id, removed);

        if !self.is_authenticated().await? {
            return Ok(());
        }
        match &collection.server_id {
            Some(server_id) => self.remote.delete_collection(server_id).await,
            None => Ok(()),
        }
    }

    /// Move a collection (with its whole subtree) under `new_parent_id`, or
    /// to the root when `None`. Local only.
    ///
    /// Runs in one transaction: the moved record and every record whose
    /// parent path lies below it get their leading path segment swapped.
    pub async fn move_collection(
        &self,
        id: &CollectionId,
        new_parent_id: Option<&CollectionId>,
    ) -> DomainResult<usize> {
        let moved_filter = Filter::any_id(id);
        let parent_filter = new_parent_id.map(Filter::any_id);

        let mut rewritten = 0;
        self.repo
            .transaction(TxMode::ReadWrite, &mut |table: &mut dyn CollectionTable| {
                rewritten = 0;
                let moved = table
                    .select(&moved_filter)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| DomainError::not_found(format!("collection {}", id)))?;

                let new_parent_path = match &parent_filter {
                    Some(filter) => {
                        let parent = table.select(filter)?.into_iter().next().ok_or_else(|| {
                            DomainError::not_found(format!("new parent of collection {}", id))
                        })?;
                        let parent_own_path = parent.own_path();
                        if path::is_within(&parent_own_path, &moved.own_path()) {
                            return Err(DomainError::InvalidInput(format!(
                                "cannot move collection {} into its own subtree",
                                id
                            )));
                        }
                        parent_own_path
                    }
                    None => String::new(),
                };

                let old_parent_path = moved.parent_path.clone().unwrap_or_default();
                let old_prefix = moved.own_path();

                let mut records = vec![moved];
                records.extend(table.select(&Filter::within(&old_prefix))?);
                for mut record in records {
                    let current = record.parent_path.clone().unwrap_or_default();
                    let Some(next) = path::rebase(&current, &old_parent_path, &new_parent_path)
                    else {
                        continue;
                    };
                    record.parent_path = (!next.is_empty()).then_some(next);
                    table.put(&record)?;
                    rewritten += 1;
                }
                Ok(())
            })
            .await?;

        log::debug!("Moved collection {}, {} paths rewritten", id, rewritten);
        Ok(rewritten)
    }

    /// Server id of the collection when remote writes should happen: signed
    /// in and the collection is synced
    async fn remote_target(&self, collection_id: &CollectionId) -> DomainResult<Option<String>> {
        if !self.is_authenticated().await? {
            log::debug!("Not signed in, local change only");
            return Ok(None);
        }
        let collection = self.get_collection(collection_id).await?;
        if collection.server_id.is_none() {
            log::debug!("Collection {} is not synced, local change only", collection_id);
        }
        Ok(collection.server_id)
    }

    /// Create `query` remotely under `collection_server_id` and stamp the
    /// returned server id on the stored query
    async fn push_new_query(
        &self,
        collection_id: &CollectionId,
        collection_server_id: &str,
        query: &mut QueryItem,
    ) -> DomainResult<()> {
        let ids = self
            .remote
            .create_queries(collection_server_id, std::slice::from_ref(&*query))
            .await?;
        let server_id = ids.into_iter().next().ok_or_else(|| {
            DomainError::remote_rejected(format!(
                "no query created in collection {}",
                collection_id
            ))
        })?;

        query.server_id = Some(server_id.clone());
        let target = query.clone();
        self.repo
            .modify(collection_id, |c| {
                if let Some(i) = c.find_query(&target) {
                    c.queries[i].server_id = Some(server_id.clone());
                }
            })
            .await?;
        Ok(())
    }
}
