//! Collection Service - Remote Sync
//!
//! Pull-only reconciliation of remote collections into local storage.

use async_trait::async_trait;
use std::collections::HashMap;

use super::collection_service::CollectionService;
use crate::domain::{path, Collection, CollectionId, DomainResult, NewCollection, QueryItem};
use crate::remote::{RemoteCollection, RemoteQuery};

/// Outcome of one pull
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Remote-to-local reconciliation
#[async_trait]
pub trait CollectionSync {
    /// Pull every remote collection into local storage. Never pushes.
    async fn sync_remote_to_local(&self) -> DomainResult<SyncReport>;
}

#[async_trait]
impl CollectionSync for CollectionService {
    async fn sync_remote_to_local(&self) -> DomainResult<SyncReport> {
        let mut report = SyncReport::default();
        if !self.is_authenticated().await? {
            log::info!("Not signed in, skipping sync");
            return Ok(report);
        }

        let remote = self.remote.get_collections().await?;
        if remote.is_empty() {
            log::debug!("Remote has no collections");
            return Ok(report);
        }

        // Server ids that are (or become) present locally, mapped to local ids
        let mut known: HashMap<String, CollectionId> = HashMap::new();
        let mut pending: Vec<&RemoteCollection> = Vec::new();

        for remote_collection in &remote {
            match self.repo.find_by_server_id(&remote_collection.id).await? {
                Some(local) => {
                    known.insert(remote_collection.id.clone(), local.id.clone());
                    if self.merge_into_local(&local, remote_collection).await? {
                        report.updated += 1;
                    } else {
                        report.unchanged += 1;
                    }
                }
                None => pending.push(remote_collection),
            }
        }

        // New collections: create parents before children. Whatever is left
        // once no pass makes progress has an unknown parent and goes to root.
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for remote_collection in pending {
                let parent = match &remote_collection.parent_collection_id {
                    None => Some(None),
                    Some(server_id) => known.get(server_id).map(|id| Some(id.clone())),
                };
                match parent {
                    Some(parent_id) => {
                        let id = self
                            .create_from_remote(remote_collection, parent_id.as_ref())
                            .await?;
                        known.insert(remote_collection.id.clone(), id);
                        report.created += 1;
                    }
                    None => deferred.push(remote_collection),
                }
            }

            if deferred.len() == before {
                for remote_collection in deferred {
                    log::warn!(
                        "Parent of remote collection {} is unknown, placing it at root",
                        remote_collection.id
                    );
                    let id = self.create_from_remote(remote_collection, None).await?;
                    known.insert(remote_collection.id.clone(), id);
                    report.created += 1;
                }
                break;
            }
            pending = deferred;
        }

        log::info!(
            "Sync finished: {} created, {} updated, {} unchanged",
            report.created,
            report.updated,
            report.unchanged
        );
        Ok(report)
    }
}

impl CollectionService {
    /// True when a remote timestamp beats a local one by more than the
    /// configured tolerance
    fn remote_wins(&self, remote_ms: i64, local_ms: i64) -> bool {
        remote_ms > local_ms.saturating_add(self.skew_tolerance_ms)
    }

    async fn create_from_remote(
        &self,
        remote: &RemoteCollection,
        parent_id: Option<&CollectionId>,
    ) -> DomainResult<CollectionId> {
        let queries = remote
            .queries
            .iter()
            .map(query_from_remote)
            .collect::<DomainResult<Vec<_>>>()?;

        let mut new = NewCollection::new(remote.collection_name.clone()).with_queries(queries);
        new.server_id = Some(remote.id.clone());
        let id = self.create_collection(new, parent_id).await?;

        // Adopt the remote timestamps so the next pull compares against them
        let remote_ms = remote.updated_at.timestamp_millis();
        let query_ms: HashMap<&str, i64> = remote
            .queries
            .iter()
            .map(|q| (q.id.as_str(), q.updated_at.timestamp_millis()))
            .collect();
        self.repo
            .modify(&id, |c| {
                c.updated_at = remote_ms;
                for query in &mut c.queries {
                    if let Some(ms) = query.server_id.as_deref().and_then(|s| query_ms.get(s)) {
                        query.updated_at = Some(*ms);
                    }
                }
            })
            .await?;
        log::debug!("Created local collection {} from remote {}", id, remote.id);
        Ok(id)
    }

    /// Replace `local` with the remote version when the remote one is newer
    /// beyond the tolerance. Returns whether anything was written.
    async fn merge_into_local(
        &self,
        local: &Collection,
        remote: &RemoteCollection,
    ) -> DomainResult<bool> {
        let remote_ms = remote.updated_at.timestamp_millis();
        if !self.remote_wins(remote_ms, local.updated_at) {
            return Ok(false);
        }

        let mut queries = Vec::with_capacity(remote.queries.len());
        for remote_query in &remote.queries {
            let existing = local
                .queries
                .iter()
                .find(|q| q.server_id.as_deref() == Some(remote_query.id.as_str()));
            let query_ms = remote_query.updated_at.timestamp_millis();
            match existing {
                Some(mine) if !self.remote_wins(query_ms, mine.updated_at.unwrap_or(0)) => {
                    queries.push(mine.clone());
                }
                Some(mine) => {
                    let mut theirs = query_from_remote(remote_query)?;
                    theirs.id = mine.id.clone();
                    theirs.created_at = mine.created_at;
                    queries.push(theirs);
                }
                None => queries.push(query_from_remote(remote_query)?),
            }
        }
        // Never-synced local queries are not on the remote side yet
        queries.extend(local.queries.iter().filter(|q| q.server_id.is_none()).cloned());

        let merged = Collection {
            id: local.id.clone(),
            title: remote.collection_name.clone(),
            parent_path: path::normalize(local.parent_path.as_deref()).map(str::to_string),
            server_id: Some(remote.id.clone()),
            queries,
            created_at: local.created_at,
            updated_at: remote_ms,
            extra: local.extra.clone(),
        };
        self.repo.modify(&local.id, |c| *c = merged.clone()).await?;
        log::debug!("Local collection {} replaced by remote {}", local.id, remote.id);
        Ok(true)
    }
}

fn query_from_remote(remote: &RemoteQuery) -> DomainResult<QueryItem> {
    let mut query = QueryItem::from_remote_content(
        &remote.id,
        remote.updated_at.timestamp_millis(),
        &remote.content,
    )?;
    query.id = Some(QueryItem::generate_id());
    Ok(query)
}
