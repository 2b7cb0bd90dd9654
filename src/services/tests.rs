//! Service Integration Tests
//!
//! Drives the collection service over in-memory storage and a scripted
//! remote service.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Map};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::config::CollectionsConfig;
    use crate::domain::{
        Collection, CollectionId, DomainError, DomainResult, NewCollection, QueryItem,
    };
    use crate::remote::{
        CreatedCollection, RemoteApi, RemoteCollection, RemoteQuery, StaticSession, User,
    };
    use crate::repository::{CollectionRepository, MemoryStore};
    use crate::services::{CollectionService, CollectionSync, CollectionTransfer, SyncReport};

    /// Remote service that records every call and hands out predictable ids
    #[derive(Default)]
    struct MockRemote {
        calls: Mutex<Vec<String>>,
        collections: Mutex<Vec<RemoteCollection>>,
        reject: AtomicBool,
        counter: AtomicUsize,
    }

    impl MockRemote {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn next_id(&self) -> usize {
            self.counter.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn serve(&self, collections: Vec<RemoteCollection>) {
            *self.collections.lock().unwrap() = collections;
        }
    }

    #[async_trait]
    impl RemoteApi for MockRemote {
        async fn create_query_collection(
            &self,
            collection: &Collection,
            parent_server_id: Option<&str>,
        ) -> DomainResult<Option<CreatedCollection>> {
            self.record(format!(
                "create_collection {} parent={}",
                collection.title,
                parent_server_id.unwrap_or("-")
            ));
            if self.reject.load(Ordering::SeqCst) {
                return Ok(None);
            }
            let n = self.next_id();
            Ok(Some(CreatedCollection {
                collection_id: format!("srv-{}", n),
                query_ids: (0..collection.queries.len())
                    .map(|i| format!("srv-{}-q{}", n, i))
                    .collect(),
            }))
        }

        async fn create_queries(
            &self,
            collection_server_id: &str,
            queries: &[QueryItem],
        ) -> DomainResult<Vec<String>> {
            self.record(format!("create_queries {}", collection_server_id));
            if self.reject.load(Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            Ok(queries
                .iter()
                .map(|_| format!("q-srv-{}", self.next_id()))
                .collect())
        }

        async fn update_query(&self, server_id: &str, _query: &QueryItem) -> DomainResult<()> {
            self.record(format!("update_query {}", server_id));
            Ok(())
        }

        async fn update_collection(
            &self,
            server_id: &str,
            collection: &Collection,
            parent_server_id: Option<&str>,
        ) -> DomainResult<()> {
            self.record(format!(
                "update_collection {} {} parent={}",
                server_id,
                collection.title,
                parent_server_id.unwrap_or("-")
            ));
            Ok(())
        }

        async fn delete_query(&self, server_id: &str) -> DomainResult<()> {
            self.record(format!("delete_query {}", server_id));
            Ok(())
        }

        async fn delete_collection(&self, server_id: &str) -> DomainResult<()> {
            self.record(format!("delete_collection {}", server_id));
            Ok(())
        }

        async fn get_collections(&self) -> DomainResult<Vec<RemoteCollection>> {
            self.record("get_collections".to_string());
            Ok(self.collections.lock().unwrap().clone())
        }
    }

    fn user() -> User {
        User {
            id: "user-1".into(),
            name: Some("Tester".into()),
        }
    }

    fn setup(signed_in: bool) -> (CollectionService, Arc<MockRemote>) {
        let remote = Arc::new(MockRemote::default());
        let session = if signed_in {
            StaticSession::signed_in(user())
        } else {
            StaticSession::signed_out()
        };
        let service = CollectionService::new(
            CollectionRepository::new(Arc::new(MemoryStore::new())),
            remote.clone(),
            Arc::new(session),
            &CollectionsConfig::default(),
        );
        (service, remote)
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn remote_collection(id: &str, name: &str, updated_ms: i64) -> RemoteCollection {
        RemoteCollection {
            id: id.into(),
            collection_name: name.into(),
            updated_at: at_ms(updated_ms),
            parent_collection_id: None,
            queries: Vec::new(),
        }
    }

    fn remote_query(id: &str, window: &str, updated_ms: i64) -> RemoteQuery {
        let mut content = Map::new();
        content.insert("windowName".into(), json!(window));
        content.insert("query".into(), json!(format!("{{ {} }}", window)));
        RemoteQuery {
            id: id.into(),
            updated_at: at_ms(updated_ms),
            content,
        }
    }

    async fn create(
        service: &CollectionService,
        title: &str,
        parent: Option<&CollectionId>,
    ) -> CollectionId {
        service
            .create_collection(NewCollection::new(title), parent)
            .await
            .unwrap()
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    #[tokio::test]
    async fn test_child_parent_path_references_parent() {
        let (service, remote) = setup(true);
        let x = create(&service, "A", None).await;
        let child = create(&service, "B", Some(&x)).await;

        let root = service.get_collection(&x).await.unwrap();
        assert!(root.is_root());
        let child = service.get_collection(&child).await.unwrap();
        assert_eq!(child.parent_path, Some(format!("/{}", x)));
        assert_eq!(service.get_parent_collection_id(&child), Some(x));

        // Local create never reaches the remote service
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_query_ids() {
        let (service, _) = setup(false);
        let mut stale = QueryItem::new("W1");
        stale.id = Some("old".into());
        let new = NewCollection::new("A").with_queries(vec![stale, QueryItem::new("W2")]);

        let id = service.create_collection(new, None).await.unwrap();
        let stored = service.get_collection(&id).await.unwrap();
        let ids: HashSet<_> = stored.queries.iter().filter_map(|q| q.id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains("old"));
        assert!(stored.queries.iter().all(|q| q.created_at == Some(stored.created_at)));
    }

    #[tokio::test]
    async fn test_create_under_missing_parent_goes_to_root() {
        let (service, _) = setup(false);
        let id = create(&service, "Orphan", Some(&CollectionId::from("ghost"))).await;
        assert!(service.get_collection(&id).await.unwrap().is_root());
    }

    #[tokio::test]
    async fn test_numeric_id_reached_by_text() {
        let (service, _) = setup(false);
        let mut new = NewCollection::new("Legacy");
        new.id = Some(CollectionId::from(42));
        service.create_collection(new, None).await.unwrap();

        let found = service.get_collection(&CollectionId::from("42")).await.unwrap();
        assert_eq!(found.title, "Legacy");
        assert!(matches!(
            service.get_collection(&CollectionId::from("42x")).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subcollections_and_trees() {
        let (service, _) = setup(false);
        let a = create(&service, "A", None).await;
        let b = create(&service, "B", Some(&a)).await;
        let _c = create(&service, "C", Some(&b)).await;
        let _d = create(&service, "D", None).await;

        assert_eq!(service.get_subcollections(&a, false).await.unwrap().len(), 1);
        assert_eq!(service.get_subcollections(&a, true).await.unwrap().len(), 2);

        let trees = service.get_collection_trees().await.unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].title, "A");
        assert_eq!(trees[0].collections[0].collections[0].title, "C");
        assert_eq!(trees[0].node_count(), 3);
    }

    #[tokio::test]
    async fn test_move_rewrites_whole_subtree() {
        let (service, _) = setup(false);
        let a = create(&service, "A", None).await;
        let b = create(&service, "B", Some(&a)).await;
        let c = create(&service, "C", Some(&b)).await;
        let target = create(&service, "Target", None).await;

        // A plus its two descendants
        let rewritten = service.move_collection(&a, Some(&target)).await.unwrap();
        assert_eq!(rewritten, 3);

        let a_now = service.get_collection(&a).await.unwrap();
        let b_now = service.get_collection(&b).await.unwrap();
        let c_now = service.get_collection(&c).await.unwrap();
        assert_eq!(a_now.parent_path, Some(format!("/{}", target)));
        assert_eq!(b_now.parent_path, Some(format!("/{}/{}", target, a)));
        assert_eq!(c_now.parent_path, Some(format!("/{}/{}/{}", target, a, b)));

        // And back to the root
        assert_eq!(service.move_collection(&a, None).await.unwrap(), 3);
        assert!(service.get_collection(&a).await.unwrap().is_root());
        let c_back = service.get_collection(&c).await.unwrap();
        assert_eq!(c_back.parent_path, Some(format!("/{}/{}", a, b)));
    }

    #[tokio::test]
    async fn test_move_into_own_subtree_is_rejected() {
        let (service, _) = setup(false);
        let a = create(&service, "A", None).await;
        let b = create(&service, "B", Some(&a)).await;

        assert!(matches!(
            service.move_collection(&a, Some(&b)).await,
            Err(DomainError::InvalidInput(_))
        ));
        assert!(matches!(
            service.move_collection(&a, Some(&CollectionId::from("ghost"))).await,
            Err(DomainError::NotFound(_))
        ));
        // Nothing moved
        assert!(service.get_collection(&a).await.unwrap().is_root());
    }

    #[tokio::test]
    async fn test_delete_collection_cascades() {
        let (service, remote) = setup(true);
        let a = create(&service, "A", None).await;
        let b = create(&service, "B", Some(&a)).await;
        let _c = create(&service, "C", Some(&b)).await;
        let keep = create(&service, "Keep", None).await;

        service.delete_collection(&a).await.unwrap();
        let left = service.list_collections().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, keep);

        // Never synced, so no remote delete
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_synced_collection_deletes_remote() {
        let (service, remote) = setup(true);
        let a = create(&service, "A", None).await;
        let stored = service.get_collection(&a).await.unwrap();
        service.create_remote_collection(&a, &stored).await.unwrap();

        service.delete_collection(&a).await.unwrap();
        assert_eq!(remote.calls().last().unwrap(), "delete_collection srv-1");
    }

    #[tokio::test]
    async fn test_update_collection_replaces_record() {
        let (service, remote) = setup(true);
        let parent = create(&service, "Parent", None).await;
        let child = create(&service, "Child", Some(&parent)).await;
        let parent_record = service.get_collection(&parent).await.unwrap();
        service
            .create_remote_collection(&parent, &parent_record)
            .await
            .unwrap();
        let child_record = service.get_collection(&child).await.unwrap();
        service
            .create_remote_collection(&child, &child_record)
            .await
            .unwrap();

        let mut replacement = service.get_collection(&child).await.unwrap();
        replacement.title = "Renamed".into();
        replacement.queries = vec![QueryItem::new("Only")];
        replacement.extra.insert("note".into(), json!("x"));
        let before = replacement.updated_at;
        service
            .update_collection(&child, replacement)
            .await
            .unwrap();

        let stored = service.get_collection(&child).await.unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.queries.len(), 1);
        assert_eq!(stored.extra.get("note"), Some(&json!("x")));
        assert!(stored.updated_at > before);
        assert_eq!(
            remote.calls().last().unwrap(),
            "update_collection srv-2 Renamed parent=srv-1"
        );
    }

    #[tokio::test]
    async fn test_update_collection_keeps_sync_state() {
        let (service, remote) = setup(true);
        let id = create(&service, "A", None).await;
        let stored = service.get_collection(&id).await.unwrap();
        service.create_remote_collection(&id, &stored).await.unwrap();
        let created_at = service.get_collection(&id).await.unwrap().created_at;

        // Caller builds a fresh record without server id or timestamps
        service
            .update_collection(&id, Collection::new(id.clone(), "Renamed"))
            .await
            .unwrap();

        let updated = service.get_collection(&id).await.unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.server_id.as_deref(), Some("srv-1"));
        assert_eq!(updated.created_at, created_at);
        assert_eq!(
            remote.calls().last().unwrap(),
            "update_collection srv-1 Renamed parent=-"
        );
    }

    // ========================================================================
    // Remote push and gating
    // ========================================================================

    #[tokio::test]
    async fn test_create_remote_collection_stamps_server_ids() {
        let (service, _) = setup(true);
        let new = NewCollection::new("A")
            .with_queries(vec![QueryItem::new("W1"), QueryItem::new("W2")]);
        let id = service.create_collection(new, None).await.unwrap();
        let stored = service.get_collection(&id).await.unwrap();

        service.create_remote_collection(&id, &stored).await.unwrap();
        let synced = service.get_collection(&id).await.unwrap();
        assert_eq!(synced.server_id.as_deref(), Some("srv-1"));
        assert_eq!(synced.queries[0].server_id.as_deref(), Some("srv-1-q0"));
        assert_eq!(synced.queries[1].server_id.as_deref(), Some("srv-1-q1"));
    }

    #[tokio::test]
    async fn test_create_remote_collection_rejected() {
        let (service, remote) = setup(true);
        remote.reject.store(true, Ordering::SeqCst);
        let id = create(&service, "A", None).await;
        let stored = service.get_collection(&id).await.unwrap();

        let result = service.create_remote_collection(&id, &stored).await;
        assert!(matches!(result, Err(DomainError::RemoteRejected(_))));
        // The local record stays
        assert!(!service.get_collection(&id).await.unwrap().is_synced());
    }

    #[tokio::test]
    async fn test_remote_calls_skipped_when_signed_out() {
        let (service, remote) = setup(false);
        let id = create(&service, "A", None).await;
        let stored = service.get_collection(&id).await.unwrap();

        service.create_remote_collection(&id, &stored).await.unwrap();
        service.add_query(&id, QueryItem::new("W")).await.unwrap();
        assert_eq!(service.push_collection_tree(&id).await.unwrap(), 0);
        assert_eq!(service.sync_remote_to_local().await.unwrap(), SyncReport::default());

        assert!(remote.calls().is_empty());
        assert_eq!(service.get_collection(&id).await.unwrap().queries.len(), 1);
    }

    #[tokio::test]
    async fn test_push_tree_sends_parents_first() {
        let (service, remote) = setup(true);
        let a = create(&service, "A", None).await;
        let b = create(&service, "B", Some(&a)).await;
        let _c = create(&service, "C", Some(&b)).await;

        assert_eq!(service.push_collection_tree(&a).await.unwrap(), 3);
        assert_eq!(
            remote.calls(),
            vec![
                "create_collection A parent=-",
                "create_collection B parent=srv-1",
                "create_collection C parent=srv-2",
            ]
        );

        // Everything is synced now
        assert_eq!(service.push_collection_tree(&a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_query_to_unsynced_collection_stays_local() {
        let (service, remote) = setup(true);
        let id = create(&service, "A", None).await;

        let added = service.add_query(&id, QueryItem::new("W")).await.unwrap();
        assert!(added.id.is_some());
        assert!(added.server_id.is_none());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_query_to_synced_collection() {
        let (service, remote) = setup(true);
        let id = create(&service, "A", None).await;
        let stored = service.get_collection(&id).await.unwrap();
        service.create_remote_collection(&id, &stored).await.unwrap();

        let added = service.add_query(&id, QueryItem::new("W")).await.unwrap();
        assert_eq!(added.server_id.as_deref(), Some("q-srv-2"));
        assert_eq!(remote.calls().last().unwrap(), "create_queries srv-1");

        let stored = service.get_collection(&id).await.unwrap();
        assert_eq!(stored.queries[0].server_id.as_deref(), Some("q-srv-2"));
    }

    #[tokio::test]
    async fn test_add_query_rejected_keeps_local_write() {
        let (service, remote) = setup(true);
        let id = create(&service, "A", None).await;
        let stored = service.get_collection(&id).await.unwrap();
        service.create_remote_collection(&id, &stored).await.unwrap();
        remote.reject.store(true, Ordering::SeqCst);

        let result = service.add_query(&id, QueryItem::new("W")).await;
        assert!(matches!(result, Err(DomainError::RemoteRejected(_))));
        let stored = service.get_collection(&id).await.unwrap();
        assert_eq!(stored.queries.len(), 1);
        assert!(stored.queries[0].server_id.is_none());
    }

    #[tokio::test]
    async fn test_update_query_without_server_id_is_pushed_as_new() {
        let (service, remote) = setup(true);
        let id = create(&service, "A", None).await;
        let local = service.add_query(&id, QueryItem::new("W")).await.unwrap();
        let stored = service.get_collection(&id).await.unwrap();
        service.create_remote_collection(&id, &stored).await.unwrap();

        // Synced together with the collection
        let mut edited = service.get_collection(&id).await.unwrap().queries[0].clone();
        edited.content.insert("query".into(), json!("{ b }"));
        service.update_query(&id, edited).await.unwrap();
        assert_eq!(remote.calls().last().unwrap(), "update_query srv-1-q0");

        // A query created while offline has no server id yet
        let offline = service
            .repository()
            .modify(&id, |c| c.queries.push(QueryItem::new("Late")))
            .await
            .unwrap();
        assert_eq!(offline, 1);
        service
            .update_query(&id, QueryItem::new("Late").with_field("query", "{ c }"))
            .await
            .unwrap();
        assert_eq!(remote.calls().last().unwrap(), "create_queries srv-1");

        let stored = service.get_collection(&id).await.unwrap();
        let late = stored
            .queries
            .iter()
            .find(|q| q.window_name.as_deref() == Some("Late"))
            .unwrap();
        assert!(late.server_id.is_some());
        assert_eq!(late.content.get("query"), Some(&json!("{ c }")));
        assert_eq!(stored.queries[0].id, local.id);
    }

    #[tokio::test]
    async fn test_update_missing_query_is_not_found() {
        let (service, _) = setup(false);
        let id = create(&service, "A", None).await;
        let mut ghost = QueryItem::new("W");
        ghost.id = Some("ghost".into());
        assert!(matches!(
            service.update_query(&id, ghost).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_legacy_query_without_match_is_noop() {
        let (service, remote) = setup(true);
        let id = create(&service, "A", None).await;
        service.add_query(&id, QueryItem::new("W")).await.unwrap();
        let before = service.get_collection(&id).await.unwrap();

        // No id and a window name nothing carries
        service
            .update_query(&id, QueryItem::new("nomatch").with_field("query", "{ z }"))
            .await
            .unwrap();

        assert_eq!(service.get_collection(&id).await.unwrap(), before);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_query_without_match_is_noop() {
        let (service, remote) = setup(true);
        let id = create(&service, "A", None).await;
        service.add_query(&id, QueryItem::new("Keep")).await.unwrap();
        let before = service.get_collection(&id).await.unwrap().queries;

        // Legacy query: no id and an unknown window name
        service
            .delete_query(&id, &QueryItem::new("Unknown"))
            .await
            .unwrap();
        assert_eq!(service.get_collection(&id).await.unwrap().queries, before);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_query_by_window_name() {
        let (service, remote) = setup(true);
        let id = create(&service, "A", None).await;
        service.add_query(&id, QueryItem::new("Old")).await.unwrap();
        let stored = service.get_collection(&id).await.unwrap();
        service.create_remote_collection(&id, &stored).await.unwrap();

        service.delete_query(&id, &QueryItem::new("Old")).await.unwrap();
        assert!(service.get_collection(&id).await.unwrap().queries.is_empty());
        assert_eq!(remote.calls().last().unwrap(), "delete_query srv-1-q0");
    }

    // ========================================================================
    // Sync
    // ========================================================================

    async fn synced_local(service: &CollectionService, server_id: &str) -> Collection {
        let mut query = QueryItem::new("Local");
        query.server_id = Some("rq-1".into());
        let mut new = NewCollection::new("Local title").with_queries(vec![query]);
        new.server_id = Some(server_id.into());
        let id = service.create_collection(new, None).await.unwrap();
        service.get_collection(&id).await.unwrap()
    }

    #[tokio::test]
    async fn test_sync_remote_newer_beyond_tolerance_wins() {
        let (service, remote) = setup(true);
        let local = synced_local(&service, "srv-A").await;
        let local_query_ms = local.queries[0].updated_at.unwrap();

        let later = local.updated_at + 3 * 60_000;
        let mut theirs = remote_collection("srv-A", "Remote title", later);
        theirs.queries = vec![
            remote_query("rq-1", "Remote", local_query_ms + 3 * 60_000),
            remote_query("rq-2", "Extra", later),
        ];
        remote.serve(vec![theirs]);

        let report = service.sync_remote_to_local().await.unwrap();
        assert_eq!(report.updated, 1);

        let stored = service.get_collection(&local.id).await.unwrap();
        assert_eq!(stored.title, "Remote title");
        assert_eq!(stored.updated_at, later);
        assert_eq!(stored.queries.len(), 2);
        assert_eq!(stored.queries[0].window_name.as_deref(), Some("Remote"));
        assert_eq!(stored.queries[0].id, local.queries[0].id);
        assert_eq!(stored.queries[1].server_id.as_deref(), Some("rq-2"));
    }

    #[tokio::test]
    async fn test_sync_remote_within_tolerance_is_ignored() {
        let (service, remote) = setup(true);
        let local = synced_local(&service, "srv-A").await;

        let mut theirs = remote_collection("srv-A", "Remote title", local.updated_at + 60_000);
        theirs.queries = vec![remote_query("rq-1", "Remote", local.updated_at + 60_000)];
        remote.serve(vec![theirs]);

        let report = service.sync_remote_to_local().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                created: 0,
                updated: 0,
                unchanged: 1
            }
        );
        assert_eq!(service.get_collection(&local.id).await.unwrap(), local);
    }

    #[tokio::test]
    async fn test_sync_remote_exactly_at_tolerance_is_ignored() {
        let (service, remote) = setup(true);
        let local = synced_local(&service, "srv-A").await;

        let edge = local.updated_at + 120_000;
        let mut theirs = remote_collection("srv-A", "Remote title", edge);
        theirs.queries = vec![remote_query("rq-1", "Remote", edge)];
        remote.serve(vec![theirs]);

        let report = service.sync_remote_to_local().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                created: 0,
                updated: 0,
                unchanged: 1
            }
        );
        assert_eq!(service.get_collection(&local.id).await.unwrap(), local);
    }

    #[tokio::test]
    async fn test_sync_keeps_recent_local_query_and_unsynced_queries() {
        let (service, remote) = setup(true);
        let local = synced_local(&service, "srv-A").await;
        // Written while offline, so it never got a server id
        service
            .repository()
            .modify(&local.id, |c| c.queries.push(QueryItem::new("Offline")))
            .await
            .unwrap();
        let local = service.get_collection(&local.id).await.unwrap();
        let local_query_ms = local.queries[0].updated_at.unwrap();

        let mut theirs = remote_collection("srv-A", "Remote title", local.updated_at + 5 * 60_000);
        // Only one minute newer than the local copy of this query
        theirs.queries = vec![remote_query("rq-1", "Remote", local_query_ms + 60_000)];
        remote.serve(vec![theirs]);

        service.sync_remote_to_local().await.unwrap();
        let stored = service.get_collection(&local.id).await.unwrap();
        assert_eq!(stored.title, "Remote title");
        let windows: Vec<_> = stored
            .queries
            .iter()
            .map(|q| q.window_name.clone().unwrap_or_default())
            .collect();
        assert_eq!(windows, vec!["Local", "Offline"]);
    }

    #[tokio::test]
    async fn test_sync_creates_new_collections_parents_first() {
        let (service, remote) = setup(true);
        let mut child = remote_collection("srv-child", "Child", 1_000);
        child.parent_collection_id = Some("srv-parent".into());
        child.queries = vec![remote_query("rq-9", "W", 1_000)];
        let parent = remote_collection("srv-parent", "Parent", 1_000);
        let mut orphan = remote_collection("srv-orphan", "Orphan", 1_000);
        orphan.parent_collection_id = Some("srv-missing".into());
        remote.serve(vec![child, parent, orphan]);

        let report = service.sync_remote_to_local().await.unwrap();
        assert_eq!(report.created, 3);

        let repo = service.repository();
        let parent = repo.find_by_server_id("srv-parent").await.unwrap().unwrap();
        let child = repo.find_by_server_id("srv-child").await.unwrap().unwrap();
        let orphan = repo.find_by_server_id("srv-orphan").await.unwrap().unwrap();
        assert_eq!(child.parent_path, Some(parent.own_path()));
        assert!(orphan.is_root());
        assert_eq!(child.updated_at, 1_000);
        assert_eq!(child.queries[0].server_id.as_deref(), Some("rq-9"));
        assert_eq!(child.queries[0].updated_at, Some(1_000));

        // A second pull finds everything in place
        let again = service.sync_remote_to_local().await.unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.unchanged, 3);
        assert!(remote
            .calls()
            .iter()
            .all(|call| call == "get_collections"));
    }

    // ========================================================================
    // Import / export
    // ========================================================================

    #[tokio::test]
    async fn test_import_rejects_bad_payloads() {
        let (service, _) = setup(false);
        let empty = service.import_collection_data_from_json("").await.unwrap_err();
        assert_eq!(empty.to_string(), "String is empty.");

        let broken = service
            .import_collection_data_from_json("{not json")
            .await
            .unwrap_err();
        assert!(matches!(broken, DomainError::Json(_)));

        let wrong = service
            .import_collection_data_from_json(
                r#"{ "type": "collection", "id": "a", "title": "A" }"#,
            )
            .await
            .unwrap_err();
        assert!(matches!(wrong, DomainError::InvalidDocument(_)));
        assert!(service.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_twice_gives_disjoint_trees() {
        let (service, _) = setup(false);
        let document = r#"{
            "version": 1,
            "type": "collection",
            "id": "root",
            "title": "Root",
            "serverId": "srv-root",
            "queries": [{ "id": "q", "windowName": "W", "query": "{ a }" }],
            "collections": [
                { "id": "kid", "title": "Kid", "collections": [{ "id": "leaf", "title": "Leaf" }] }
            ]
        }"#;

        let first = service.import_collection_data_from_json(document).await.unwrap();
        let second = service.import_collection_data_from_json(document).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);

        let all: HashSet<_> = first.iter().chain(&second).map(|id| id.to_string()).collect();
        assert_eq!(all.len(), 6);
        assert!(!all.contains("root"));

        let trees = service.get_collection_trees().await.unwrap();
        assert_eq!(trees.len(), 2);
        for tree in &trees {
            assert_eq!(tree.title, "Root");
            assert_eq!(tree.server_id, None);
            assert_eq!(tree.queries[0].content.get("query"), Some(&json!("{ a }")));
            assert_ne!(tree.queries[0].id.as_deref(), Some("q"));
            assert_eq!(tree.collections[0].collections[0].title, "Leaf");
        }

        let leaf = service.get_collection(&first[2]).await.unwrap();
        assert_eq!(leaf.parent_path, Some(format!("/{}/{}", first[0], first[1])));
    }

    #[tokio::test]
    async fn test_export_then_import_copies_subtree() {
        let (service, _) = setup(false);
        let a = create(&service, "A", None).await;
        let b = create(&service, "B", Some(&a)).await;
        service.add_query(&b, QueryItem::new("W")).await.unwrap();
        let _other = create(&service, "Other", None).await;

        let json = service.export_collection_json(&a).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], json!(1));
        assert_eq!(value["type"], json!("collection"));
        assert_eq!(value["collections"][0]["title"], json!("B"));

        let copied = service.import_collection_data_from_json(&json).await.unwrap();
        assert_eq!(copied.len(), 2);
        let copy = service.get_collection(&copied[1]).await.unwrap();
        assert_eq!(copy.title, "B");
        assert_eq!(copy.queries.len(), 1);
        assert_eq!(service.list_collections().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_import_collection_file() {
        let (service, _) = setup(false);
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("export.json");
        std::fs::write(
            &file,
            r#"{ "version": 1, "type": "collection", "id": 1, "title": "From file" }"#,
        )
        .unwrap();

        let ids = service.import_collection_file(&file).await.unwrap();
        assert_eq!(service.get_collection(&ids[0]).await.unwrap().title, "From file");

        let missing = service
            .import_collection_file(&dir.path().join("nope.json"))
            .await;
        assert!(matches!(missing, Err(DomainError::Io(_))));
    }

    #[tokio::test]
    async fn test_open_with_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectionsConfig {
            database_path: dir.path().join("collections.db"),
            ..CollectionsConfig::default()
        };
        let id = {
            let service =
                CollectionService::open(&config, Arc::new(StaticSession::signed_out())).unwrap();
            create(&service, "Persisted", None).await
        };

        let service =
            CollectionService::open(&config, Arc::new(StaticSession::signed_out())).unwrap();
        assert_eq!(service.get_collection(&id).await.unwrap().title, "Persisted");
    }
}
