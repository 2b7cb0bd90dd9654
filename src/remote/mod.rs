//! Remote Layer
//!
//! Contracts for the collaborators that live outside this crate: the remote
//! collection service and the account/session provider.

mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::domain::{Collection, DomainError, DomainResult, QueryItem};

pub use http::HttpRemoteApi;

/// Signed-in account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Source of the current session. Remote operations only run with a user.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_user(&self) -> DomainResult<Option<User>>;
}

/// Session held in memory, switched by the embedding application
#[derive(Default)]
pub struct StaticSession {
    user: RwLock<Option<User>>,
}

impl StaticSession {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(user: User) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    pub async fn sign_in(&self, user: User) {
        *self.user.write().await = Some(user);
    }

    pub async fn sign_out(&self) {
        *self.user.write().await = None;
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn get_user(&self) -> DomainResult<Option<User>> {
        Ok(self.user.read().await.clone())
    }
}

/// Server ids handed back when a collection is created remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCollection {
    pub collection_id: String,
    /// One id per submitted query, in submission order
    #[serde(default)]
    pub query_ids: Vec<String>,
}

/// A query as stored by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteQuery {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub content: Map<String, Value>,
}

/// A collection as stored by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCollection {
    pub id: String,
    pub collection_name: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub parent_collection_id: Option<String>,
    #[serde(default)]
    pub queries: Vec<RemoteQuery>,
}

/// Remote collection service
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create `collection` with its queries. `None` means the service
    /// accepted the call but created nothing.
    async fn create_query_collection(
        &self,
        collection: &Collection,
        parent_server_id: Option<&str>,
    ) -> DomainResult<Option<CreatedCollection>>;

    /// Add queries to an existing remote collection, returning their server ids
    async fn create_queries(
        &self,
        collection_server_id: &str,
        queries: &[QueryItem],
    ) -> DomainResult<Vec<String>>;

    async fn update_query(&self, server_id: &str, query: &QueryItem) -> DomainResult<()>;

    async fn update_collection(
        &self,
        server_id: &str,
        collection: &Collection,
        parent_server_id: Option<&str>,
    ) -> DomainResult<()>;

    async fn delete_query(&self, server_id: &str) -> DomainResult<()>;

    async fn delete_collection(&self, server_id: &str) -> DomainResult<()>;

    async fn get_collections(&self) -> DomainResult<Vec<RemoteCollection>>;
}

/// Stand-in used when no remote service is configured.
///
/// Pulls see an empty service; pushes fail loudly.
pub struct OfflineRemote;

impl OfflineRemote {
    fn unavailable() -> DomainError {
        DomainError::Config("no remote service configured".to_string())
    }
}

#[async_trait]
impl RemoteApi for OfflineRemote {
    async fn create_query_collection(
        &self,
        _collection: &Collection,
        _parent_server_id: Option<&str>,
    ) -> DomainResult<Option<CreatedCollection>> {
        Err(Self::unavailable())
    }

    async fn create_queries(
        &self,
        _collection_server_id: &str,
        _queries: &[QueryItem],
    ) -> DomainResult<Vec<String>> {
        Err(Self::unavailable())
    }

    async fn update_query(&self, _server_id: &str, _query: &QueryItem) -> DomainResult<()> {
        Err(Self::unavailable())
    }

    async fn update_collection(
        &self,
        _server_id: &str,
        _collection: &Collection,
        _parent_server_id: Option<&str>,
    ) -> DomainResult<()> {
        Err(Self::unavailable())
    }

    async fn delete_query(&self, _server_id: &str) -> DomainResult<()> {
        Err(Self::unavailable())
    }

    async fn delete_collection(&self, _server_id: &str) -> DomainResult<()> {
        Err(Self::unavailable())
    }

    async fn get_collections(&self) -> DomainResult<Vec<RemoteCollection>> {
        Ok(Vec::new())
    }
}
