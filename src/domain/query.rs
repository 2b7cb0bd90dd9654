//! Query Entity
//!
//! A saved query lives inside exactly one collection, embedded in its
//! `queries` array. Everything besides the identity and timestamps is opaque
//! content owned by the editor (query text, variables, url, headers ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::DomainResult;

/// A saved query inside a collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryItem {
    /// Local identifier, assigned at creation. Legacy records may lack one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Identifier on the remote service once the query has been pushed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Editor window the query was saved from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_name: Option<String>,
    #[serde(rename = "created_at", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(rename = "updated_at", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Query payload
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl QueryItem {
    pub fn new(window_name: impl Into<String>) -> Self {
        Self {
            window_name: Some(window_name.into()),
            ..Default::default()
        }
    }

    /// Builder-style helper to set a content field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Stamp identity and timestamps for a freshly created query
    pub fn stamp_new(&mut self, now: i64) {
        self.id = Some(Self::generate_id());
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    /// Whether `other` refers to this query: by id when `other` has one,
    /// otherwise by window name (legacy records)
    pub fn matches(&self, other: &QueryItem) -> bool {
        match (&other.id, &other.window_name) {
            (Some(id), _) => self.id.as_deref() == Some(id.as_str()),
            (None, Some(window)) => self.window_name.as_deref() == Some(window.as_str()),
            (None, None) => false,
        }
    }

    /// Payload sent to the remote service: everything except local identity
    /// and timestamps
    pub fn remote_content(&self) -> Map<String, Value> {
        let mut content = self.content.clone();
        if let Some(window) = &self.window_name {
            content.insert("windowName".to_string(), Value::String(window.clone()));
        }
        content
    }

    /// Rebuild a query from remote content
    pub fn from_remote_content(
        server_id: &str,
        updated_at: i64,
        content: &Map<String, Value>,
    ) -> DomainResult<Self> {
        let mut query: QueryItem = serde_json::from_value(Value::Object(content.clone()))?;
        query.id = None;
        query.server_id = Some(server_id.to_string());
        query.updated_at = Some(updated_at);
        Ok(query)
    }
}
