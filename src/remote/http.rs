//! HTTP client for the remote collection service.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::{CreatedCollection, RemoteApi, RemoteCollection};
use crate::config::RemoteConfig;
use crate::domain::{Collection, DomainResult, QueryItem};

pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionRequest<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_collection_id: Option<&'a str>,
    queries: Vec<Map<String, Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateQueriesRequest<'a> {
    collection_id: &'a str,
    queries: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateQueriesResponse {
    #[serde(default)]
    query_ids: Vec<String>,
}

#[derive(Serialize)]
struct UpdateQueryRequest {
    content: Map<String, Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCollectionRequest<'a> {
    title: &'a str,
    parent_collection_id: Option<&'a str>,
}

impl HttpRemoteApi {
    pub fn new(config: &RemoteConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> DomainResult<Response> {
        let response = self.authorized(request).send().await?;
        if !response.status().is_success() {
            log::warn!("Remote {} failed with status {}", action, response.status());
        }
        Ok(response.error_for_status()?)
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create_query_collection(
        &self,
        collection: &Collection,
        parent_server_id: Option<&str>,
    ) -> DomainResult<Option<CreatedCollection>> {
        let body = CreateCollectionRequest {
            title: &collection.title,
            parent_collection_id: parent_server_id,
            queries: collection.queries.iter().map(QueryItem::remote_content).collect(),
        };
        let response = self
            .send(
                self.client.post(self.url("/query-collections")).json(&body),
                "collection create",
            )
            .await?;
        Ok(response.json::<Option<CreatedCollection>>().await?)
    }

    async fn create_queries(
        &self,
        collection_server_id: &str,
        queries: &[QueryItem],
    ) -> DomainResult<Vec<String>> {
        let body = CreateQueriesRequest {
            collection_id: collection_server_id,
            queries: queries.iter().map(QueryItem::remote_content).collect(),
        };
        let response = self
            .send(self.client.post(self.url("/queries")).json(&body), "query create")
            .await?;
        let created: CreateQueriesResponse = response.json().await?;
        Ok(created.query_ids)
    }

    async fn update_query(&self, server_id: &str, query: &QueryItem) -> DomainResult<()> {
        let body = UpdateQueryRequest {
            content: query.remote_content(),
        };
        self.send(
            self.client
                .patch(self.url(&format!("/queries/{}", server_id)))
                .json(&body),
            "query update",
        )
        .await?;
        Ok(())
    }

    async fn update_collection(
        &self,
        server_id: &str,
        collection: &Collection,
        parent_server_id: Option<&str>,
    ) -> DomainResult<()> {
        let body = UpdateCollectionRequest {
            title: &collection.title,
            parent_collection_id: parent_server_id,
        };
        self.send(
            self.client
                .patch(self.url(&format!("/query-collections/{}", server_id)))
                .json(&body),
            "collection update",
        )
        .await?;
        Ok(())
    }

    async fn delete_query(&self, server_id: &str) -> DomainResult<()> {
        self.send(
            self.client.delete(self.url(&format!("/queries/{}", server_id))),
            "query delete",
        )
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, server_id: &str) -> DomainResult<()> {
        self.send(
            self.client
                .delete(self.url(&format!("/query-collections/{}", server_id))),
            "collection delete",
        )
        .await?;
        Ok(())
    }

    async fn get_collections(&self) -> DomainResult<Vec<RemoteCollection>> {
        let response = self
            .send(self.client.get(self.url("/query-collections")), "collection list")
            .await?;
        Ok(response.json().await?)
    }
}
