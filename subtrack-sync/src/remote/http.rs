//! HTTP implementation of the remote data service.
//!
//! Talks JSON to the backend's REST API. Error classification happens here:
//! connection faults, timeouts and 5xx/429 responses are transient; any
//! other 4xx is a terminal rejection. Idempotency of creates rides on the
//! `Idempotency-Key` header carrying the client correlation id.

use super::{RemoteError, RemoteRecord, RemoteResult, RemoteService};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use subtrack_types::{Collection, OwnerId, RecordId};
use tracing::debug;

/// Configuration for the HTTP remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRemoteConfig {
    /// Base URL of the API (e.g. `https://api.subtrack.app`).
    pub base_url: String,
    /// Bearer token, when the session is authenticated.
    pub bearer_token: Option<String>,
    /// Transport-level timeout for a single request.
    pub request_timeout_secs: u64,
}

impl Default for HttpRemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.subtrack.app".to_string(),
            bearer_token: None,
            request_timeout_secs: 60,
        }
    }
}

/// HTTP remote data service client.
pub struct HttpRemote {
    config: HttpRemoteConfig,
    client: Client,
}

impl HttpRemote {
    /// Creates a new HTTP remote client.
    pub fn new(config: HttpRemoteConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to create HTTP client");
        Self { config, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        classify_status(response).await
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn create_entity(
        &self,
        collection: Collection,
        correlation_id: &RecordId,
        payload: &serde_json::Value,
    ) -> RemoteResult<RemoteRecord> {
        debug!("POST {} ({})", collection, correlation_id);
        let response = self
            .send(
                self.client
                    .post(self.url(collection.as_str()))
                    .header("Idempotency-Key", correlation_id.as_str())
                    .json(payload),
            )
            .await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Terminal(format!("malformed create response: {e}")))
    }

    async fn update_entity(
        &self,
        collection: Collection,
        id: &RecordId,
        payload: &serde_json::Value,
    ) -> RemoteResult<Option<RemoteRecord>> {
        debug!("PUT {}/{}", collection, id);
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("{}/{}", collection.as_str(), id)))
                    .json(payload),
            )
            .await?;
        decode_optional_record(response).await
    }

    async fn delete_entity(&self, collection: Collection, id: &RecordId) -> RemoteResult<()> {
        debug!("DELETE {}/{}", collection, id);
        let result = self
            .send(
                self.client
                    .delete(self.url(&format!("{}/{}", collection.as_str(), id))),
            )
            .await;
        // A retried delete may find the entity already gone.
        match result {
            Err(RemoteError::Terminal(msg)) if msg.starts_with("404") => Ok(()),
            Err(e) => Err(e),
            Ok(_) => Ok(()),
        }
    }

    async fn mark_read(&self, id: &RecordId) -> RemoteResult<()> {
        debug!("POST notifications/{}/read", id);
        let result = self
            .send(self.client.post(self.url(&format!("notifications/{id}/read"))))
            .await;
        // A retried mark-read may find the notification already gone.
        match result {
            Err(RemoteError::Terminal(msg)) if msg.starts_with("404") => Ok(()),
            Err(e) => Err(e),
            Ok(_) => Ok(()),
        }
    }

    async fn update_preferences(
        &self,
        owner: &OwnerId,
        payload: &serde_json::Value,
    ) -> RemoteResult<Option<RemoteRecord>> {
        debug!("PUT owners/{}/preferences", owner);
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("owners/{owner}/preferences")))
                    .json(payload),
            )
            .await?;
        decode_optional_record(response).await
    }

    async fn fetch_all(
        &self,
        collection: Collection,
        owner: &OwnerId,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        debug!("GET {}?owner={}", collection, owner);
        let response = self
            .send(
                self.client
                    .get(self.url(collection.as_str()))
                    .query(&[("owner", owner.to_string())]),
            )
            .await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Terminal(format!("malformed list response: {e}")))
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> RemoteError {
    // Anything that never reached the server, or timed out, is transient.
    RemoteError::Transient(error.to_string())
}

async fn classify_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("{} {}", status.as_u16(), body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(RemoteError::Transient(message))
    } else {
        Err(RemoteError::Terminal(message))
    }
}

async fn decode_optional_record(response: Response) -> RemoteResult<Option<RemoteRecord>> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| RemoteError::Transient(format!("failed to read response: {e}")))?;
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| RemoteError::Terminal(format!("malformed record response: {e}")))
}
