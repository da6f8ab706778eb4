//! HTTP session against the store's REST interface
//!
//! # Endpoints
//!
//! - `POST /nodes` → `201 {id, ver}`
//! - `GET /nodes/{id}` → `200` document, `404`
//! - `PUT /nodes/{id}` → `200 {ver}`, `409` on a stale version
//! - `DELETE /nodes/{id}?ver={ver}` → `204`, `409`, `404`
//! - `POST /nodes/query` → `200 {results, page_size, result_count}`
//!
//! Every request carries HTTP basic credentials. The underlying
//! `reqwest::Client` pools connections and is safe to share across tasks;
//! the session holds no other mutable state.

use super::{NodeStore, RetryPolicy, StoreError, TransportError};
use crate::config::SessionConfig;
use crate::models::{InsertReceipt, NodeDocument, QueryPage, StoreQuery, UpdateReceipt};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    /// Safe to repeat
    Read,
    /// Repeated only if the connection was never established
    Write,
}

#[derive(Deserialize)]
struct ConflictBody {
    ver: Option<u64>,
}

/// Authenticated client for one store endpoint
pub struct HttpSession {
    client: Client,
    base_url: String,
    namespace: String,
    username: String,
    password: String,
    page_size: usize,
    retry: RetryPolicy,
}

impl HttpSession {
    pub fn new(config: SessionConfig) -> Result<Self, TransportError> {
        config
            .validate()
            .map_err(|e| TransportError::config(e.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::config(format!("failed to build HTTP client: {e}")))?;

        tracing::debug!(
            base_url = %config.base_url,
            namespace = %config.namespace,
            user = %config.username,
            "Opened store session"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            namespace: config.namespace,
            username: config.username,
            password: config.password,
            page_size: config.page_size,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn nodes_url(&self) -> String {
        format!("{}/nodes", self.base_url)
    }

    fn node_url(&self, id: &str) -> String {
        format!("{}/nodes/{}", self.base_url, urlencoding::encode(id))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.password))
    }

    /// Dispatch a request, retrying only where repeating it is safe
    async fn send<F>(
        &self,
        kind: CallKind,
        operation: &'static str,
        id: Option<&str>,
        build: F,
    ) -> Result<Response, StoreError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            match self.authorize(build()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if kind == CallKind::Read
                        && status.is_server_error()
                        && self.retry.allows(attempt)
                    {
                        tracing::warn!(
                            operation,
                            status = status.as_u16(),
                            attempt = attempt + 1,
                            "Store returned server error, retrying read"
                        );
                        self.retry.wait(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    let retryable = err.is_connect() || (kind == CallKind::Read && err.is_timeout());
                    if retryable && self.retry.allows(attempt) {
                        tracing::warn!(
                            operation,
                            attempt = attempt + 1,
                            error = %err,
                            "Store request failed before completion, retrying"
                        );
                        self.retry.wait(attempt).await;
                        attempt += 1;
                        continue;
                    }

                    if kind == CallKind::Write && !err.is_connect() && !err.is_builder() {
                        tracing::error!(
                            operation,
                            id = id.unwrap_or("-"),
                            error = %err,
                            "Write dispatched but outcome unknown"
                        );
                        return Err(StoreError::ambiguous(operation, id, err.to_string()));
                    }
                    return Err(StoreError::Transport(err.into()));
                }
            }
        }
    }

    /// Decode the body of a successful write
    ///
    /// The store has committed the write at this point, so a body that cannot
    /// be read leaves the caller without the new id or version.
    async fn decode_write<T: DeserializeOwned>(
        response: Response,
        operation: &'static str,
        id: Option<&str>,
    ) -> Result<T, StoreError> {
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::ambiguous(operation, id, e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(operation, error = %e, "Unreadable response to committed write");
            StoreError::ambiguous(operation, id, format!("unreadable response: {e}"))
        })
    }

    async fn decode_read<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let text = response.text().await.map_err(TransportError::from)?;
        serde_json::from_str(&text).map_err(|e| TransportError::decode(e.to_string()).into())
    }
}

/// Response body for diagnostics; a failed read is described in its place
async fn body_text(response: Response) -> String {
    match response.text().await {
        Ok(text) => text,
        Err(e) => format!("<failed to read response body: {e}>"),
    }
}

/// Map a status that no operation treats as success or a domain outcome
fn unexpected_status(status: StatusCode, body: String) -> StoreError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            StoreError::rejected(status.as_u16(), body)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TransportError::Unauthorized {
                status: status.as_u16(),
            }
            .into()
        }
        _ => TransportError::server(status.as_u16(), body).into(),
    }
}

fn conflict(id: &str, expected: u64, body: &str) -> StoreError {
    let actual = serde_json::from_str::<ConflictBody>(body)
        .ok()
        .and_then(|b| b.ver);
    StoreError::version_conflict(id, expected, actual)
}

#[async_trait]
impl NodeStore for HttpSession {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn insert(&self, doc: &NodeDocument) -> Result<InsertReceipt, StoreError> {
        let url = self.nodes_url();
        let response = self
            .send(CallKind::Write, "insert", None, || {
                self.client.post(&url).json(doc)
            })
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let receipt: InsertReceipt = Self::decode_write(response, "insert", None).await?;
                tracing::info!(id = %receipt.id, node_type = %doc.node_type, "Inserted node");
                Ok(receipt)
            }
            status => {
                let err = unexpected_status(status, body_text(response).await);
                tracing::warn!(node_type = %doc.node_type, error = %err, "Insert refused");
                Err(err)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<NodeDocument, StoreError> {
        let url = self.node_url(id);
        let response = self
            .send(CallKind::Read, "get", Some(id), || self.client.get(&url))
            .await?;

        match response.status() {
            StatusCode::OK => Self::decode_read(response).await,
            StatusCode::NOT_FOUND => Err(StoreError::not_found(id)),
            status => Err(unexpected_status(status, body_text(response).await)),
        }
    }

    async fn update(
        &self,
        id: &str,
        version: u64,
        doc: &NodeDocument,
    ) -> Result<UpdateReceipt, StoreError> {
        let mut body = serde_json::to_value(doc)
            .map_err(|e| TransportError::Request(format!("failed to encode document: {e}")))?;
        body["id"] = json!(id);
        body["ver"] = json!(version);

        let url = self.node_url(id);
        let response = self
            .send(CallKind::Write, "update", Some(id), || {
                self.client.put(&url).json(&body)
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let receipt: UpdateReceipt =
                    Self::decode_write(response, "update", Some(id)).await?;
                tracing::info!(id, ver = receipt.ver, "Updated node");
                Ok(receipt)
            }
            StatusCode::CONFLICT => {
                let err = conflict(id, version, &body_text(response).await);
                tracing::warn!(id, expected = version, "Update refused: stale version");
                Err(err)
            }
            StatusCode::NOT_FOUND => Err(StoreError::not_found(id)),
            status => Err(unexpected_status(status, body_text(response).await)),
        }
    }

    async fn remove(&self, id: &str, version: u64) -> Result<(), StoreError> {
        let url = self.node_url(id);
        let response = self
            .send(CallKind::Write, "delete", Some(id), || {
                self.client.delete(&url).query(&[("ver", version)])
            })
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                tracing::info!(id, "Deleted node");
                Ok(())
            }
            StatusCode::CONFLICT => {
                tracing::warn!(id, expected = version, "Delete refused: stale version");
                Err(conflict(id, version, &body_text(response).await))
            }
            StatusCode::NOT_FOUND => Err(StoreError::not_found(id)),
            status => Err(unexpected_status(status, body_text(response).await)),
        }
    }

    async fn query(&self, query: &StoreQuery, page: usize) -> Result<QueryPage, StoreError> {
        let body = json!({
            "ns": query.ns,
            "page": page,
            "page_size": self.page_size,
            "query": query.to_oql(),
            "criteria": query.criteria,
        });

        let url = format!("{}/query", self.nodes_url());
        let response = self
            .send(CallKind::Read, "query", None, || {
                self.client.post(&url).json(&body)
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let page_result: QueryPage = Self::decode_read(response).await?;
                tracing::debug!(
                    page,
                    returned = page_result.results.len(),
                    total = page_result.result_count,
                    "Fetched query page"
                );
                Ok(page_result)
            }
            status => Err(unexpected_status(status, body_text(response).await)),
        }
    }
}
