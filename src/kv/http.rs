//! HTTP-backed key-value store
//!
//! Wire protocol:
//!
//! - `GET {base}/get?key=<key>` returns `{"exists": bool, "value": string|null}`
//! - `POST {base}/set` with `{"key": ..., "value": ...}`
//! - `POST {base}/delete` with `{"key": ...}`
//!
//! The service offers no compare-and-set, so writes are last-write-wins.

use super::store::KeyValueStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    exists: bool,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetRequest<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    key: &'a str,
}

/// Key-value store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpKeyValueStore {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpKeyValueStore {
    /// Create a store client for the service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(Client::new(), base_url, timeout)
    }

    /// Create a store client sharing an existing HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Base URL of the store service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, op: &str) -> String {
        format!("{}/{op}", self.base_url)
    }

    async fn check(&self, op: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::store(format!(
            "{op} failed with status {}: {body}",
            status.as_u16()
        )))
    }

    fn map_send_error(&self, op: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            return Error::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            };
        }
        Error::store(format!("{op} request failed: {err}"))
    }
}

#[async_trait]
impl KeyValueStore for HttpKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.endpoint("get"))
            .query(&[("key", key)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error("get", e))?;
        let response = self.check("get", response).await?;

        let body: GetResponse = response
            .json()
            .await
            .map_err(|e| Error::store(format!("malformed get response: {e}")))?;

        debug!(key, exists = body.exists, "kv get");
        Ok(if body.exists { body.value } else { None })
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("set"))
            .json(&SetRequest { key, value })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error("set", e))?;
        self.check("set", response).await?;
        debug!(key, "kv set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("delete"))
            .json(&DeleteRequest { key })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error("delete", e))?;
        self.check("delete", response).await?;
        debug!(key, "kv delete");
        Ok(())
    }
}
