//! Request executor
//!
//! Per-call flow:
//!
//! ```text
//! Pending ──2xx──────────────────────────────▶ Succeeded
//!    │──401──▶ refresh ok ──▶ RetryingAfterRefresh ──2xx──▶ Succeeded
//!    │                │                        └──401/403─▶ Escalated
//!    │                └─ refresh not ok ───────────────────▶ Escalated
//!    └──403────────────────────────────────────────────────▶ Escalated
//! ```
//!
//! Other statuses and transport failures are returned as errors without any
//! retry; `execute_with_server_retry` lets callers opt into a bounded 5xx retry.

use super::retry::{RefreshRetryPolicy, ServerRetryPolicy};
use super::types::{ApiResponse, Outcome, ReauthReason, ReauthSignal, RequestOptions};
use crate::auth::RefreshController;
use crate::config::HttpConfig;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::resolver::AddressResolver;
use crate::types::Method;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the reauthentication broadcast channel
const REAUTH_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Pending,
    RetryingAfterRefresh,
}

/// Resolves, authenticates and sends requests to backend services
pub struct RequestExecutor {
    client: Client,
    config: HttpConfig,
    resolver: Arc<AddressResolver>,
    store: CredentialStore,
    refresher: Arc<RefreshController>,
    retry_policy: RefreshRetryPolicy,
    reauth_tx: broadcast::Sender<ReauthSignal>,
}

impl RequestExecutor {
    /// Create an executor with the default refresh retry policy
    pub fn new(
        resolver: Arc<AddressResolver>,
        store: CredentialStore,
        refresher: Arc<RefreshController>,
        config: HttpConfig,
    ) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default HTTP client");
                Client::new()
            });
        let (reauth_tx, _) = broadcast::channel(REAUTH_CHANNEL_CAPACITY);

        Self {
            client,
            config,
            resolver,
            store,
            refresher,
            retry_policy: RefreshRetryPolicy::default(),
            reauth_tx,
        }
    }

    /// Replace the refresh retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RefreshRetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Use an existing HTTP client
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Receive every reauthentication signal raised from now on
    pub fn subscribe_reauth(&self) -> broadcast::Receiver<ReauthSignal> {
        self.reauth_tx.subscribe()
    }

    /// HTTP settings
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Make a GET request
    pub async fn get(&self, service: &str, path: &str) -> Result<Outcome<ApiResponse>> {
        self.execute(service, path, RequestOptions::new()).await
    }

    /// Make a POST request with a JSON body
    pub async fn post(
        &self,
        service: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Outcome<ApiResponse>> {
        self.execute(service, path, RequestOptions::method(Method::POST).json(body))
            .await
    }

    /// Execute a request against `service`
    ///
    /// Transport failures, 404, 5xx and other non-auth statuses are `Err`.
    /// Terminal auth failures come back as `Outcome::RequiresReauthentication`.
    pub async fn execute(
        &self,
        service: &str,
        path: &str,
        options: RequestOptions,
    ) -> Result<Outcome<ApiResponse>> {
        let url = self.resolver.resolve(service, path).await;
        let credential_key = options
            .credential_key
            .clone()
            .unwrap_or_else(|| self.config.default_credential_key.clone());

        let mut state = CallState::Pending;
        let mut retries = 0;

        loop {
            let response = self.send(&url, &options, &credential_key).await?;
            let status = response.status();

            if status.is_success() {
                debug!("Request succeeded: {:?} {}", options.method, url);
                return Ok(Outcome::Success(ApiResponse::read(response).await?));
            }

            if options.authenticated && status == StatusCode::UNAUTHORIZED {
                if state == CallState::RetryingAfterRefresh {
                    warn!(credential_key, url = %url, "still unauthorized after token refresh");
                    return Ok(self
                        .escalate(&credential_key, ReauthReason::SessionExpired)
                        .await);
                }
                if !self.retry_policy.allows(retries) {
                    return Ok(self
                        .escalate(&credential_key, ReauthReason::SessionExpired)
                        .await);
                }

                let outcome = self
                    .refresher
                    .refresh(&credential_key, self.refresher.limits())
                    .await;
                if !outcome.is_success() {
                    // counters stay as they are so the cooldown keeps protecting the auth endpoint
                    let signal = ReauthSignal {
                        credential_key: credential_key.clone(),
                        reason: ReauthReason::RefreshUnavailable(outcome),
                    };
                    self.signal(signal.clone());
                    return Ok(Outcome::RequiresReauthentication(signal));
                }

                debug!(credential_key, url = %url, "token refreshed, replaying request");
                retries += 1;
                state = CallState::RetryingAfterRefresh;
                continue;
            }

            if options.authenticated && status == StatusCode::FORBIDDEN {
                warn!(credential_key, url = %url, "access forbidden");
                return Ok(self.escalate(&credential_key, ReauthReason::Forbidden).await);
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), url, body));
        }
    }

    /// Execute, retrying 5xx responses according to `policy`
    pub async fn execute_with_server_retry(
        &self,
        service: &str,
        path: &str,
        options: RequestOptions,
        policy: &ServerRetryPolicy,
    ) -> Result<Outcome<ApiResponse>> {
        let mut attempt = 0;
        loop {
            match self.execute(service, path, options.clone()).await {
                Err(err @ Error::ServerError { .. }) if attempt < policy.max_retries => {
                    let delay = policy.calculate_backoff(attempt);
                    warn!(
                        "Request failed with {}, attempt {}/{}, retrying in {:?}",
                        err,
                        attempt + 1,
                        policy.max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
        credential_key: &str,
    ) -> Result<Response> {
        let timeout = options.timeout.unwrap_or_else(|| self.budget(options.method));
        let mut req = self.client.request(options.method.into(), url);

        for (key, value) in &options.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if !options.query.is_empty() {
            req = req.query(&options.query);
        }

        if let Some(ref body) = options.body {
            req = req.json(body);
        }

        req = req.timeout(timeout);

        // read on every attempt so a replay picks up the refreshed token
        if options.authenticated {
            match self.store.access_token(credential_key).await {
                Some(token) => req = req.bearer_auth(token),
                None => debug!(credential_key, "no access token stored, sending without one"),
            }
        }

        req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                Error::from(e)
            }
        })
    }

    fn budget(&self, method: Method) -> Duration {
        if method.is_read() {
            self.config.read_timeout()
        } else {
            self.config.write_timeout()
        }
    }

    /// Clear bookkeeping, let the write settle, then signal reauthentication
    async fn escalate(&self, credential_key: &str, reason: ReauthReason) -> Outcome<ApiResponse> {
        if !self.store.reset_attempts(credential_key).await {
            warn!(credential_key, "could not clear refresh bookkeeping");
        }
        tokio::time::sleep(self.config.reauth_settle()).await;

        let signal = ReauthSignal {
            credential_key: credential_key.to_string(),
            reason,
        };
        self.signal(signal.clone());
        Outcome::RequiresReauthentication(signal)
    }

    fn signal(&self, signal: ReauthSignal) {
        // no subscribers is fine; the outcome carries the signal too
        let _ = self.reauth_tx.send(signal);
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("config", &self.config)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}
