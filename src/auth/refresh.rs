//! Refresh controller implementation
//!
//! Per credential key the controller moves `Idle -> Refreshing` and ends in
//! one of `Succeeded`, `Failed` or `Throttled`. Every transition is written
//! to the credential store before the controller moves on, so other callers
//! see an attempt in flight even while the refresh call is slow.
//!
//! Concurrent attempts on the same key are not serialized; the store is
//! last-write-wins and only the ceiling and cooldown bound the overlap.

use super::types::{RefreshLimits, RefreshOutcome, RefreshRequest, RefreshResponse};
use crate::config::RefreshConfig;
use crate::credentials::{now_millis, CredentialRecord, CredentialStore};
use crate::error::{Error, Result};
use crate::resolver::AddressResolver;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

/// Drives token refresh for credential keys
#[derive(Clone)]
pub struct RefreshController {
    store: CredentialStore,
    resolver: Arc<AddressResolver>,
    http_client: Client,
    config: RefreshConfig,
}

impl RefreshController {
    /// Create a controller with its own HTTP client
    pub fn new(store: CredentialStore, resolver: Arc<AddressResolver>, config: RefreshConfig) -> Self {
        Self::with_client(store, resolver, config, Client::new())
    }

    /// Create a controller sharing an existing HTTP client
    pub fn with_client(
        store: CredentialStore,
        resolver: Arc<AddressResolver>,
        config: RefreshConfig,
        http_client: Client,
    ) -> Self {
        Self {
            store,
            resolver,
            http_client,
            config,
        }
    }

    /// Refresh settings
    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Default limits taken from the configuration
    pub fn limits(&self) -> RefreshLimits {
        RefreshLimits::from(&self.config)
    }

    /// Try to refresh with the configured ceiling and cooldown
    pub async fn attempt_refresh(&self, credential_key: &str) -> bool {
        self.refresh(credential_key, self.limits()).await.is_success()
    }

    /// Try to refresh with explicit limits
    pub async fn attempt_refresh_with(&self, credential_key: &str, limits: RefreshLimits) -> bool {
        self.refresh(credential_key, limits).await.is_success()
    }

    /// Run one refresh attempt and report how it ended
    pub async fn refresh(&self, credential_key: &str, limits: RefreshLimits) -> RefreshOutcome {
        let Some(mut record) = self.store.get(credential_key).await else {
            debug!(credential_key, "no credential record, refresh impossible");
            return RefreshOutcome::NoCredentials;
        };
        let Some(refresh_token) = record.refresh_token.clone().filter(|t| !t.is_empty()) else {
            debug!(credential_key, "credential record has no refresh token");
            return RefreshOutcome::NoCredentials;
        };

        let now = now_millis();
        if record.in_cooldown(now, limits.cooldown()) {
            debug!(credential_key, "refresh cooling down after recent failure");
            return RefreshOutcome::Throttled;
        }

        if record.refresh_attempts >= limits.max_attempts {
            record.refresh_attempts = limits.max_attempts;
            record.last_refresh_failed = true;
            record.last_refresh_time = now;
            self.persist(credential_key, &record).await;
            warn!(
                credential_key,
                max_attempts = limits.max_attempts,
                "refresh attempts exhausted"
            );
            return RefreshOutcome::Exhausted;
        }

        record.refresh_attempts += 1;
        self.persist(credential_key, &record).await;

        match self.call_refresh_endpoint(&refresh_token).await {
            Ok(tokens) => {
                let refreshed = CredentialRecord {
                    access_token: Some(tokens.access),
                    refresh_token: Some(tokens.refresh.unwrap_or(refresh_token)),
                    refresh_attempts: 0,
                    last_refresh_failed: false,
                    last_refresh_time: now_millis(),
                };
                self.persist(credential_key, &refreshed).await;
                debug!(credential_key, "token refresh succeeded");
                RefreshOutcome::Succeeded
            }
            Err(e) => {
                record.last_refresh_failed = true;
                record.last_refresh_time = now_millis();
                self.persist(credential_key, &record).await;
                warn!(
                    credential_key,
                    attempt = record.refresh_attempts,
                    error = %e,
                    "token refresh failed"
                );
                RefreshOutcome::Failed
            }
        }
    }

    async fn persist(&self, credential_key: &str, record: &CredentialRecord) {
        if !self.store.set(credential_key, record).await {
            warn!(credential_key, "could not persist refresh bookkeeping");
        }
    }

    /// POST the refresh token to the auth service
    async fn call_refresh_endpoint(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let url = self
            .resolver
            .resolve(&self.config.auth_service, &self.config.refresh_path)
            .await;

        let response = self
            .http_client
            .post(&url)
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .timeout(self.config.timeout())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    }
                } else {
                    Error::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenRefresh {
                message: format!("Refresh request failed with status {status}: {body}"),
            });
        }

        let tokens: RefreshResponse = response.json().await.map_err(|e| Error::TokenRefresh {
            message: format!("Malformed refresh response: {e}"),
        })?;
        if tokens.access.is_empty() {
            return Err(Error::TokenRefresh {
                message: "Refresh response carried an empty access token".to_string(),
            });
        }
        Ok(tokens)
    }
}

impl std::fmt::Debug for RefreshController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
