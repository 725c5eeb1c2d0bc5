//! Credential store implementation
//!
//! Wraps a `KeyValueStore` with the total contract the rest of the layer
//! relies on: reads never fail (missing or undecodable records are `None`),
//! writes report success as a `bool`.

use super::types::{CredentialRecord, Versioned};
use crate::kv::{CasOutcome, KeyValueStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key prefix for credential records in the shared store
pub const KEY_PREFIX: &str = "credential:";

/// How many times `update` re-reads after a compare-and-set conflict
const MAX_CAS_RETRIES: usize = 3;

/// Credential records keyed by credential key
#[derive(Debug, Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    /// Create a credential store over the given key-value backend
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn storage_key(credential_key: &str) -> String {
        format!("{KEY_PREFIX}{credential_key}")
    }

    /// Load a record and the stamp it was stored under
    pub async fn get_versioned(&self, credential_key: &str) -> Option<Versioned<CredentialRecord>> {
        let raw = match self.kv.get(&Self::storage_key(credential_key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(credential_key, error = %e, "credential read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(Versioned { value, stamp: raw }),
            Err(e) => {
                warn!(credential_key, error = %e, "discarding undecodable credential record");
                None
            }
        }
    }

    /// Load a record
    pub async fn get(&self, credential_key: &str) -> Option<CredentialRecord> {
        self.get_versioned(credential_key).await.map(|v| v.value)
    }

    /// Overwrite the whole record
    pub async fn set(&self, credential_key: &str, record: &CredentialRecord) -> bool {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(credential_key, error = %e, "credential record not serializable");
                return false;
            }
        };

        match self.kv.set(&Self::storage_key(credential_key), &raw).await {
            Ok(()) => true,
            Err(e) => {
                warn!(credential_key, error = %e, "credential write failed");
                false
            }
        }
    }

    /// Write `record` only if the stored record is still `expected`
    ///
    /// Returns `Unsupported` (without writing) when the backend is
    /// last-write-wins; `update` falls back to a plain `set` in that case.
    pub async fn set_if_unchanged(
        &self,
        credential_key: &str,
        expected: Option<&Versioned<CredentialRecord>>,
        record: &CredentialRecord,
    ) -> CasOutcome {
        let Ok(raw) = serde_json::to_string(record) else {
            return CasOutcome::Conflict;
        };
        let expected = expected.map(|v| v.stamp.as_str());

        match self
            .kv
            .compare_and_set(&Self::storage_key(credential_key), expected, &raw)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(credential_key, error = %e, "credential compare-and-set failed");
                CasOutcome::Conflict
            }
        }
    }

    /// Read-modify-write a record
    ///
    /// Uses compare-and-set with a few retries when the backend supports it,
    /// otherwise degrades to last-write-wins. `f` returning `None` leaves the
    /// record untouched. Missing records are not created.
    pub async fn update<F>(&self, credential_key: &str, mut f: F) -> bool
    where
        F: FnMut(CredentialRecord) -> Option<CredentialRecord> + Send,
    {
        for _ in 0..MAX_CAS_RETRIES {
            let Some(current) = self.get_versioned(credential_key).await else {
                return true;
            };
            let Some(next) = f(current.value.clone()) else {
                return true;
            };

            if !self.kv.supports_cas() {
                return self.set(credential_key, &next).await;
            }

            match self
                .set_if_unchanged(credential_key, Some(&current), &next)
                .await
            {
                CasOutcome::Applied => return true,
                CasOutcome::Unsupported => return self.set(credential_key, &next).await,
                CasOutcome::Conflict => {
                    debug!(credential_key, "credential record changed concurrently, retrying");
                }
            }
        }

        warn!(credential_key, "giving up on credential update after repeated conflicts");
        false
    }

    /// Remove a record. Removing a missing record succeeds.
    pub async fn delete(&self, credential_key: &str) -> bool {
        match self.kv.delete(&Self::storage_key(credential_key)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(credential_key, error = %e, "credential delete failed");
                false
            }
        }
    }

    /// Store the tokens issued by a successful login with fresh counters
    pub async fn login(
        &self,
        credential_key: &str,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> bool {
        let record = CredentialRecord::logged_in(access_token, refresh_token);
        self.set(credential_key, &record).await
    }

    /// Forget everything stored for a credential key
    pub async fn logout(&self, credential_key: &str) -> bool {
        self.delete(credential_key).await
    }

    /// Clear refresh bookkeeping, keeping the tokens
    pub async fn reset_attempts(&self, credential_key: &str) -> bool {
        self.update(credential_key, |record| {
            if record.refresh_attempts == 0 && !record.last_refresh_failed {
                None
            } else {
                Some(record.with_cleared_attempts())
            }
        })
        .await
    }

    /// Current access token, if any
    pub async fn access_token(&self, credential_key: &str) -> Option<String> {
        self.get(credential_key)
            .await
            .and_then(|record| record.access_token)
            .filter(|token| !token.is_empty())
    }
}
