//! Credential record types
//!
//! Records are serialized to camelCase JSON with `lastRefreshTime` as Unix
//! milliseconds so browser-side code can read the same entries.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Token set and refresh bookkeeping for one credential key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    /// Bearer token attached to outgoing requests
    #[serde(default)]
    pub access_token: Option<String>,

    /// Token exchanged for a new access token
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Consecutive refresh attempts since the last success
    #[serde(default)]
    pub refresh_attempts: u32,

    /// Whether the most recent refresh attempt failed
    #[serde(default)]
    pub last_refresh_failed: bool,

    /// When the most recent refresh attempt finished (or the login happened)
    #[serde(with = "chrono::serde::ts_milliseconds", default = "epoch")]
    pub last_refresh_time: DateTime<Utc>,
}

/// Current time at the precision records are stored with
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl Default for CredentialRecord {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            refresh_attempts: 0,
            last_refresh_failed: false,
            last_refresh_time: epoch(),
        }
    }
}

impl CredentialRecord {
    /// Record created by a successful login
    pub fn logged_in(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            refresh_attempts: 0,
            last_refresh_failed: false,
            last_refresh_time: now_millis(),
        }
    }

    /// Whether a usable refresh token is present
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Whether a failed refresh happened less than `cooldown` before `now`
    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown: chrono::Duration) -> bool {
        self.last_refresh_failed && now.signed_duration_since(self.last_refresh_time) < cooldown
    }

    /// Same tokens with attempt counters cleared
    #[must_use]
    pub fn with_cleared_attempts(mut self) -> Self {
        self.refresh_attempts = 0;
        self.last_refresh_failed = false;
        self
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_attempts", &self.refresh_attempts)
            .field("last_refresh_failed", &self.last_refresh_failed)
            .field("last_refresh_time", &self.last_refresh_time)
            .finish()
    }
}

/// A value together with the raw stored form it was decoded from
///
/// The raw form doubles as the version stamp for compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Decoded value
    pub value: T,
    /// Exact stored representation
    pub stamp: String,
}
