//! Refresh types

use crate::config::RefreshConfig;
use crate::error::Error;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Ceiling and cooldown applied to one refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshLimits {
    /// Attempts ceiling
    pub max_attempts: u32,
    /// Cooldown window after a failure, in seconds
    pub cooldown_seconds: u64,
}

impl Default for RefreshLimits {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown_seconds: 60,
        }
    }
}

impl RefreshLimits {
    /// Create limits
    pub fn new(max_attempts: u32, cooldown_seconds: u64) -> Self {
        Self {
            max_attempts,
            cooldown_seconds,
        }
    }

    /// Cooldown as a chrono duration, saturating at `TimeDelta::MAX`
    pub fn cooldown(&self) -> TimeDelta {
        i64::try_from(self.cooldown_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

impl From<&RefreshConfig> for RefreshLimits {
    fn from(config: &RefreshConfig) -> Self {
        Self::new(config.max_attempts, config.cooldown_seconds)
    }
}

/// Where a refresh attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// New tokens stored, counters reset
    Succeeded,
    /// No record or no refresh token; only a new login helps
    NoCredentials,
    /// A recent failure is still inside the cooldown window; no call made
    Throttled,
    /// Attempts ceiling reached; no call made
    Exhausted,
    /// The refresh endpoint rejected the token or could not be reached
    Failed,
}

impl RefreshOutcome {
    /// Whether fresh tokens are now stored
    pub fn is_success(self) -> bool {
        matches!(self, RefreshOutcome::Succeeded)
    }

    /// Error describing an unsuccessful outcome
    pub fn into_error(self, credential_key: &str) -> Option<Error> {
        let credential_key = credential_key.to_string();
        match self {
            RefreshOutcome::Succeeded => None,
            RefreshOutcome::NoCredentials => Some(Error::AuthExpired { credential_key }),
            RefreshOutcome::Throttled => Some(Error::ThrottledRefresh { credential_key }),
            RefreshOutcome::Exhausted => Some(Error::ExhaustedRefresh { credential_key }),
            RefreshOutcome::Failed => Some(Error::TokenRefresh {
                message: format!("refresh rejected for '{credential_key}'"),
            }),
        }
    }
}

/// Body sent to the refresh endpoint
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    /// Stored refresh token
    pub refresh: &'a str,
}

/// Successful refresh endpoint response
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    /// New access token
    pub access: String,
    /// Rotated refresh token; the old one stays valid when absent
    #[serde(default)]
    pub refresh: Option<String>,
}
