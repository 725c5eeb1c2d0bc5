//! Retry policies
//!
//! Two independent policies exist. `RefreshRetryPolicy` bounds how often a
//! request is replayed after a successful token refresh; it never exceeds
//! one. `ServerRetryPolicy` is the caller-side policy for 5xx responses.

use crate::config::HttpConfig;
use crate::types::BackoffType;
use std::time::Duration;

/// Replay budget after a 401-triggered refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRetryPolicy {
    max_retries: u32,
}

impl RefreshRetryPolicy {
    /// Replay the original request once after a refresh
    pub fn once() -> Self {
        Self { max_retries: 1 }
    }

    /// Never refresh or replay; a 401 escalates immediately
    pub fn disabled() -> Self {
        Self { max_retries: 0 }
    }

    /// Whether another replay is allowed after `retries_done` replays
    pub fn allows(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Replay ceiling
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for RefreshRetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// Bounded retry of server errors, applied by callers that opt in
#[derive(Debug, Clone)]
pub struct ServerRetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
}

impl Default for ServerRetryPolicy {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for ServerRetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.server_error_retries,
            backoff_type: config.backoff_type,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl ServerRetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set backoff configuration
    #[must_use]
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.backoff_type = backoff_type;
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Calculate backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => self.initial_backoff,
            BackoffType::Linear => self.initial_backoff * (attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.initial_backoff.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.max_backoff)
    }
}
