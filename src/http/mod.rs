//! HTTP request execution
//!
//! The `RequestExecutor` is the façade the rest of the application calls:
//! it resolves the target service, attaches the bearer token for the
//! requested credential key, classifies failures and recovers from an
//! expired access token with one refresh and one retry.
//!
//! # Features
//!
//! - **Timeout budgets**: separate defaults for reads and writes
//! - **Refresh-then-retry**: a 401 triggers one refresh and at most one retry
//! - **Explicit reauthentication**: terminal auth failures come back as
//!   `Outcome::RequiresReauthentication` and are broadcast to subscribers
//! - **Caller-side 5xx retry**: opt-in bounded retry with backoff

mod executor;
mod retry;
mod types;

pub use executor::RequestExecutor;
pub use retry::{RefreshRetryPolicy, ServerRetryPolicy};
pub use types::{ApiResponse, Outcome, ReauthReason, ReauthSignal, RequestOptions};

#[cfg(test)]
mod tests;
