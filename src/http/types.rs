//! Request and response types for the executor

use crate::auth::RefreshOutcome;
use crate::error::{Error, Result};
use crate::types::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Options for a single request
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method
    pub method: Method,
    /// Query parameters, in order
    pub query: Vec<(String, String)>,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Request body (JSON)
    pub body: Option<Value>,
    /// Override the read/write timeout budget
    pub timeout: Option<Duration>,
    /// Attach a bearer token and run the refresh flow on 401
    pub authenticated: bool,
    /// Credential key to authenticate with (executor default when `None`)
    pub credential_key: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            query: Vec::new(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
            authenticated: true,
            credential_key: None,
        }
    }
}

impl RequestOptions {
    /// Create default options (authenticated GET)
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for the given method
    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send without credentials
    #[must_use]
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Authenticate with a specific credential key
    #[must_use]
    pub fn credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = Some(key.into());
        self
    }
}

/// Successful response with its parsed payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON payload; `Null` for empty bodies, a string for non-JSON bodies
    pub body: Value,
}

impl ApiResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) => Value::String(text),
            }
        };
        Ok(Self { status, body })
    }

    /// Deserialize the payload
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Why a caller must log in again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "refresh", rename_all = "snake_case")]
pub enum ReauthReason {
    /// The request was still unauthorized after a successful refresh
    SessionExpired,
    /// The backend denied access (403)
    Forbidden,
    /// A 401 could not be recovered because refresh did not succeed
    RefreshUnavailable(RefreshOutcome),
}

/// Reauthentication request raised by the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReauthSignal {
    /// Credential key that needs a new login
    pub credential_key: String,
    /// What went wrong
    pub reason: ReauthReason,
}

impl ReauthSignal {
    /// Equivalent terminal error
    pub fn into_error(self) -> Error {
        let credential_key = self.credential_key;
        match self.reason {
            ReauthReason::Forbidden => Error::AuthForbidden { credential_key },
            ReauthReason::RefreshUnavailable(
                outcome @ (RefreshOutcome::Throttled | RefreshOutcome::Exhausted),
            ) => outcome
                .into_error(&credential_key)
                .unwrap_or(Error::AuthExpired { credential_key }),
            ReauthReason::SessionExpired | ReauthReason::RefreshUnavailable(_) => {
                Error::AuthExpired { credential_key }
            }
        }
    }
}

/// Result of a request that did not fail locally
///
/// The layer never navigates; the UI boundary decides what reauthentication
/// means for the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The request succeeded
    Success(T),
    /// The caller has to log in again
    RequiresReauthentication(ReauthSignal),
}

impl<T> Outcome<T> {
    /// Whether the request succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Successful value, if any
    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::RequiresReauthentication(_) => None,
        }
    }

    /// Reauthentication signal, if any
    pub fn reauth(&self) -> Option<&ReauthSignal> {
        match self {
            Outcome::Success(_) => None,
            Outcome::RequiresReauthentication(signal) => Some(signal),
        }
    }

    /// Collapse into a `Result`, turning reauthentication into an auth error
    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::RequiresReauthentication(signal) => Err(signal.into_error()),
        }
    }
}
