//! Error types for marketlink
//!
//! This module defines the error hierarchy for the whole layer.
//! All fallible public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Resolution and credential-store reads are total and never surface errors;
//! everything else funnels into one of the variants below.

use thiserror::Error;

/// The main error type for marketlink
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Transport Errors
    // ============================================================================
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ============================================================================
    // Response Status Errors
    // ============================================================================
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Session expired for credential '{credential_key}'")]
    AuthExpired { credential_key: String },

    #[error("Access forbidden for credential '{credential_key}'")]
    AuthForbidden { credential_key: String },

    #[error("Token refresh for '{credential_key}' is cooling down")]
    ThrottledRefresh { credential_key: String },

    #[error("Token refresh attempts exhausted for '{credential_key}'")]
    ExhaustedRefresh { credential_key: String },

    #[error("Token refresh failed: {message}")]
    TokenRefresh { message: String },

    // ============================================================================
    // Key-Value Store Errors
    // ============================================================================
    #[error("Key-value store error: {message}")]
    Store { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a key-value store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an error from a non-success HTTP status
    ///
    /// 404 and 5xx get their own variants; everything else is a plain status error.
    pub fn from_status(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        match status {
            404 => Self::NotFound { url: url.into() },
            500..=599 => Self::ServerError {
                status,
                body: body.into(),
            },
            _ => Self::HttpStatus {
                status,
                body: body.into(),
            },
        }
    }

    /// Transport-level failure (timeout or connection problem)
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network { .. } | Error::Timeout { .. })
    }

    /// Failure that requires the user to log in again
    pub fn is_terminal_auth(&self) -> bool {
        matches!(
            self,
            Error::AuthExpired { .. } | Error::AuthForbidden { .. }
        )
    }

    /// Check if this error may be retried by caller policy
    ///
    /// The layer itself never retries these; only 5xx responses are retried
    /// by `RequestExecutor::execute_with_server_retry`.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network { .. } | Error::Timeout { .. } | Error::ServerError { .. } => true,
            Error::HttpStatus { status, .. } => *status == 429,
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::NotFound { .. } => Some(404),
            Error::ServerError { status, .. } | Error::HttpStatus { status, .. } => Some(*status),
            Error::AuthExpired { .. } => Some(401),
            Error::AuthForbidden { .. } => Some(403),
            _ => None,
        }
    }
}

/// Result type alias for marketlink
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::AuthExpired {
            credential_key: "primary".to_string(),
        };
        assert_eq!(err.to_string(), "Session expired for credential 'primary'");

        let err = Error::from_status(418, "http://x", "teapot");
        assert_eq!(err.to_string(), "HTTP 418: teapot");
    }

    #[test_case(404 => matches Error::NotFound { .. } ; "not found")]
    #[test_case(500 => matches Error::ServerError { status: 500, .. } ; "internal error")]
    #[test_case(503 => matches Error::ServerError { status: 503, .. } ; "unavailable")]
    #[test_case(400 => matches Error::HttpStatus { status: 400, .. } ; "bad request")]
    fn test_from_status(status: u16) -> Error {
        Error::from_status(status, "http://localhost:8000/x", "")
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(Error::network("connection refused").is_retryable());
        assert!(Error::from_status(502, "", "").is_retryable());
        assert!(Error::from_status(429, "", "").is_retryable());

        assert!(!Error::from_status(404, "", "").is_retryable());
        assert!(!Error::from_status(400, "", "").is_retryable());
        assert!(!Error::AuthForbidden {
            credential_key: "primary".to_string()
        }
        .is_retryable());
        assert!(!Error::config("test").is_retryable());
    }

    #[test]
    fn test_classification() {
        assert!(Error::Timeout { timeout_ms: 10 }.is_network());
        assert!(!Error::from_status(500, "", "").is_network());
        assert!(Error::AuthExpired {
            credential_key: "k".to_string()
        }
        .is_terminal_auth());
        assert_eq!(Error::from_status(404, "", "").status(), Some(404));
        assert_eq!(Error::network("x").status(), None);
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
