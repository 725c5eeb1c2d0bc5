//! Layer configuration
//!
//! All tunables of the connectivity layer live here. Configuration is loaded
//! from YAML, filled with defaults for anything omitted, and may be
//! overridden from environment variables.

use crate::error::{Error, Result, ResultExt};
use crate::resolver::EnvSource;
use crate::types::{BackoffType, Environment, OptionStringExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `store.url`
pub const ENV_KV_URL: &str = "MARKETLINK_KV_URL";
/// Environment variable overriding the deployment environment
pub const ENV_DEPLOYMENT: &str = "MARKETLINK_ENV";
/// Environment variable overriding `refresh.max_attempts`
pub const ENV_REFRESH_MAX_ATTEMPTS: &str = "MARKETLINK_REFRESH_MAX_ATTEMPTS";
/// Environment variable overriding `refresh.cooldown_seconds`
pub const ENV_REFRESH_COOLDOWN: &str = "MARKETLINK_REFRESH_COOLDOWN";

/// Longest accepted refresh cooldown (one week)
pub const MAX_COOLDOWN_SECONDS: u64 = 7 * 24 * 60 * 60;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete layer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Forced deployment environment (detected when absent)
    #[serde(default)]
    pub environment: Option<Environment>,

    /// Shared key-value store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Token refresh settings
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Address resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl LayerConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Apply `MARKETLINK_*` overrides from the given environment
    pub fn apply_env_overrides(&mut self, env: &dyn EnvSource) -> Result<()> {
        if let Some(url) = env.var(ENV_KV_URL).none_if_empty() {
            self.store.url = Some(url);
        }

        if let Some(value) = env.var(ENV_DEPLOYMENT).none_if_empty() {
            let parsed = Environment::parse(&value).ok_or_else(|| {
                Error::invalid_value(ENV_DEPLOYMENT, format!("unknown environment '{value}'"))
            })?;
            self.environment = Some(parsed);
        }

        if let Some(value) = env.var(ENV_REFRESH_MAX_ATTEMPTS).none_if_empty() {
            self.refresh.max_attempts = value.trim().parse().map_err(|e| {
                Error::invalid_value(ENV_REFRESH_MAX_ATTEMPTS, format!("{e}"))
            })?;
        }

        if let Some(value) = env.var(ENV_REFRESH_COOLDOWN).none_if_empty() {
            self.refresh.cooldown_seconds = value
                .trim()
                .parse()
                .map_err(|e| Error::invalid_value(ENV_REFRESH_COOLDOWN, format!("{e}")))?;
        }

        self.validate()
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.refresh.max_attempts == 0 {
            return Err(Error::invalid_value(
                "refresh.max_attempts",
                "must be at least 1",
            ));
        }
        if self.refresh.cooldown_seconds > MAX_COOLDOWN_SECONDS {
            return Err(Error::invalid_value(
                "refresh.cooldown_seconds",
                format!("must be at most {MAX_COOLDOWN_SECONDS}"),
            ));
        }
        if self.refresh.auth_service.trim().is_empty() {
            return Err(Error::invalid_value(
                "refresh.auth_service",
                "must not be empty",
            ));
        }
        if self.http.read_timeout_ms == 0 || self.http.write_timeout_ms == 0 {
            return Err(Error::invalid_value("http", "timeouts must be positive"));
        }
        if let Some(url) = &self.store.url {
            url::Url::parse(url).map_err(|e| Error::invalid_value("store.url", e.to_string()))?;
        }
        Ok(())
    }
}

// ============================================================================
// Store Config
// ============================================================================

/// Shared key-value store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the key-value HTTP service; in-memory store when absent
    #[serde(default)]
    pub url: Option<String>,

    /// Timeout for each store operation in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Store operation timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_store_timeout_ms() -> u64 {
    3_000
}

// ============================================================================
// Refresh Config
// ============================================================================

/// Token refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Attempts ceiling before a credential is exhausted
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Cooldown window after a failed refresh, in seconds
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Logical service hosting the auth endpoints
    #[serde(default = "default_auth_service")]
    pub auth_service: String,

    /// Path of the token refresh endpoint on the auth service
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// Timeout for the refresh call in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_seconds: default_cooldown_seconds(),
            auth_service: default_auth_service(),
            refresh_path: default_refresh_path(),
            timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl RefreshConfig {
    /// Refresh call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_cooldown_seconds() -> u64 {
    60
}

fn default_auth_service() -> String {
    "backend".to_string()
}

fn default_refresh_path() -> String {
    "/api/auth/token/refresh/".to_string()
}

// ============================================================================
// HTTP Config
// ============================================================================

/// Outbound HTTP settings for the request executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout budget for reads (GET) in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Timeout budget for writes in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Credential key used when a request does not name one
    #[serde(default = "default_credential_key")]
    pub default_credential_key: String,

    /// Ceiling for the caller-side 5xx retry helper
    #[serde(default = "default_server_error_retries")]
    pub server_error_retries: u32,

    /// Backoff strategy for the 5xx retry helper
    #[serde(default)]
    pub backoff_type: BackoffType,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Delay after clearing bookkeeping before reauthentication is signalled
    #[serde(default = "default_reauth_settle_ms")]
    pub reauth_settle_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            user_agent: default_user_agent(),
            default_credential_key: default_credential_key(),
            server_error_retries: default_server_error_retries(),
            backoff_type: BackoffType::default(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            reauth_settle_ms: default_reauth_settle_ms(),
        }
    }
}

impl HttpConfig {
    /// Read timeout budget
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Write timeout budget
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Settle delay before signalling reauthentication
    pub fn reauth_settle(&self) -> Duration {
        Duration::from_millis(self.reauth_settle_ms)
    }
}

fn default_read_timeout_ms() -> u64 {
    15_000
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    format!("marketlink/{}", env!("CARGO_PKG_VERSION"))
}

fn default_credential_key() -> String {
    "primary".to_string()
}

fn default_server_error_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_reauth_settle_ms() -> u64 {
    100
}

// ============================================================================
// Resolver Config
// ============================================================================

/// Host-reachable replacement for a container-internal host name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapTarget {
    /// Externally reachable host
    pub host: String,
    /// Externally published port (keeps the registry port when absent)
    #[serde(default)]
    pub port: Option<u16>,
}

impl RemapTarget {
    /// Create a remap target
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Address resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Host substituted for internal hosts missing from the remap table
    #[serde(default = "default_external_host")]
    pub external_host: String,

    /// Protocol used by the static default table
    #[serde(default = "default_protocol")]
    pub default_protocol: String,

    /// Default port per logical service
    #[serde(default = "default_ports")]
    pub default_ports: BTreeMap<String, u16>,

    /// Internal host name to external host/port
    #[serde(default = "default_remap")]
    pub remap: BTreeMap<String, RemapTarget>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            external_host: default_external_host(),
            default_protocol: default_protocol(),
            default_ports: default_ports(),
            remap: default_remap(),
        }
    }
}

fn default_external_host() -> String {
    "localhost".to_string()
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_ports() -> BTreeMap<String, u16> {
    BTreeMap::from([
        ("backend".to_string(), 8000),
        ("frontend".to_string(), 3000),
        ("kv-store".to_string(), 8079),
        ("image-service".to_string(), 8001),
    ])
}

fn default_remap() -> BTreeMap<String, RemapTarget> {
    BTreeMap::from([
        ("app".to_string(), RemapTarget::new("localhost", Some(8000))),
        ("backend".to_string(), RemapTarget::new("localhost", Some(8000))),
        ("frontend".to_string(), RemapTarget::new("localhost", Some(3000))),
        ("kv-store".to_string(), RemapTarget::new("localhost", Some(8079))),
    ])
}
