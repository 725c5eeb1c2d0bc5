//! Resolution types

use super::env::EnvSource;
use crate::config::ENV_DEPLOYMENT;
use crate::types::Environment;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How to reach one logical backend dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Logical service name
    pub name: String,
    /// Host name or address
    pub host: String,
    /// Port, scheme default when absent
    #[serde(default)]
    pub port: Option<u16>,
    /// URL scheme
    pub protocol: String,
}

impl ServiceDescriptor {
    /// `protocol://host[:port]`
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}", self.protocol, self.host),
            None => format!("{}://{}", self.protocol, self.host),
        }
    }
}

/// Who is asking, and from where
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResolutionContext {
    /// Deployment classification of the running process
    pub environment: Environment,
    /// The resolved URL will be used by a browser
    pub browser: bool,
}

impl ResolutionContext {
    /// Context for server-side callers
    pub fn server(environment: Environment) -> Self {
        Self {
            environment,
            browser: false,
        }
    }

    /// Context for URLs handed to a browser
    pub fn browser(environment: Environment) -> Self {
        Self {
            environment,
            browser: true,
        }
    }

    /// Classify the running process
    ///
    /// `MARKETLINK_ENV` wins; otherwise a `/.dockerenv` marker means containerized.
    pub fn detect(env: &dyn EnvSource, browser: bool) -> Self {
        let environment = env
            .var(ENV_DEPLOYMENT)
            .and_then(|v| Environment::parse(&v))
            .unwrap_or_else(|| {
                if Path::new("/.dockerenv").exists() {
                    Environment::Containerized
                } else {
                    Environment::Local
                }
            });
        Self {
            environment,
            browser,
        }
    }
}

/// Which source produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Shared service registry
    Registry,
    /// Environment variables
    Environment,
    /// Static default table
    Default,
}

/// Full result of resolving a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Where the service is reached
    pub descriptor: ServiceDescriptor,
    /// Base URL, possibly carrying a path prefix from a full-URL variable
    pub base_url: String,
    /// Source that matched
    pub source: ResolutionSource,
    /// Environment the address is valid for
    pub environment: Environment,
}

/// Registry value stored under `service_registry:<name>`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RegistryEntry {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
}
