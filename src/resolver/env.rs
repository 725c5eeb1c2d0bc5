//! Environment variable access
//!
//! Per-service variables are named after the service: `backend` reads
//! `BACKEND_URL`, `BACKEND_HOST`, `BACKEND_PORT` and `BACKEND_PROTOCOL`.
//! The browser-visible subset carries the `PUBLIC_` prefix.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Prefix of variables visible to browser-side callers
pub const PUBLIC_PREFIX: &str = "PUBLIC_";

static NON_IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// Read-only view of environment variables
pub trait EnvSource: Send + Sync {
    /// Value of `key`, `None` when unset
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Variable stem for a service name: `image-service` becomes `IMAGE_SERVICE`
pub(crate) fn service_stem(service: &str) -> String {
    NON_IDENT
        .replace_all(service.trim(), "_")
        .trim_matches('_')
        .to_ascii_uppercase()
}

/// Prefixes a caller may read, most specific first
pub(crate) fn visible_prefixes(browser: bool) -> &'static [&'static str] {
    const BROWSER: &[&str] = &[PUBLIC_PREFIX];
    const SERVER: &[&str] = &["", PUBLIC_PREFIX];
    if browser {
        BROWSER
    } else {
        SERVER
    }
}
