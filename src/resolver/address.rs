//! Address resolver implementation

use super::env::{service_stem, visible_prefixes, EnvSource, ProcessEnv};
use super::types::{
    RegistryEntry, Resolution, ResolutionContext, ResolutionSource, ServiceDescriptor,
};
use crate::config::ResolverConfig;
use crate::kv::KeyValueStore;
use crate::types::{Environment, OptionStringExt};
use regex::Regex;
use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};
use url::Url;

/// Key prefix of registry entries in the shared store
pub const REGISTRY_PREFIX: &str = "service_registry:";

static SLASH_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/{2,}").unwrap());

/// Resolves logical service names to caller-reachable URLs
///
/// Constructed once at the application root and shared by reference.
#[derive(Clone)]
pub struct AddressResolver {
    config: ResolverConfig,
    context: ResolutionContext,
    registry: Option<Arc<dyn KeyValueStore>>,
    env: Arc<dyn EnvSource>,
}

impl AddressResolver {
    /// Create a resolver reading the process environment, without a registry
    pub fn new(config: ResolverConfig, context: ResolutionContext) -> Self {
        Self {
            config,
            context,
            registry: None,
            env: Arc::new(ProcessEnv),
        }
    }

    /// Use the shared key-value store as service registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn KeyValueStore>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Read service variables from `env` instead of the process environment
    #[must_use]
    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    /// Default context used by `resolve`
    pub fn context(&self) -> ResolutionContext {
        self.context
    }

    /// Resolve `service` and append `path`. Never fails.
    pub async fn resolve(&self, service: &str, path: &str) -> String {
        self.resolve_for(service, path, &self.context).await
    }

    /// Resolve for an explicit caller context
    pub async fn resolve_for(
        &self,
        service: &str,
        path: &str,
        context: &ResolutionContext,
    ) -> String {
        let resolution = self.resolve_descriptor(service, context).await;
        join_path(&resolution.base_url, path)
    }

    /// Resolve a service without a path, reporting the winning source
    pub async fn resolve_descriptor(
        &self,
        service: &str,
        context: &ResolutionContext,
    ) -> Resolution {
        let resolution = if let Some(descriptor) = self.lookup_registry(service).await {
            let descriptor = self.externalize(descriptor);
            Resolution {
                base_url: descriptor.base_url(),
                descriptor,
                source: ResolutionSource::Registry,
                environment: Environment::Containerized,
            }
        } else if let Some((base_url, descriptor)) = self.lookup_env(service, context) {
            Resolution {
                base_url,
                descriptor,
                source: ResolutionSource::Environment,
                environment: context.environment,
            }
        } else {
            let descriptor = self.default_descriptor(service);
            Resolution {
                base_url: descriptor.base_url(),
                descriptor,
                source: ResolutionSource::Default,
                environment: context.environment,
            }
        };

        debug!(
            service,
            source = ?resolution.source,
            base_url = %resolution.base_url,
            "resolved service address"
        );
        resolution
    }

    async fn lookup_registry(&self, service: &str) -> Option<ServiceDescriptor> {
        let registry = self.registry.as_ref()?;
        let key = format!("{REGISTRY_PREFIX}{service}");

        let raw = match registry.get(&key).await {
            Ok(value) => value?,
            Err(e) => {
                warn!(service, error = %e, "registry lookup failed, falling through");
                return None;
            }
        };

        match serde_json::from_str::<RegistryEntry>(&raw) {
            Ok(entry) if !entry.host.trim().is_empty() => Some(ServiceDescriptor {
                name: service.to_string(),
                host: entry.host.trim().to_string(),
                port: entry.port,
                protocol: entry
                    .protocol
                    .none_if_empty()
                    .unwrap_or_else(|| self.config.default_protocol.clone()),
            }),
            Ok(_) => {
                warn!(service, "registry entry has no host, falling through");
                None
            }
            Err(e) => {
                warn!(service, error = %e, "malformed registry entry, falling through");
                None
            }
        }
    }

    /// Rewrite a registry address into one reachable from the host
    ///
    /// Remapped hosts take the table's host and port. Other single-label
    /// names and private-range addresses are container-internal and become
    /// the configured external host.
    fn externalize(&self, mut descriptor: ServiceDescriptor) -> ServiceDescriptor {
        if let Some(target) = self.config.remap.get(&descriptor.host) {
            descriptor.host = target.host.clone();
            descriptor.port = target.port.or(descriptor.port);
        } else if is_container_internal(&descriptor.host) {
            descriptor.host = self.config.external_host.clone();
        }
        descriptor
    }

    fn lookup_env(
        &self,
        service: &str,
        context: &ResolutionContext,
    ) -> Option<(String, ServiceDescriptor)> {
        let stem = service_stem(service);
        if stem.is_empty() {
            return None;
        }

        for prefix in visible_prefixes(context.browser) {
            let var = |suffix: &str| {
                self.env
                    .var(&format!("{prefix}{stem}_{suffix}"))
                    .none_if_empty()
            };

            if let Some(raw) = var("URL") {
                if let Some(found) = parse_service_url(service, &raw) {
                    return Some(found);
                }
                warn!(service, prefix, "ignoring malformed service URL");
            }

            let host = var("HOST");
            let port = var("PORT");
            if host.is_none() && port.is_none() {
                continue;
            }

            let port = match port.map(|p| p.trim().parse::<u16>()) {
                Some(Ok(p)) => Some(p),
                Some(Err(e)) => {
                    warn!(service, error = %e, "ignoring malformed service port");
                    continue;
                }
                None => self.config.default_ports.get(service).copied(),
            };

            let descriptor = ServiceDescriptor {
                name: service.to_string(),
                host: host.unwrap_or_else(|| self.config.external_host.clone()),
                port,
                protocol: var("PROTOCOL")
                    .map(|p| p.trim().trim_end_matches("://").to_ascii_lowercase())
                    .unwrap_or_else(|| self.config.default_protocol.clone()),
            };
            return Some((descriptor.base_url(), descriptor));
        }

        None
    }

    fn default_descriptor(&self, service: &str) -> ServiceDescriptor {
        let port = self.config.default_ports.get(service).copied();
        if port.is_none() {
            debug!(service, "no default port for service");
        }
        ServiceDescriptor {
            name: service.to_string(),
            host: "localhost".to_string(),
            port,
            protocol: "http".to_string(),
        }
    }
}

impl std::fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressResolver")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("has_registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

/// Parse a full service URL variable into a base URL and descriptor
fn parse_service_url(service: &str, raw: &str) -> Option<(String, ServiceDescriptor)> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_string();
    let descriptor = ServiceDescriptor {
        name: service.to_string(),
        host,
        port: url.port(),
        protocol: url.scheme().to_string(),
    };

    // keep any path prefix but drop query and fragment
    let mut base = url;
    base.set_query(None);
    base.set_fragment(None);
    let base_url = base.as_str().trim_end_matches('/').to_string();
    Some((base_url, descriptor))
}

/// Single-label DNS names and private-range addresses only exist inside
/// the container network. Loopback and public addresses are kept.
fn is_container_internal(host: &str) -> bool {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    match literal.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_private() || ip.is_link_local(),
        // fc00::/7 unique local, fe80::/10 link local
        Ok(IpAddr::V6(ip)) => {
            let first = ip.segments()[0];
            first & 0xfe00 == 0xfc00 || first & 0xffc0 == 0xfe80
        }
        Err(_) => host != "localhost" && !host.contains('.'),
    }
}

/// Append `path` to `base` with exactly one separator between them
///
/// Runs of slashes inside the path collapse to one; query strings and
/// fragments are left alone, as is a trailing slash on the path.
pub fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let split = path.find(['?', '#']).unwrap_or(path.len());
    let (path_part, suffix) = path.split_at(split);

    let collapsed = SLASH_RUN.replace_all(path_part.trim(), "/");
    let trimmed = collapsed.trim_start_matches('/');

    if trimmed.is_empty() {
        format!("{base}{suffix}")
    } else {
        format!("{base}/{trimmed}{suffix}")
    }
}
