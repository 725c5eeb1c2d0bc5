//! Connectivity layer assembly
//!
//! `Layer` wires the shared store, resolver, credential store, refresh
//! controller and request executor together from a `LayerConfig`. Every
//! component shares one HTTP client.

use crate::auth::{RefreshController, RefreshLimits};
use crate::config::LayerConfig;
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::http::{ApiResponse, Outcome, ReauthSignal, RequestExecutor, RequestOptions};
use crate::kv::{HttpKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use crate::resolver::{AddressResolver, EnvSource, ProcessEnv, ResolutionContext};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Fully assembled connectivity layer
#[derive(Debug, Clone)]
pub struct Layer {
    config: LayerConfig,
    kv: Arc<dyn KeyValueStore>,
    resolver: Arc<AddressResolver>,
    credentials: CredentialStore,
    refresher: Arc<RefreshController>,
    executor: Arc<RequestExecutor>,
}

impl Layer {
    /// Load configuration (file or defaults), apply `MARKETLINK_*` overrides
    /// from the process environment and assemble the layer
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => LayerConfig::from_file(path)?,
            None => LayerConfig::default(),
        };
        config.apply_env_overrides(&ProcessEnv)?;
        Self::from_config(config)
    }

    /// Assemble from configuration, reading service variables from the process
    pub fn from_config(config: LayerConfig) -> Result<Self> {
        Self::with_env(config, Arc::new(ProcessEnv))
    }

    /// Assemble with an explicit environment source
    ///
    /// The shared store is the HTTP key-value service when `store.url` is
    /// set, otherwise an in-process map.
    pub fn with_env(config: LayerConfig, env: Arc<dyn EnvSource>) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(&config.http.user_agent)
            .build()?;

        let kv: Arc<dyn KeyValueStore> = match &config.store.url {
            Some(url) => {
                info!("Using shared key-value store at {}", url);
                Arc::new(HttpKeyValueStore::with_client(
                    client.clone(),
                    url,
                    config.store.timeout(),
                ))
            }
            None => {
                info!("No shared store configured, keeping state in memory");
                Arc::new(MemoryKeyValueStore::new())
            }
        };

        Ok(Self::assemble(config, kv, env, client))
    }

    /// Assemble on top of an existing store
    pub fn with_store(
        config: LayerConfig,
        kv: Arc<dyn KeyValueStore>,
        env: Arc<dyn EnvSource>,
    ) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(&config.http.user_agent)
            .build()?;
        Ok(Self::assemble(config, kv, env, client))
    }

    fn assemble(
        config: LayerConfig,
        kv: Arc<dyn KeyValueStore>,
        env: Arc<dyn EnvSource>,
        client: Client,
    ) -> Self {
        let context = match config.environment {
            Some(environment) => ResolutionContext::server(environment),
            None => ResolutionContext::detect(env.as_ref(), false),
        };
        debug!(environment = %context.environment, "assembling connectivity layer");

        let resolver = Arc::new(
            AddressResolver::new(config.resolver.clone(), context)
                .with_env(env)
                .with_registry(kv.clone()),
        );
        let credentials = CredentialStore::new(kv.clone());
        let refresher = Arc::new(RefreshController::with_client(
            credentials.clone(),
            resolver.clone(),
            config.refresh.clone(),
            client.clone(),
        ));
        let executor = Arc::new(
            RequestExecutor::new(
                resolver.clone(),
                credentials.clone(),
                refresher.clone(),
                config.http.clone(),
            )
            .with_client(client),
        );

        Self {
            config,
            kv,
            resolver,
            credentials,
            refresher,
            executor,
        }
    }

    /// Absolute URL for `path` on `service`
    pub async fn resolve(&self, service: &str, path: &str) -> String {
        self.resolver.resolve(service, path).await
    }

    /// Execute a request through the executor
    pub async fn request(
        &self,
        service: &str,
        path: &str,
        options: RequestOptions,
    ) -> Result<Outcome<ApiResponse>> {
        self.executor.execute(service, path, options).await
    }

    /// Try to refresh `credential_key`, optionally overriding the ceiling
    pub async fn refresh(&self, credential_key: &str, max_attempts: Option<u32>) -> bool {
        let limits = match max_attempts {
            Some(max) => RefreshLimits::new(max, self.config.refresh.cooldown_seconds),
            None => self.refresher.limits(),
        };
        self.refresher.attempt_refresh_with(credential_key, limits).await
    }

    /// Receive reauthentication signals
    pub fn subscribe_reauth(&self) -> broadcast::Receiver<ReauthSignal> {
        self.executor.subscribe_reauth()
    }

    /// Effective configuration
    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// Shared key-value store
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Address resolver
    pub fn resolver(&self) -> &Arc<AddressResolver> {
        &self.resolver
    }

    /// Credential store
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Refresh controller
    pub fn refresher(&self) -> &Arc<RefreshController> {
        &self.refresher
    }

    /// Request executor
    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }
}
