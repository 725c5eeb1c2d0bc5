//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::error::{Error, Result};
use crate::http::{Outcome, RequestOptions, ServerRetryPolicy};
use crate::layer::Layer;
use crate::resolver::{join_path, ResolutionContext};
use crate::types::Method;
use serde_json::{json, Value};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let layer = Layer::load(self.cli.config.as_deref())?;

        match &self.cli.command {
            Commands::Resolve {
                service,
                path,
                browser,
            } => self.resolve(&layer, service, path, *browser).await,
            Commands::Refresh { key, max_attempts } => {
                self.refresh(&layer, key, *max_attempts).await
            }
            Commands::Request {
                service,
                path,
                method,
                key,
                anonymous,
                body,
                retry,
            } => {
                let mut options = RequestOptions::method(method.parse::<Method>()?);
                if let Some(body) = body {
                    options = options.json(serde_json::from_str(body)?);
                }
                if let Some(key) = key {
                    options = options.credential_key(key);
                }
                if *anonymous {
                    options = options.unauthenticated();
                }
                self.request(&layer, service, path, options, *retry).await
            }
            Commands::Login {
                key,
                access,
                refresh,
            } => {
                if !layer.credentials().login(key, access, refresh).await {
                    return Err(Error::store(format!("Failed to store credentials for '{key}'")));
                }
                self.output(&json!({ "credential_key": key, "logged_in": true }));
                Ok(())
            }
            Commands::Logout { key } => {
                if !layer.credentials().logout(key).await {
                    return Err(Error::store(format!("Failed to remove credentials for '{key}'")));
                }
                self.output(&json!({ "credential_key": key, "logged_in": false }));
                Ok(())
            }
            Commands::Show { key } => self.show(&layer, key).await,
            Commands::Serve { port } => {
                let config = crate::cli::ServerConfig { port: *port };
                crate::cli::serve(layer, config).await
            }
        }
    }

    async fn resolve(&self, layer: &Layer, service: &str, path: &str, browser: bool) -> Result<()> {
        let environment = layer.resolver().context().environment;
        let context = if browser {
            ResolutionContext::browser(environment)
        } else {
            ResolutionContext::server(environment)
        };

        let resolution = layer.resolver().resolve_descriptor(service, &context).await;
        let url = join_path(&resolution.base_url, path);

        self.output(&json!({
            "service": service,
            "url": url,
            "source": resolution.source,
            "environment": resolution.environment,
            "browser": browser,
        }));
        Ok(())
    }

    async fn refresh(&self, layer: &Layer, key: &str, max_attempts: Option<u32>) -> Result<()> {
        let refreshed = layer.refresh(key, max_attempts).await;
        let record = layer.credentials().get(key).await;

        self.output(&json!({
            "credential_key": key,
            "refreshed": refreshed,
            "refresh_attempts": record.as_ref().map(|r| r.refresh_attempts),
        }));

        if refreshed {
            Ok(())
        } else {
            Err(Error::TokenRefresh {
                message: format!("Refresh for '{key}' did not succeed"),
            })
        }
    }

    async fn request(
        &self,
        layer: &Layer,
        service: &str,
        path: &str,
        options: RequestOptions,
        retry: bool,
    ) -> Result<()> {
        let outcome = if retry {
            let policy = ServerRetryPolicy::from(&layer.config().http);
            layer
                .executor()
                .execute_with_server_retry(service, path, options, &policy)
                .await?
        } else {
            layer.request(service, path, options).await?
        };

        match outcome {
            Outcome::Success(response) => {
                self.output(&json!({
                    "status": response.status,
                    "body": response.body,
                }));
                Ok(())
            }
            Outcome::RequiresReauthentication(signal) => {
                self.output(&json!({
                    "requires_reauthentication": true,
                    "credential_key": signal.credential_key,
                    "reason": signal.reason,
                }));
                Err(signal.into_error())
            }
        }
    }

    async fn show(&self, layer: &Layer, key: &str) -> Result<()> {
        let Some(record) = layer.credentials().get(key).await else {
            self.output(&json!({ "credential_key": key, "logged_in": false }));
            return Ok(());
        };

        self.output(&json!({
            "credential_key": key,
            "logged_in": record.access_token.is_some(),
            "has_refresh_token": record.has_refresh_token(),
            "refresh_attempts": record.refresh_attempts,
            "last_refresh_failed": record.last_refresh_failed,
            "last_refresh_time": record.last_refresh_time.to_rfc3339(),
        }));
        Ok(())
    }

    /// Output a message
    fn output(&self, msg: &Value) {
        if self.cli.pretty {
            println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
        } else {
            println!("{}", serde_json::to_string(msg).unwrap_or_default());
        }
    }
}
