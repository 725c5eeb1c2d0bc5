//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Marketlink connectivity layer CLI
#[derive(Parser, Debug)]
#[command(name = "marketlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Layer configuration file (YAML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(short, long, global = true)]
    pub pretty: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a service path to an absolute URL
    Resolve {
        /// Logical service name (e.g. backend)
        service: String,

        /// Path on the service
        #[arg(default_value = "")]
        path: String,

        /// Resolve as a browser caller (PUBLIC_ variables only)
        #[arg(long)]
        browser: bool,
    },

    /// Attempt a token refresh
    Refresh {
        /// Credential key
        #[arg(default_value = "primary")]
        key: String,

        /// Override the attempts ceiling
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Send a request through the executor
    Request {
        /// Logical service name
        service: String,

        /// Path on the service
        path: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Credential key to authenticate with
        #[arg(short, long)]
        key: Option<String>,

        /// Send without credentials
        #[arg(long)]
        anonymous: bool,

        /// Inline JSON body
        #[arg(short, long)]
        body: Option<String>,

        /// Retry server errors with backoff
        #[arg(long)]
        retry: bool,
    },

    /// Store tokens for a credential key
    Login {
        /// Credential key
        #[arg(default_value = "primary")]
        key: String,

        /// Access token
        #[arg(long)]
        access: String,

        /// Refresh token
        #[arg(long)]
        refresh: String,
    },

    /// Remove the credential record for a key
    Logout {
        /// Credential key
        #[arg(default_value = "primary")]
        key: String,
    },

    /// Show refresh bookkeeping for a credential key
    Show {
        /// Credential key
        #[arg(default_value = "primary")]
        key: String,
    },

    /// Start HTTP server mode
    Serve {
        /// Port to listen on
        #[arg(short = 'P', long, default_value = "8080")]
        port: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let cli = Cli::try_parse_from([
            "marketlink",
            "request",
            "backend",
            "/api/ads/",
            "-X",
            "post",
            "--body",
            r#"{"title":"Octavia"}"#,
            "--anonymous",
        ])
        .unwrap();

        match cli.command {
            Commands::Request {
                service,
                path,
                method,
                anonymous,
                body,
                key,
                retry,
            } => {
                assert_eq!(service, "backend");
                assert_eq!(path, "/api/ads/");
                assert_eq!(method, "post");
                assert!(anonymous);
                assert!(body.is_some());
                assert!(key.is_none());
                assert!(!retry);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_credential_key_defaults_to_primary() {
        let cli = Cli::try_parse_from(["marketlink", "--pretty", "show"]).unwrap();
        assert!(cli.pretty);
        assert!(matches!(cli.command, Commands::Show { key } if key == "primary"));
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["marketlink", "resolve", "backend", "-C", "layer.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("layer.yaml")));
        assert!(matches!(
            cli.command,
            Commands::Resolve { browser: false, .. }
        ));
    }
}
