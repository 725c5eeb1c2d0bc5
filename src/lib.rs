// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Marketlink
//!
//! Connectivity resilience layer between a marketplace frontend and its
//! backend services.
//!
//! ## Features
//!
//! - **Address Resolution**: service registry, environment variables, then
//!   built-in defaults, never leaking container-internal hostnames
//! - **Shared Credentials**: access and refresh tokens with refresh
//!   bookkeeping, visible to every process sharing the key-value store
//! - **Bounded Refresh**: attempt ceiling and cooldown after failures
//! - **Request Execution**: bearer auth, one refresh-then-retry on 401 and an
//!   explicit reauthentication signal when recovery is impossible
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use marketlink::{Layer, RequestOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let layer = Layer::load(None)?;
//!     layer.credentials().login("primary", "access", "refresh").await;
//!
//!     match layer.request("backend", "/api/ads/", RequestOptions::new()).await? {
//!         marketlink::Outcome::Success(response) => println!("{}", response.body),
//!         marketlink::Outcome::RequiresReauthentication(signal) => {
//!             eprintln!("log in again: {:?}", signal.reason);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        RequestExecutor                          │
//! │  execute(service, path, options) → Success | RequiresReauth     │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                     │                       │
//! ┌────────┴────────┐  ┌─────────┴─────────┐  ┌──────────┴─────────┐
//! │ AddressResolver │  │ RefreshController │  │  CredentialStore   │
//! ├─────────────────┤  ├───────────────────┤  ├────────────────────┤
//! │ Registry        │  │ Attempts ceiling  │  │ credential:<key>   │
//! │ Env variables   │  │ Cooldown          │  │ Tokens + counters  │
//! │ Defaults        │  │ Token rotation    │  │                    │
//! └────────┬────────┘  └───────────────────┘  └──────────┬─────────┘
//!          └───────────────────┬─────────────────────────┘
//!                    ┌─────────┴─────────┐
//!                    │   KeyValueStore   │
//!                    │  HTTP │ In-memory │
//!                    └───────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the layer
pub mod error;

/// Common types and type aliases
pub mod types;

/// Layer configuration
pub mod config;

/// Shared key-value store clients
pub mod kv;

/// Persisted credential records
pub mod credentials;

/// Service address resolution
pub mod resolver;

/// Token refresh with attempt ceiling and cooldown
pub mod auth;

/// Authenticated request execution
pub mod http;

/// Component assembly
pub mod layer;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use auth::{RefreshController, RefreshOutcome};
pub use config::LayerConfig;
pub use credentials::{CredentialRecord, CredentialStore};
pub use http::{ApiResponse, Outcome, ReauthReason, ReauthSignal, RequestExecutor, RequestOptions};
pub use layer::Layer;
pub use resolver::{AddressResolver, ResolutionContext};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
