//! CLI module
//!
//! Command-line interface for the connectivity layer.
//!
//! # Commands
//!
//! - `resolve` - Print the URL a service path resolves to
//! - `refresh` - Attempt a token refresh for a credential key
//! - `request` - Send an authenticated request to a service
//! - `login` / `logout` - Store or remove a credential record
//! - `show` - Print a credential record without its tokens
//! - `serve` - Start HTTP server mode

mod commands;
mod runner;
mod server;

pub use commands::{Cli, Commands};
pub use runner::Runner;
pub use server::{router, serve, ServerConfig};
