//! Shared key-value store access
//!
//! The external key-value service is the single source of truth for both the
//! service registry and credential state. This module provides the
//! `KeyValueStore` trait plus two backends:
//!
//! - `HttpKeyValueStore` - the production HTTP service (last-write-wins)
//! - `MemoryKeyValueStore` - in-process map with real compare-and-set

mod http;
mod memory;
mod store;

pub use http::HttpKeyValueStore;
pub use memory::MemoryKeyValueStore;
pub use store::{CasOutcome, KeyValueStore};
