//! Credential state
//!
//! Per-credential-key token and refresh bookkeeping, persisted in the shared
//! key-value store. Records are always written whole; callers do their own
//! read-modify-write.
//!
//! # Overview
//!
//! - `CredentialRecord` - tokens plus refresh attempt counters
//! - `CredentialStore` - total get/set/delete over a `KeyValueStore`
//! - `Versioned` - a record with the stamp needed for compare-and-set

mod store;
mod types;

pub use store::{CredentialStore, KEY_PREFIX};
pub use types::{now_millis, CredentialRecord, Versioned};
