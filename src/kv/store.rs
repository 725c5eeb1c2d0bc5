//! Key-value store trait

use crate::error::Result;
use async_trait::async_trait;

/// Result of a compare-and-set write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The expected value matched and the new value was written
    Applied,
    /// The stored value changed since it was read; nothing was written
    Conflict,
    /// The backend cannot compare-and-set; nothing was written
    Unsupported,
}

/// String-keyed access to the shared key-value service
///
/// Values are opaque strings; callers own their encoding.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Fetch a value, `None` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Write `value` only if the stored value still equals `expected`
    /// (`None` meaning "key absent").
    ///
    /// Backends without an atomic primitive keep this default and report
    /// `Unsupported` without writing anything.
    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: Option<&str>,
        _value: &str,
    ) -> Result<CasOutcome> {
        Ok(CasOutcome::Unsupported)
    }

    /// Whether `compare_and_set` is implemented atomically
    fn supports_cas(&self) -> bool {
        false
    }
}
