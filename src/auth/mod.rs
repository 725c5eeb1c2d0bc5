//! Authentication module
//!
//! Keeps credentials valid by exchanging refresh tokens for new access
//! tokens. The `RefreshController` enforces an attempts ceiling and a
//! cooldown window per credential key, persisting every step in the
//! shared credential store so concurrent callers observe the same state.

mod refresh;
mod types;

pub use refresh::RefreshController;
pub use types::{RefreshLimits, RefreshOutcome, RefreshRequest, RefreshResponse};
