//! Service address resolution
//!
//! Turns a logical service name plus a path into a URL the caller can reach.
//! Sources are consulted in priority order, first match wins:
//!
//! 1. **Registry** - `service_registry:<name>` in the shared key-value store,
//!    rewritten to its host-externally-reachable form
//! 2. **Environment** - `<SERVICE>_URL` or `<SERVICE>_HOST` / `_PORT` / `_PROTOCOL`
//! 3. **Defaults** - `http://localhost:<default port>`
//!
//! Resolution is total: lookup failures fall through to the next source.

mod env;
mod address;
mod types;

pub use env::{EnvSource, ProcessEnv, PUBLIC_PREFIX};
pub use address::{join_path, AddressResolver, REGISTRY_PREFIX};
pub use types::{Resolution, ResolutionContext, ResolutionSource, ServiceDescriptor};
