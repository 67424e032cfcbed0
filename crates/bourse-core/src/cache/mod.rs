//! Response caching
//!
//! # Components
//! - `MemoryCache`: key -> (JSON value, insertion time) with lazy expiry and
//!   an optional periodic sweeper
//! - `RequestCache`: `fetch_with_cache` over `reqwest`, sharing in-flight
//!   requests between concurrent callers (requires `http`)
//!
//! Caches are constructed explicitly and passed to whoever needs them; there
//! is no process-wide instance.

mod memory;

#[cfg(feature = "http")]
mod request;

pub use memory::{MemoryCache, MIN_SWEEP_INTERVAL};

#[cfg(feature = "http")]
pub use request::RequestCache;
