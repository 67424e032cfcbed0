//! Bourse dashboard core
//!
//! Logic shared by the dashboard front end and the `bourse` CLI:
//! - `session`: exchange trading-hour tables and open/closed evaluation
//! - `cache`: in-memory response cache with lazy expiry and a background sweeper
//! - `api`: cached client for the dashboard backend REST API (requires `http`)
//!
//! All times are UTC. Exchange sessions never cross midnight; schedule tables
//! reject any window that would.

pub mod clock;
pub mod error;
pub mod session;
pub mod types;

pub mod cache;

#[cfg(feature = "http")]
pub mod api;

use std::time::Duration;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, ScheduleError};
pub use types::*;

/// Default dashboard backend base URL (local development server)
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// REST prefix under which every backend endpoint lives
pub const API_PREFIX: &str = "/api";

/// Default freshness window for cached responses
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60);

/// Default interval between background cache sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Timeout applied to every outbound HTTP request
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
