//! Dashboard backend client
//!
//! The backend itself is an external service; this module only wraps its
//! REST endpoints behind the response cache.

mod client;
pub mod config;

pub use client::ApiClient;
pub use config::ApiConfig;
