//! Error types for schedule tables and the request cache

use std::path::PathBuf;

use thiserror::Error;

/// Schedule table construction or loading failure
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("exchange {id}: minute {minute} is outside 0..1440")]
    MinuteOutOfRange { id: String, minute: u16 },

    #[error("exchange {id}: open minute {open} must be before close minute {close}")]
    InvalidWindow { id: String, open: u16, close: u16 },

    #[error("exchange {id}: no trading days")]
    NoTradingDays { id: String },

    #[error("weekday {0} is outside 0..=6 (0 = Sunday)")]
    InvalidWeekday(u8),

    #[error("exchange id {0:?} appears more than once")]
    DuplicateId(String),

    #[error("exchange id must not be empty")]
    EmptyId,

    #[error("failed to parse schedule table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read schedule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Cached fetch failure
///
/// `Clone` so one in-flight result can be handed to every waiter. Nothing
/// that fails is ever written to the cache.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("HTTP {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("response from {url} is not valid JSON: {message}")]
    Decode { url: String, message: String },
}

impl CacheError {
    pub fn url(&self) -> &str {
        match self {
            CacheError::Request { url, .. }
            | CacheError::Status { url, .. }
            | CacheError::Decode { url, .. } => url,
        }
    }
}
