//! Backend client configuration
//!
//! Environment variables (all optional):
//! - BOURSE_API_URL: backend base URL, without the `/api` prefix
//! - BOURSE_CACHE_MAX_AGE_MS: freshness window for cached GETs
//! - BOURSE_SWEEP_INTERVAL_SECS: background sweep period

use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::{DEFAULT_API_URL, DEFAULT_MAX_AGE, DEFAULT_SWEEP_INTERVAL};

pub const ENV_API_URL: &str = "BOURSE_API_URL";
pub const ENV_MAX_AGE_MS: &str = "BOURSE_CACHE_MAX_AGE_MS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "BOURSE_SWEEP_INTERVAL_SECS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    /// Backend base URL, no trailing slash
    pub base_url: String,
    /// Freshness window for cached responses
    pub max_age: Duration,
    /// Period of the background cache sweep
    pub sweep_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            max_age: DEFAULT_MAX_AGE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ApiConfig {
    /// Defaults overridden by whichever environment variables are set
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            config = config.with_base_url(&url)?;
        }

        if let Some(raw) = lookup(ENV_MAX_AGE_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be milliseconds, got {:?}", ENV_MAX_AGE_MS, raw))?;
            config.max_age = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup(ENV_SWEEP_INTERVAL_SECS) {
            let secs: u64 = raw.trim().parse().with_context(|| {
                format!("{} must be seconds, got {:?}", ENV_SWEEP_INTERVAL_SECS, raw)
            })?;
            if secs == 0 {
                anyhow::bail!("{} must be greater than zero", ENV_SWEEP_INTERVAL_SECS);
            }
            config.sweep_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Replace the base URL after checking it parses as http(s)
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url).with_context(|| format!("Invalid API URL {:?}", base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("API URL must be http or https, got {}", parsed.scheme());
        }

        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ApiConfig::default());
        assert_eq!(config.max_age, Duration::from_secs(60));
    }

    #[test]
    fn test_env_overrides() {
        let config = ApiConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://bourse.example.com/"),
            (ENV_MAX_AGE_MS, "15000"),
            (ENV_SWEEP_INTERVAL_SECS, "30"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://bourse.example.com");
        assert_eq!(config.max_age, Duration::from_millis(15_000));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(ApiConfig::from_lookup(lookup(&[(ENV_MAX_AGE_MS, "soon")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[(ENV_SWEEP_INTERVAL_SECS, "0")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[(ENV_API_URL, "not a url")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[(ENV_API_URL, "ftp://host")])).is_err());
    }
}
