//! Cached REST client for the dashboard backend
//!
//! Base URL: http://localhost:5000 (override with BOURSE_API_URL)
//!
//! # Endpoints
//! - GET /api/markets - Exchange list with index levels
//! - GET /api/stocks/{symbol} - Quote for one listing
//! - GET /api/news - Market news feed
//!
//! Every GET goes through the `RequestCache`; bodies are returned as raw JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;
use url::Url;

use super::config::ApiConfig;
use crate::cache::RequestCache;
use crate::types::{CacheStats, RequestOptions};
use crate::API_PREFIX;

/// Backend client sharing one response cache
#[derive(Clone)]
pub struct ApiClient {
    cache: Arc<RequestCache>,
    base_url: String,
    max_age: Duration,
    sweep_interval: Duration,
}

impl ApiClient {
    /// Client with its own cache, configured from `config`
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let cache = Arc::new(RequestCache::new()?);
        Ok(Self::with_cache(cache, config))
    }

    /// Client over an existing cache
    pub fn with_cache(cache: Arc<RequestCache>, config: &ApiConfig) -> Self {
        Self {
            cache,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_age: config.max_age,
            sweep_interval: config.sweep_interval,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    /// Full URL for an `/api` path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// Start the periodic cache sweep; needs a running tokio runtime
    pub fn start_sweeper(&self) {
        self.cache.spawn_sweeper(self.sweep_interval, self.max_age);
    }

    /// Cached GET with the configured freshness window
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        self.get_json_with_max_age(path, self.max_age).await
    }

    /// URL for one listing; the symbol is percent-encoded as a single path segment
    pub fn stock_url(&self, symbol: &str) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Base URL {} cannot take a path", self.base_url))?
            .pop_if_empty()
            .extend([API_PREFIX.trim_start_matches('/'), "stocks", symbol]);
        Ok(url.into())
    }

    /// Cached GET with an explicit freshness window
    pub async fn get_json_with_max_age(&self, path: &str, max_age: Duration) -> Result<Value> {
        self.fetch_url(&self.url(path), max_age).await
    }

    async fn fetch_url(&self, url: &str, max_age: Duration) -> Result<Value> {
        let value = self
            .cache
            .fetch_with_cache(url, &RequestOptions::get(), max_age)
            .await
            .with_context(|| format!("GET {} failed", url))?;
        Ok(value)
    }

    /// Endpoint: GET /api/markets
    pub async fn markets(&self) -> Result<Value> {
        self.get_json("/markets").await
    }

    /// Endpoint: GET /api/stocks/{symbol}
    pub async fn stock(&self, symbol: &str) -> Result<Value> {
        let url = self.stock_url(symbol)?;
        self.fetch_url(&url, self.max_age).await
    }

    /// Endpoint: GET /api/news
    pub async fn news(&self) -> Result<Value> {
        self.get_json("/news").await
    }

    /// Drop the cached GET for `path`; returns whether one was cached
    pub fn invalidate(&self, path: &str) -> bool {
        let key = RequestOptions::get().cache_key(&self.url(path));
        self.cache.delete(&key)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Uncached request to the base URL; any HTTP status counts as reachable
    pub async fn test_connectivity(&self) -> Result<()> {
        info!("Testing connectivity to {}", self.base_url);

        let response = self
            .cache
            .client()
            .get(&self.base_url)
            .send()
            .await
            .context("Connection test failed")?;

        info!("Connectivity test: HTTP {}", response.status());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ApiClient::new(&ApiConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_custom_base_url() {
        let config = ApiConfig { base_url: "https://example.com/".to_string(), ..ApiConfig::default() };
        let client = ApiClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://example.com");
        assert_eq!(client.url("/news"), "https://example.com/api/news");
    }

    #[test]
    fn test_stock_url_encodes_symbol() {
        let config = ApiConfig { base_url: "http://localhost:5000/".to_string(), ..ApiConfig::default() };
        let client = ApiClient::new(&config).unwrap();

        assert_eq!(client.stock_url("NPN").unwrap(), "http://localhost:5000/api/stocks/NPN");
        assert_eq!(client.stock_url("NPN").unwrap(), client.url("/stocks/NPN"));

        // Reserved characters stay inside the one segment
        let url = client.stock_url("BRK/A?x#y").unwrap();
        assert_eq!(url, "http://localhost:5000/api/stocks/BRK%2FA%3Fx%23y");
    }

    #[test]
    fn test_stock_url_keeps_base_path() {
        let config = ApiConfig { base_url: "https://example.com/dash".to_string(), ..ApiConfig::default() };
        let client = ApiClient::new(&config).unwrap();
        assert_eq!(client.stock_url("SCOM").unwrap(), "https://example.com/dash/api/stocks/SCOM");
    }

    #[test]
    fn test_invalidate_cached_path() {
        let client = ApiClient::new(&ApiConfig::default()).unwrap();
        let key = RequestOptions::get().cache_key(&client.url("/markets"));
        client.cache().set(&key, serde_json::json!([]));

        assert!(client.invalidate("/markets"));
        assert!(!client.invalidate("/markets"));
        assert!(client.cache().is_empty());
    }
}
