//! HTTP request cache
//!
//! `fetch_with_cache` answers from the memory cache when the entry is fresh
//! and goes to the network otherwise. Concurrent misses for the same key
//! await one shared request. Only successful (2xx, valid JSON) responses are
//! stored; failures reach every waiter and leave the cache untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, warn};

use super::memory::MemoryCache;
use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::types::{CacheStats, HttpMethod, RequestOptions};
use crate::HTTP_TIMEOUT;

type FetchResult = std::result::Result<Value, CacheError>;
type InFlight = Shared<BoxFuture<'static, FetchResult>>;

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Pending request slot: id of the task that owns it plus its shared result
struct Pending {
    id: u64,
    result: InFlight,
}

type InFlightMap = Arc<Mutex<HashMap<String, Pending>>>;

fn lock_in_flight(map: &Mutex<HashMap<String, Pending>>) -> MutexGuard<'_, HashMap<String, Pending>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Response cache in front of a `reqwest` client
///
/// Each network request runs in its own tokio task, so it completes (and
/// frees its in-flight slot) even when every caller awaiting it is dropped.
pub struct RequestCache {
    store: Arc<MemoryCache>,
    client: Client,
    in_flight: InFlightMap,
    next_request_id: AtomicU64,
    /// Bumped by `dispose`; requests started under an older generation
    /// never write to the store
    generation: Arc<AtomicU64>,
}

impl RequestCache {
    /// Cache on the wall clock with a default HTTP client
    pub fn new() -> Result<Self> {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_parts(client, Arc::new(MemoryCache::with_clock(clock))))
    }

    pub fn with_parts(client: Client, store: Arc<MemoryCache>) -> Self {
        Self {
            store,
            client,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_request_id: AtomicU64::new(0),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<MemoryCache> {
        &self.store
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Number of requests currently on the wire
    pub fn in_flight_len(&self) -> usize {
        lock_in_flight(&self.in_flight).len()
    }

    /// Fetch `url` as JSON, reusing a cached body no older than `max_age`
    ///
    /// Must be called from within a tokio runtime.
    pub async fn fetch_with_cache(
        &self,
        url: &str,
        options: &RequestOptions,
        max_age: Duration,
    ) -> FetchResult {
        let key = options.cache_key(url);

        if let Some(value) = self.store.get(&key, max_age) {
            debug!("Cache hit: {} {}", method_name(options), url);
            return Ok(value);
        }

        let request = {
            // Held while spawning so the task cannot release its slot
            // before the slot exists
            let mut in_flight = lock_in_flight(&self.in_flight);
            match in_flight.get(&key) {
                Some(pending) => {
                    debug!("Joining in-flight request: {} {}", method_name(options), url);
                    pending.result.clone()
                }
                None => {
                    debug!("Cache miss: {} {}", method_name(options), url);
                    let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
                    let result = self.spawn_request(id, &key, url, options);
                    in_flight.insert(key.clone(), Pending { id, result: result.clone() });
                    result
                }
            }
        };

        request.await
    }

    fn spawn_request(&self, id: u64, key: &str, url: &str, options: &RequestOptions) -> InFlight {
        let store = Arc::clone(&self.store);
        let slots = Arc::clone(&self.in_flight);
        let generation = Arc::clone(&self.generation);
        let started_in = generation.load(Ordering::SeqCst);
        let client = self.client.clone();
        let key = key.to_string();
        let url = url.to_string();
        let options = options.clone();

        let task = tokio::spawn({
            let url = url.clone();
            async move {
                let result = send_request(&client, &url, &options).await;

                let mut in_flight = lock_in_flight(&slots);
                match &result {
                    Ok(value) if generation.load(Ordering::SeqCst) == started_in => {
                        store.set(&key, value.clone())
                    }
                    Ok(_) => debug!("Cache disposed while fetching {}, not cached", url),
                    Err(e) => warn!("Fetch failed, not cached: {}", e),
                }
                // A newer request may already occupy the slot; only remove our own
                if in_flight.get(&key).is_some_and(|pending| pending.id == id) {
                    in_flight.remove(&key);
                }

                result
            }
        });

        async move {
            task.await.unwrap_or_else(|e| Err(CacheError::Request { url, message: e.to_string() }))
        }
        .boxed()
        .shared()
    }

    pub fn get(&self, key: &str, max_age: Duration) -> Option<Value> {
        self.store.get(key, max_age)
    }

    pub fn set(&self, key: &str, value: Value) {
        self.store.set(key, value)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.store.delete(key)
    }

    pub fn clear(&self) {
        self.store.clear()
    }

    pub fn sweep(&self, max_age: Duration) -> usize {
        self.store.sweep(max_age)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// See [`MemoryCache::spawn_sweeper`]
    pub fn spawn_sweeper(&self, every: Duration, max_age: Duration) {
        self.store.spawn_sweeper(every, max_age)
    }

    /// Stop the sweeper, drop every entry and forget in-flight requests
    ///
    /// Requests still on the wire finish for their callers but are not cached.
    pub fn dispose(&self) {
        {
            let mut in_flight = lock_in_flight(&self.in_flight);
            self.generation.fetch_add(1, Ordering::SeqCst);
            in_flight.clear();
        }
        self.store.dispose();
    }
}

fn method_name(options: &RequestOptions) -> &'static str {
    match options.method {
        HttpMethod::Get => "GET",
        HttpMethod::Post => "POST",
        HttpMethod::Put => "PUT",
        HttpMethod::Patch => "PATCH",
        HttpMethod::Delete => "DELETE",
    }
}

async fn send_request(client: &Client, url: &str, options: &RequestOptions) -> FetchResult {
    let request_error = |e: reqwest::Error| CacheError::Request {
        url: url.to_string(),
        message: e.to_string(),
    };

    let mut request = client.request(options.method.into(), url);
    for (name, value) in &options.headers {
        request = request.header(name, value);
    }
    if let Some(body) = &options.body {
        request = request.json(body);
    }

    let response = request.send().await.map_err(request_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CacheError::Status { url: url.to_string(), status: status.as_u16(), body });
    }

    let bytes = response.bytes().await.map_err(request_error)?;
    serde_json::from_slice(&bytes).map_err(|e| CacheError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_creation() {
        let cache = RequestCache::new();
        assert!(cache.is_ok());
        assert!(cache.unwrap().is_empty());
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(Method::from(HttpMethod::Get), Method::GET);
        assert_eq!(Method::from(HttpMethod::Delete), Method::DELETE);
        assert_eq!(method_name(&RequestOptions::post(serde_json::json!({}))), "POST");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_not_cached() {
        let cache = RequestCache::new().unwrap();
        // Port 9 (discard) on localhost refuses connections
        let url = "http://127.0.0.1:9/api/markets";

        let err = cache
            .fetch_with_cache(url, &RequestOptions::get(), Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Request { .. }));
        assert!(cache.is_empty());
    }
}
