//! In-memory key/value store with lazy expiry
//!
//! Freshness is decided on read: an entry older than the caller's `max_age`
//! is evicted and reported as a miss. The optional background sweeper only
//! bounds memory; correctness never depends on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::types::{CacheEntry, CacheStats};

/// Shortest period accepted by `spawn_sweeper`
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
}

/// Key/value cache of JSON values stamped with their insertion time
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    counters: Counters,
    clock: Arc<dyn Clock>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCache {
    /// Cache on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            clock,
            sweeper: Mutex::new(None),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Fresh value for `key`, evicting it if it is older than `max_age`
    pub fn get(&self, key: &str, max_age: Duration) -> Option<Value> {
        let now = self.clock.now_ms();
        let mut entries = lock(&self.entries);

        match entries.get(key) {
            Some(entry) if entry.is_fresh(now, millis(max_age)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(entry) => {
                debug!("Cache entry {} expired ({} ms old)", key, entry.age_ms(now));
                entries.remove(key);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous entry
    pub fn set(&self, key: &str, value: Value) {
        let entry = CacheEntry::new(value, self.clock.now_ms());
        lock(&self.entries).insert(key.to_string(), entry);
        self.counters.stores.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove `key`; returns whether it was present
    pub fn delete(&self, key: &str) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Remove every entry older than `max_age`; returns how many were removed
    pub fn sweep(&self, max_age: Duration) -> usize {
        let now = self.clock.now_ms();
        let max_age_ms = millis(max_age);
        let mut entries = lock(&self.entries);

        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now, max_age_ms));
        let removed = before - entries.len();

        self.counters.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Run `sweep(max_age)` every `every` on the current tokio runtime
    ///
    /// Replaces a previously spawned sweeper. The task holds only a weak
    /// reference and exits once the cache is dropped. Periods shorter than
    /// `MIN_SWEEP_INTERVAL` are raised to it.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, max_age: Duration) {
        if every < MIN_SWEEP_INTERVAL {
            warn!("Sweep interval {:?} too short, using {:?}", every, MIN_SWEEP_INTERVAL);
        }
        let every = every.max(MIN_SWEEP_INTERVAL);
        let cache = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };

                let removed = cache.sweep(max_age);
                if removed > 0 {
                    debug!("Cache sweep removed {} entries, {} left", removed, cache.len());
                }
            }
        });

        if let Some(previous) = lock(&self.sweeper).replace(handle) {
            previous.abort();
        }

        info!("Cache sweeper started (every {:?}, max age {:?})", every, max_age);
    }

    pub fn stop_sweeper(&self) {
        if let Some(handle) = lock(&self.sweeper).take() {
            handle.abort();
            info!("Cache sweeper stopped");
        }
    }

    pub fn has_sweeper(&self) -> bool {
        lock(&self.sweeper).as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the sweeper and drop every entry
    pub fn dispose(&self) {
        self.stop_sweeper();
        self.clear();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.sweeper).take() {
            handle.abort();
        }
    }
}
