//! # Cache Store
//! Generic keyed read-through cache with a fixed TTL, explicit invalidation,
//! and serve-stale-on-error fallback.
//!
//! The freshness check, the upstream fetch, and the overwrite run under one
//! async per-key lock, so concurrent misses for the same key coalesce into a
//! single upstream fetch (at most one fetch in flight per key). Separate
//! cache instances own separate lock sets.
//!
//! Entries are overwritten on refresh, never merged, and never evicted; a
//! stale entry stays available as a degraded fallback for the process
//! lifetime or until explicitly replaced.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::clock::Clock;

/// A cached value plus the instant it was fetched.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: DateTime<Utc>,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone)]
pub struct CacheLookup<V> {
    pub value: V,
    pub was_cache_hit: bool,
    /// True when a failed refresh fell back to an existing entry.
    pub is_stale: bool,
    /// The rendered fetch error when `is_stale` is set by a failed refresh.
    pub stale_error: Option<String>,
}

type Slot<V> = Arc<AsyncMutex<Option<CacheEntry<V>>>>;

/// Keyed TTL cache. The unit key `()` turns it into a single-slot cache.
pub struct TtlCache<K, V> {
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>, ttl: std::time::Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::MAX);
        Self {
            clock,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key` if fresh, otherwise run `fetch`.
    ///
    /// On fetch success the entry is overwritten and returned as a miss. On
    /// fetch failure an existing entry (fresh or expired) is returned with
    /// `is_stale = true` and the error rendered into `stale_error`; with no
    /// entry the error propagates.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: K,
        force_refresh: bool,
        fetch: F,
    ) -> Result<CacheLookup<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        let slot = self.slot(&key);
        // Held across the fetch: serializes check-freshness -> fetch ->
        // overwrite per key, so duplicate misses coalesce.
        let mut guard = slot.lock().await;

        if !force_refresh {
            if let Some(entry) = guard.as_ref() {
                let age = self.clock.now().signed_duration_since(entry.fetched_at);
                if age < self.ttl {
                    debug!(age_ms = age.num_milliseconds(), "cache hit");
                    return Ok(CacheLookup {
                        value: entry.value.clone(),
                        was_cache_hit: true,
                        is_stale: false,
                        stale_error: None,
                    });
                }
            }
        }

        match fetch().await {
            Ok(value) => {
                *guard = Some(CacheEntry {
                    value: value.clone(),
                    fetched_at: self.clock.now(),
                });
                Ok(CacheLookup {
                    value,
                    was_cache_hit: false,
                    is_stale: false,
                    stale_error: None,
                })
            }
            Err(err) => {
                if let Some(entry) = guard.as_ref() {
                    warn!(error = %err, "fetch failed, serving last known value");
                    Ok(CacheLookup {
                        value: entry.value.clone(),
                        was_cache_hit: true,
                        is_stale: true,
                        stale_error: Some(err.to_string()),
                    })
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Drop the entry for `key`, if any. The next lookup will fetch.
    pub async fn invalidate(&self, key: &K) {
        let slot = {
            let slots = self.slots.lock().expect("cache slot map poisoned");
            slots.get(key).cloned()
        };
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    /// Number of keys that currently hold an entry slot (fresh or stale).
    pub fn len(&self) -> usize {
        self.slots.lock().expect("cache slot map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &K) -> Slot<V> {
        let mut slots = self.slots.lock().expect("cache slot map poisoned");
        slots.entry(key.clone()).or_default().clone()
    }
}

impl<V> TtlCache<(), V>
where
    V: Clone,
{
    /// Single-slot convenience for key-less caches.
    pub async fn get_or_fetch_single<F, Fut, E>(
        &self,
        force_refresh: bool,
        fetch: F,
    ) -> Result<CacheLookup<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        self.get_or_fetch((), force_refresh, fetch).await
    }
}
