//! Cache tiers
//!
//! A [`CacheTier`] wraps the [`LruCache`] engine with a mutex, running byte
//! accounting, and hit/miss/eviction counters. Tiers have no entry-count
//! bound of their own; their footprint is controlled externally by the
//! group-level byte budget.

mod lru;

pub use lru::{EvictionCallback, LruCache};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::byteview::ByteView;

/// Byte cost of one cache entry
fn entry_cost(key: &str, value: &ByteView) -> u64 {
    (key.len() + value.len()) as u64
}

/// Point-in-time counters for one cache tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Total bytes of all live keys and values
    pub bytes: u64,
    /// Number of live entries
    pub items: u64,
    /// Total lookups
    pub gets: u64,
    /// Lookups that found a live entry
    pub hits: u64,
    /// Entries removed under byte pressure
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct TierCounters {
    nbytes: AtomicU64,
    gets: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
}

/// A thread-safe, byte-accounted cache tier.
///
/// All operations take the tier mutex for their duration; the counters are
/// atomics shared with the inner engine's eviction callback, which
/// decrements the byte total by exactly the evicted entry's cost.
#[derive(Debug)]
pub(crate) struct CacheTier {
    // Inner engine, built lazily on first add.
    lru: Mutex<Option<LruCache>>,
    counters: Arc<TierCounters>,
}

impl CacheTier {
    pub(crate) fn new() -> Self {
        Self {
            lru: Mutex::new(None),
            counters: Arc::new(TierCounters::default()),
        }
    }

    /// Insert or replace `key`, keeping the byte total consistent.
    pub(crate) fn add(&self, key: &str, value: ByteView) {
        let mut guard = self.lru.lock();
        let lru = guard.get_or_insert_with(|| {
            let counters = Arc::clone(&self.counters);
            LruCache::new(0).with_eviction_callback(Box::new(move |key, value| {
                counters
                    .nbytes
                    .fetch_sub(entry_cost(key, value), Ordering::Relaxed);
                counters.evictions.fetch_add(1, Ordering::Relaxed);
            }))
        });

        let cost = entry_cost(key, &value);
        let replaced = lru.add(key, value);
        self.counters.nbytes.fetch_add(cost, Ordering::Relaxed);
        if let Some(old) = replaced {
            self.counters
                .nbytes
                .fetch_sub(entry_cost(key, &old), Ordering::Relaxed);
        }
    }

    /// Look up `key`, counting the probe and any hit.
    pub(crate) fn get(&self, key: &str) -> Option<ByteView> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.lru.lock();
        let value = guard.as_mut()?.get(key).cloned()?;
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Evict the oldest entry, if any.
    pub(crate) fn remove_oldest(&self) {
        let mut guard = self.lru.lock();
        if let Some(lru) = guard.as_mut() {
            lru.remove_oldest();
        }
    }

    /// Current byte total over all live entries.
    pub(crate) fn bytes(&self) -> u64 {
        self.counters.nbytes.load(Ordering::Relaxed)
    }

    /// Number of live entries.
    pub(crate) fn items(&self) -> u64 {
        let guard = self.lru.lock();
        guard.as_ref().map_or(0, |lru| lru.len() as u64)
    }

    /// Snapshot of this tier's counters.
    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            bytes: self.bytes(),
            items: self.items(),
            gets: self.counters.gets.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry, resetting the byte total.
    #[cfg(test)]
    pub(crate) fn clear(&self) {
        let mut guard = self.lru.lock();
        if let Some(lru) = guard.as_mut() {
            lru.clear();
        }
    }
}
