//! Result cache keyed by query identity
//!
//! Entries are grouped into shards by [`DashMap`], so concurrent callers only
//! contend when their keys share a shard. Every per-key decision (pin count
//! check plus removal) runs while that shard is locked.
//!
//! The cache is unbounded: entries leave only through explicit eviction,
//! type-driven invalidation or [`ResultCache::clear`].

use crate::config::CacheConfig;
use crate::key::QueryKey;
use crate::stats::CacheStats;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Entry stored in the result cache
#[derive(Debug)]
struct CacheEntry<P> {
    payload: Arc<P>,
    /// Outstanding pins; the entry cannot be evicted while this is non-zero
    pins: usize,
    /// Entity types the result was read from
    touched_types: HashSet<String>,
    created_at: Instant,
}

impl<P> CacheEntry<P> {
    fn new(payload: Arc<P>, touched_types: HashSet<String>) -> Self {
        Self {
            payload,
            pins: 0,
            touched_types,
            created_at: Instant::now(),
        }
    }

    fn is_pinned(&self) -> bool {
        self.pins > 0
    }
}

/// Thread-safe cache of query results
///
/// Payloads are opaque to the cache. They are stored behind an [`Arc`] and
/// lookups hand out clones of that `Arc`, never the entry itself.
pub struct ResultCache<P> {
    entries: DashMap<QueryKey, CacheEntry<P>, RandomState>,
    enabled: bool,
    stats: Arc<CacheStats>,
}

impl<P> ResultCache<P> {
    /// Create a result cache from the given configuration
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::with_capacity_and_hasher(
                config.initial_capacity,
                RandomState::new(),
            ),
            enabled: config.result_cache_enabled,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Create a cache with default configuration
    pub fn with_defaults() -> Self {
        Self::new(&CacheConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a cached payload. Pin state is not affected.
    pub fn lookup(&self, key: &QueryKey) -> Option<Arc<P>> {
        if !self.enabled {
            return None;
        }

        match self.entries.get(key) {
            Some(entry) => {
                self.stats.record_hit();
                Some(Arc::clone(&entry.payload))
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Insert or replace the payload for `key`.
    ///
    /// New entries start unpinned. Replacing an entry keeps its pin count.
    pub fn insert<I, S>(&self, key: QueryKey, payload: P, touched_types: I) -> Arc<P>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let payload = Arc::new(payload);
        if !self.enabled {
            return payload;
        }

        let touched_types: HashSet<String> = touched_types.into_iter().map(Into::into).collect();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.payload = Arc::clone(&payload);
                entry.touched_types = touched_types;
                entry.created_at = Instant::now();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(Arc::clone(&payload), touched_types));
            }
        }
        self.stats.record_insertion();
        payload
    }

    /// Pin an entry so eviction leaves it alone. Returns `false` when the key
    /// is not cached, in which case nothing happens.
    pub fn pin(&self, key: &QueryKey) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.pins += 1;
                true
            }
            None => false,
        }
    }

    /// Release one pin. Returns `true` if a pin was released; an absent or
    /// unpinned entry is left alone and the count never drops below zero.
    pub fn unpin(&self, key: &QueryKey) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_pinned() => {
                entry.pins -= 1;
                true
            }
            _ => false,
        }
    }

    /// Remove an unpinned entry. Returns `true` if an entry was removed.
    ///
    /// A pinned entry is kept; the request is dropped, not deferred.
    pub fn evict(&self, key: &QueryKey) -> bool {
        if self.entries.remove_if(key, |_, entry| !entry.is_pinned()).is_some() {
            self.stats.record_evictions(1);
            return true;
        }

        if self.entries.contains_key(key) {
            debug!("Eviction of pinned result {} ignored", key);
            self.stats.record_pinned_skip();
        }
        false
    }

    /// Remove every unpinned entry. Returns the number removed.
    pub fn evict_all(&self) -> usize {
        let removed = self.evict_where(|_| true);
        debug!("Evicted {} cached results", removed);
        removed
    }

    /// Remove every unpinned entry whose result touched `entity_type`.
    /// Returns the number removed.
    pub fn evict_all_of_type(&self, entity_type: &str) -> usize {
        let removed = self.evict_where(|entry| entry.touched_types.contains(entity_type));
        debug!("Evicted {} cached results touching {}", removed, entity_type);
        removed
    }

    fn evict_where(&self, mut matches: impl FnMut(&CacheEntry<P>) -> bool) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.is_pinned() || !matches(entry);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.stats.record_evictions(removed as u64);
        removed
    }

    /// Remove everything, pinned entries included. Meant for teardown.
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        self.stats.record_evictions(count as u64);
        debug!("Cleared result cache ({} entries)", count);
    }

    /// Current pin count for `key`, or `None` if it is not cached
    pub fn pin_count(&self, key: &QueryKey) -> Option<usize> {
        self.entries.get(key).map(|entry| entry.pins)
    }

    pub fn is_pinned(&self, key: &QueryKey) -> bool {
        self.pin_count(key).is_some_and(|pins| pins > 0)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Time since the entry for `key` was last written
    pub fn age(&self, key: &QueryKey) -> Option<Duration> {
        self.entries.get(key).map(|entry| entry.created_at.elapsed())
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pinned_len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_pinned()).count()
    }
}

impl<P> Default for ResultCache<P> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<P> std::fmt::Debug for ResultCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("enabled", &self.enabled)
            .field("entries", &self.len())
            .field("pinned", &self.pinned_len())
            .finish()
    }
}
