// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Query Result Cache
//!
//! TTL + LRU cache for successful query results, so repeated introspection
//! calls do not round-trip to the engine.
//!
//! ## Cache Key Generation
//!
//! ```text
//! key = operation_kind ":" BLAKE3(normalized_text || max_rows || mode)
//! ```
//!
//! Normalization trims the text and collapses whitespace outside literals,
//! quoted names and bracketed references. The operation-kind prefix lets
//! callers drop every entry of one kind with [`QueryCache::invalidate_prefix`].
//!
//! ## Eviction
//!
//! Storage is a `moka` cache with a plain LRU policy and a per-entry
//! `expire_after`. TTL is also checked against the injected [`Clock`] on
//! lookup, so expiry is deterministic under a manual clock:
//!
//! - TTL: an entry is never returned once `ttl` has elapsed since it was
//!   stored; expired entries are removed on lookup.
//! - Size: on insert at capacity, expired entries are purged first, then the
//!   least-recently-used entry is evicted.

use crate::validation::normalize_query_text;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;
use olapgate_core::{Clock, OperationKind, QueryMode};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deterministic fingerprint of a request's cache-relevant fields.
pub fn cache_key(
    operation_kind: OperationKind,
    text: &str,
    max_rows: Option<usize>,
    mode: QueryMode,
) -> String {
    let normalized = normalize_query_text(text);

    let mut hasher = blake3::Hasher::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"|");
    match max_rows {
        Some(rows) => hasher.update(&(rows as u64).to_le_bytes()),
        None => hasher.update(b"none"),
    };
    hasher.update(b"|");
    hasher.update(mode.as_str().as_bytes());

    format!("{}:{}", operation_kind, hex::encode(hasher.finalize().as_bytes()))
}

/// A stored value with its expiry bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    /// Injected-clock instant of the last store
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) >= self.ttl
    }
}

/// Hands each entry's own TTL to moka; a store restarts it.
struct EntryTtl;

impl<V> Expiry<String, CacheEntry<V>> for EntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry<V>, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub capacity: usize,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

#[derive(Default)]
struct RemovalCounters {
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Result cache shared by all gateway callers
pub struct QueryCache<V> {
    entries: Cache<String, CacheEntry<V>>,
    capacity: usize,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    /// Serializes capacity enforcement; lookups never take it
    store_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    removals: Arc<RemovalCounters>,
}

impl<V: Clone + Send + Sync + 'static> QueryCache<V> {
    pub fn new(capacity: usize, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        let removals = Arc::new(RemovalCounters::default());

        let counters = removals.clone();
        let entries = Cache::builder()
            .max_capacity(capacity as u64)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryTtl)
            .eviction_listener(move |key: Arc<String>, _entry: CacheEntry<V>, cause| match cause {
                RemovalCause::Size => {
                    counters.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "Evicted least-recently-used cache entry");
                }
                RemovalCause::Expired => {
                    counters.expirations.fetch_add(1, Ordering::Relaxed);
                }
                RemovalCause::Explicit | RemovalCause::Replaced => {}
            })
            .build();

        Self {
            entries,
            capacity,
            default_ttl,
            clock,
            store_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            removals,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetch a live entry, refreshing its LRU position.
    pub fn lookup(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            Some(_) => {
                self.entries.invalidate(key);
                self.removals.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite `key`, resetting its TTL.
    pub fn store(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let _guard = self.store_lock.lock();
        let now = self.clock.now();

        self.entries.run_pending_tasks();
        if !self.entries.contains_key(&key) && self.len_settled() >= self.capacity {
            self.purge_expired(now);
        }

        let entry = CacheEntry {
            key: key.clone(),
            value,
            stored_at: now,
            ttl,
        };
        self.entries.insert(key, entry);
        // Apply size eviction now rather than on a later call
        self.entries.run_pending_tasks();
    }

    fn purge_expired(&self, now: Instant) {
        let expired: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key)
            .collect();

        for key in &expired {
            self.entries.invalidate(key.as_str());
        }
        self.removals
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
    }

    fn len_settled(&self) -> usize {
        self.entries.entry_count() as usize
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix`. Returns the count.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let matching: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();

        for key in &matching {
            self.entries.invalidate(key.as_str());
        }
        self.entries.run_pending_tasks();
        matching.len()
    }

    pub fn clear(&self) {
        let keys: Vec<Arc<String>> = self.entries.iter().map(|(key, _)| key).collect();
        for key in &keys {
            self.entries.invalidate(key.as_str());
        }
        self.entries.run_pending_tasks();
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.len_settled()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.removals.evictions.load(Ordering::Relaxed),
            expirations: self.removals.expirations.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olapgate_core::ManualClock;
    use proptest::prelude::*;

    fn cache(capacity: usize) -> (QueryCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (
            QueryCache::new(capacity, Duration::from_secs(300), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_key_is_deterministic_and_normalized() {
        let a = cache_key(OperationKind::QueryExecution, "EVALUATE  Sales\n", Some(10), QueryMode::Preview);
        let b = cache_key(OperationKind::QueryExecution, " EVALUATE Sales", Some(10), QueryMode::Preview);
        assert_eq!(a, b);
        assert!(a.starts_with("query_execution:"));

        let other_mode = cache_key(OperationKind::QueryExecution, "EVALUATE Sales", Some(10), QueryMode::Analyze);
        let other_rows = cache_key(OperationKind::QueryExecution, "EVALUATE Sales", None, QueryMode::Preview);
        let other_kind = cache_key(OperationKind::Export, "EVALUATE Sales", Some(10), QueryMode::Preview);
        assert_ne!(a, other_mode);
        assert_ne!(a, other_rows);
        assert_ne!(a, other_kind);
    }

    #[test]
    fn test_key_keeps_whitespace_inside_literals() {
        let key = |text: &str| cache_key(OperationKind::QueryExecution, text, None, QueryMode::Preview);
        assert_ne!(
            key("EVALUATE FILTER(Sales, Sales[Code] = \"A  B\")"),
            key("EVALUATE FILTER(Sales, Sales[Code] = \"A B\")")
        );
        assert_ne!(key("EVALUATE 'My  Table'"), key("EVALUATE 'My Table'"));
        assert_eq!(
            key("EVALUATE  FILTER(Sales,\n Sales[Code] = \"A  B\")"),
            key("EVALUATE FILTER(Sales, Sales[Code] = \"A  B\")")
        );
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let (cache, clock) = cache(8);
        cache.store("k", "v".to_string(), Duration::from_secs(10));
        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.lookup("k").as_deref(), Some("v"));

        clock.advance(Duration::from_secs(1));
        assert!(cache.lookup("k").is_none());
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_store_overwrites_and_resets_ttl() {
        let (cache, clock) = cache(8);
        cache.store("k", "old".to_string(), Duration::from_secs(10));
        clock.advance(Duration::from_secs(8));
        cache.store("k", "new".to_string(), Duration::from_secs(10));
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.lookup("k").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction_order() {
        let (cache, _clock) = cache(2);
        cache.store("a", "1".to_string(), Duration::from_secs(60));
        cache.store("b", "2".to_string(), Duration::from_secs(60));

        // Touch "a" so "b" becomes least recently used
        assert!(cache.lookup("a").is_some());
        cache.store("c", "3".to_string(), Duration::from_secs(60));

        assert!(cache.lookup("b").is_none());
        assert!(cache.lookup("a").is_some());
        assert!(cache.lookup("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_expired_entries_purged_before_lru() {
        let (cache, clock) = cache(2);
        cache.store("short", "1".to_string(), Duration::from_secs(5));
        cache.store("long", "2".to_string(), Duration::from_secs(500));
        clock.advance(Duration::from_secs(6));
        cache.store("new", "3".to_string(), Duration::from_secs(500));

        assert!(cache.lookup("long").is_some());
        assert!(cache.lookup("new").is_some());
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_invalidation() {
        let (cache, _clock) = cache(8);
        cache.store("query_execution:1", "a".to_string(), Duration::from_secs(60));
        cache.store("query_execution:2", "b".to_string(), Duration::from_secs(60));
        cache.store("metadata_fetch:1", "c".to_string(), Duration::from_secs(60));

        assert!(cache.invalidate("metadata_fetch:1"));
        assert!(!cache.invalidate("metadata_fetch:1"));
        assert_eq!(cache.invalidate_prefix("query_execution:"), 2);
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn prop_store_then_lookup_round_trips(key in "[a-z]{1,16}", value in ".{0,64}", ttl in 1u64..10_000) {
            let (cache, _clock) = cache(16);
            cache.store(key.clone(), value.clone(), Duration::from_secs(ttl));
            prop_assert_eq!(cache.lookup(&key), Some(value));
        }

        #[test]
        fn prop_lookup_after_ttl_misses(key in "[a-z]{1,16}", ttl in 0u64..10_000, extra in 0u64..100) {
            let (cache, clock) = cache(16);
            cache.store(key.clone(), "v".to_string(), Duration::from_secs(ttl));
            clock.advance(Duration::from_secs(ttl + extra));
            prop_assert!(cache.lookup(&key).is_none());
        }
    }
}
