//! Result cache for rendered variants.
//!
//! Decoding, blurring and re-encoding an original is the expensive part of a
//! request; the same URL is typically requested many times. This module keeps
//! recently rendered variants in memory so repeats skip the pipeline.
//!
//! # Design
//!
//! ## Cache keys
//!
//! A key is a pure function of the image id and the raw query parameters:
//! parameter names are sorted, empty values are dropped, and the pairs are
//! joined as `name=value` with `&`. Identical parameter sets in any order
//! produce the same key. The separators `%`, `&`, `=` and `?` are
//! percent-escaped inside every component, so two different parameter sets
//! can never serialize to the same key.
//!
//! ```text
//! cache_key("cat", {w: 400, h: 300})  →  "cat?h=300&w=400"
//! ```
//!
//! ## Eviction
//!
//! - **Capacity**: fixed at construction. Inserting into a full cache evicts
//!   the least-recently-used entry; a successful `get` promotes its entry.
//!   Capacity `0` disables caching entirely: `get` always misses and `set`
//!   does nothing.
//! - **TTL**: checked lazily on `get`. An expired entry is removed and
//!   reported as a miss.
//!
//! ## Concurrency
//!
//! One `parking_lot::Mutex` guards the LRU map. Only lookups and inserts run
//! under it; rendering happens outside. Entries are shared as
//! `Arc<CacheEntry>` and never mutated after insertion. Counters are atomics
//! so `/healthz` can read them without taking the lock.

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// One rendered variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub bytes: Bytes,
    pub content_type: String,
    /// Computed once at insertion so hits do not rehash the body.
    pub etag: String,
    pub created_at: Instant,
}

impl CacheEntry {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        let bytes = bytes.into();
        Self {
            etag: etag(&bytes),
            bytes,
            content_type: content_type.into(),
            created_at: Instant::now(),
        }
    }
}

/// Build the cache key for `image_id` and its raw query parameters.
pub fn cache_key(image_id: &str, params: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<&str, &str> = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let mut key = escape_component(image_id);
    key.push('?');
    let pairs: Vec<String> = sorted
        .into_iter()
        .map(|(k, v)| format!("{}={}", escape_component(k), escape_component(v)))
        .collect();
    key.push_str(&pairs.join("&"));
    key
}

fn escape_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '?' => out.push_str("%3F"),
            _ => out.push(c),
        }
    }
    out
}

/// Strong validator for a rendered body: quoted SHA-256 hex digest.
pub fn etag(bytes: &[u8]) -> String {
    format!("\"{:x}\"", Sha256::digest(bytes))
}

/// Lock-free counters describing cache behavior since startup.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`], plus the current entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStatsSnapshot {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {} hits / {} lookups, {} evicted, {} expired",
            self.entries,
            self.hits,
            self.lookups(),
            self.evictions,
            self.expirations
        )
    }
}

/// Bounded LRU/TTL store of rendered variants.
pub struct ResultCache {
    /// `None` when capacity is zero.
    store: Option<Mutex<LruCache<String, Arc<CacheEntry>>>>,
    ttl: Option<Duration>,
    stats: CacheStats,
}

impl ResultCache {
    /// `ttl = None` keeps entries until they are evicted by capacity.
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        Self {
            store: NonZeroUsize::new(max_entries).map(|cap| Mutex::new(LruCache::new(cap))),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.get_at(key, Instant::now())
    }

    pub fn set(&self, key: String, entry: CacheEntry) {
        let Some(store) = &self.store else {
            return;
        };
        let evicted = store.lock().push(key.clone(), Arc::new(entry));
        // push returns the old value on replace, or the LRU entry on overflow
        if let Some((old_key, _)) = evicted
            && old_key != key
        {
            debug!(key = %old_key, "cache evicted");
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Lookup against an explicit clock.
    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<Arc<CacheEntry>> {
        let Some(store) = &self.store else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let mut store = store.lock();

        let expired = match (store.peek(key), self.ttl) {
            (Some(entry), Some(ttl)) => now.saturating_duration_since(entry.created_at) >= ttl,
            _ => false,
        };
        if expired {
            store.pop(key);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match store.get(key) {
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(entry))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        if let Some(store) = &self.store {
            store.lock().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            entries: self.len(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
        }
    }
}
