//! Check-result cache with TTL expiration

use blake3::Hasher;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::types::Fact;

/// Cache key type (BLAKE3 hash)
type CacheKey = [u8; 32];

#[derive(Clone, Copy)]
struct CachedEntry {
    allowed: bool,
    cached_at: Instant,
}

/// Thread-safe cache of check results.
///
/// Entries expire after the configured TTL. Any successful tuple write
/// clears the cache wholesale, so a check issued after a write never
/// serves a stale deny.
pub struct CheckCache {
    entries: DashMap<CacheKey, CachedEntry>,
    ttl: Duration,
    capacity: usize,
}

impl CheckCache {
    /// Create a cache with the given TTL and entry capacity
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Look up a previous check result, ignoring expired entries
    pub fn get(&self, store_id: &str, model_id: &str, fact: &Fact) -> Option<bool> {
        let key = cache_key(store_id, model_id, fact);
        let entry = self.entries.get(&key)?;
        if entry.cached_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.allowed)
    }

    /// Record a check result
    pub fn put(&self, store_id: &str, model_id: &str, fact: &Fact, allowed: bool) {
        if self.entries.len() >= self.capacity {
            let ttl = self.ttl;
            self.entries.retain(|_, e| e.cached_at.elapsed() <= ttl);
            if self.entries.len() >= self.capacity {
                return;
            }
        }
        self.entries.insert(
            cache_key(store_id, model_id, fact),
            CachedEntry {
                allowed,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop all entries; called after every successful write
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cache_key(store_id: &str, model_id: &str, fact: &Fact) -> CacheKey {
    let mut hasher = Hasher::new();
    for part in [store_id, model_id, &fact.object, &fact.relation, &fact.subject] {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    *hasher.finalize().as_bytes()
}
