//! Cache-aside key/value store with TTL and domain-indexed invalidation.
//!
//! Readers `get`; writers write the underlying store first and invalidate
//! afterwards. Eviction never enumerates the whole keyspace: each key is
//! indexed under its domain segment at `put` time, and prefix deletes walk
//! only the owning domain's index.

pub mod invalidator;
pub mod keys;

pub use invalidator::CacheInvalidator;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};

use crate::metrics::Metrics;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct CacheStore {
    entries: Arc<DashMap<String, CacheEntry>>,
    /// Domain segment → keys currently stored under it.
    domain_index: Arc<DashMap<String, HashSet<String>>>,
    metrics: Arc<Metrics>,
}

impl CacheStore {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            domain_index: Arc::new(DashMap::new()),
            metrics,
        }
    }

    /// Typed read. Expired entries count as misses and are dropped lazily.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        // The shard guard must drop before any removal on the same key.
        let lookup = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => None,
            None => return self.miss(),
        };

        let hit = match lookup {
            Some(value) => serde_json::from_value(value).ok(),
            None => {
                self.entries.remove(key);
                self.unindex(key);
                None
            }
        };

        if hit.is_some() {
            self.metrics.record_cache_hit();
            hit
        } else {
            self.miss()
        }
    }

    fn miss<T>(&self) -> Option<T> {
        self.metrics.record_cache_miss();
        None
    }

    /// Store a value under the key's domain with the given TTL.
    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        if let Some(domain) = keys::domain_of(key) {
            self.domain_index
                .entry(domain.to_string())
                .or_default()
                .insert(key.to_string());
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.unindex(key);
        }
        removed
    }

    /// Delete every key under the prefix's domain that starts with the
    /// prefix. Walks only that domain's index, batch by batch.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let Some(domain) = keys::domain_of(prefix) else {
            return 0;
        };
        let matching: Vec<String> = match self.domain_index.get(domain) {
            Some(index) => index
                .iter()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect(),
            None => return 0,
        };
        let mut removed = 0;
        for key in matching {
            if self.delete(&key) {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unindex(&self, key: &str) {
        if let Some(domain) = keys::domain_of(key) {
            if let Some(mut index) = self.domain_index.get_mut(domain) {
                index.remove(key);
            }
        }
    }
}
