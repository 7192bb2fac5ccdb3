//! Optional response cache for aggregated views.
//!
//! # Responsibilities
//! - Serve a recently-built aggregated view without re-fanning out
//! - Expire entries by TTL
//!
//! # Design Decisions
//! - The cache is strictly optional: when disabled the gateway degrades
//!   to no caching, it never fails
//! - Only full successful views are cached; partial views are rebuilt so
//!   recovered dependencies reappear promptly

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use crate::config::schema::CacheConfig;

/// External key-value cache boundary.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&self, key: String, value: Value);
}

/// In-process TTL cache.
pub struct MemoryCache {
    entries: DashMap<String, (Value, Instant)>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => {
                let (value, expires_at) = entry.value();
                if Instant::now() < *expires_at {
                    return Some(value.clone());
                }
                true
            }
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn put(&self, key: String, value: Value) {
        self.entries.insert(key, (value, Instant::now() + self.ttl));
    }
}

/// Build the configured cache, if any.
pub fn from_config(config: &CacheConfig) -> Option<std::sync::Arc<dyn ResponseCache>> {
    if !config.enabled {
        return None;
    }
    Some(std::sync::Arc::new(MemoryCache::new(Duration::from_secs(
        config.ttl_secs,
    ))))
}
