//! Best-effort key/value cache.
//!
//! The cache only ever accelerates reads. Every value in it can be rebuilt
//! from the store or upstream, so misses, expiry and eviction are never
//! errors.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::config::CacheConfig;

/// Cache key for an account's profile.
#[must_use]
pub fn profile_key(handle: &str) -> String {
    format!("USER.{handle}")
}

/// A best-effort string cache.
pub trait Cache {
    /// Fetch a live entry.
    fn get(&self, key: &str) -> Option<String>;

    /// Store an entry, replacing any previous value.
    fn set(&self, key: &str, value: String);

    /// Drop an entry if present.
    fn remove(&self, key: &str);
}

/// Build the cache described by the configuration.
#[must_use]
pub fn from_config(config: &CacheConfig) -> Box<dyn Cache> {
    if config.enabled {
        Box::new(MemoryCache::new(
            Duration::from_secs(config.ttl_secs),
            config.capacity,
        ))
    } else {
        Box::new(NoopCache)
    }
}

struct Entry {
    value: String,
    expires: Instant,
}

/// In-process cache with a fixed TTL and entry cap.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    capacity: usize,
}

impl MemoryCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Number of entries currently held (live or not yet swept).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                trace!(key, "Cache entry expired");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: String) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.len() >= self.capacity && !entries.contains_key(key) {
            entries.retain(|_, e| e.expires > now);
            if entries.len() >= self.capacity {
                // evict whatever expires soonest
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires)
                    .map(|(k, _)| k.clone())
                {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires: now + self.ttl,
            },
        );
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// A cache that never holds anything.
pub struct NoopCache;

impl Cache for NoopCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: String) {}

    fn remove(&self, _key: &str) {}
}
