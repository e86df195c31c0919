//! Short-lived memo of resolved links, keyed by portal and channel

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;
use crate::models::ResolvedStream;

struct CacheEntry {
    stream: ResolvedStream,
    inserted_at: Instant,
}

/// Bounded LRU cache whose entries also expire after a fixed TTL
pub struct LinkCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

pub fn cache_key(portal_id: &str, channel_id: &str) -> String {
    format!("{portal_id}:{channel_id}")
}

impl LinkCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.link_ttl)
    }

    /// Live entry for `key`; an expired entry is removed and reported as a miss
    pub fn get(&self, key: &str) -> Option<ResolvedStream> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.stream.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            debug!("Link cache entry {} expired", key);
        }
        None
    }

    pub fn set(&self, key: &str, stream: ResolvedStream) {
        let mut entries = self.lock();
        if let Some((evicted, _)) = entries.push(
            key.to_string(),
            CacheEntry {
                stream,
                inserted_at: Instant::now(),
            },
        ) {
            if evicted != key {
                debug!("Link cache full, evicted {}", evicted);
            }
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
