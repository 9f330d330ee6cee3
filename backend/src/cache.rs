//! Time-bounded response cache keyed by canonical chat requests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use pixeldesk_common::ChatResponse;

/// A cached response with its creation time.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: ChatResponse,
    pub created_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() < ttl
    }
}

/// Response cache shared by the handler and the batch queue.
///
/// Entries expire after a fixed TTL. Expired entries are never returned;
/// they are dropped lazily on lookup or by [`ResponseCache::sweep`].
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh entry.
    pub async fn get(&self, key: &str) -> Option<ChatResponse> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_fresh(self.ttl) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Stale: drop it unless another writer refreshed it meanwhile.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_fresh(self.ttl)) {
            entries.remove(key);
        }
        None
    }

    pub async fn set(&self, key: String, value: ChatResponse) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
    }

    /// Remove every expired entry. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(self.ttl));
        before - entries.len()
    }

    /// Drop everything. Returns the number of entries removed.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
