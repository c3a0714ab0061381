use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{CacheError, LatestCache};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Process-local cache with an optional time-to-live per entry.
#[derive(Debug, Default)]
pub struct MemoryLatestCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Option<Duration>,
}

impl MemoryLatestCache {
    /// A zero `ttl` keeps entries until they are overwritten or cleared.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: (!ttl.is_zero()).then_some(ttl),
        }
    }
}

#[async_trait]
impl LatestCache for MemoryLatestCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let entry = CacheEntry {
            value: value.to_owned(),
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
