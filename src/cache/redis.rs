use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::info;

use super::{CacheError, LatestCache};

/// Redis-backed cache shared by every process serving the same store.
///
/// The connection manager re-establishes the connection after Redis restarts,
/// so a dropped link only costs the commands issued while it was down.
#[derive(Clone)]
pub struct RedisLatestCache {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisLatestCache {
    /// Connects to `url` through a reconnecting connection manager. A zero `ttl`
    /// stores values without expiry.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        info!(ttl_seconds = ttl.as_secs(), "Connected to Redis cache.");
        Ok(Self {
            conn,
            ttl_seconds: ttl.as_secs(),
        })
    }
}

#[async_trait]
impl LatestCache for RedisLatestCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        if self.ttl_seconds > 0 {
            let _: () = conn.set_ex(key, value, self.ttl_seconds).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}
