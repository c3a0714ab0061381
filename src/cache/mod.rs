//! Key/value cache for the serialized latest sample.
//!
//! The cache is an accelerator only: a value may be dropped at any time and
//! is rebuilt from the sample store on the next read.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryLatestCache;
pub use self::redis::RedisLatestCache;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

#[async_trait]
pub trait LatestCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Overwrites any existing value; last writer wins.
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn clear(&self, key: &str) -> Result<(), CacheError>;
}
