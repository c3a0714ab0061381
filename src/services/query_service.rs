use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::LatestCache;
use crate::db::models::{Sample, SampleJson};
use crate::db::sample_store::{SampleStore, StoreError};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Failed to read samples: {0}")]
    StoreRead(#[from] StoreError),
    #[error("Failed to serialize sample: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("limit must be greater than zero")]
    InvalidLimit,
    #[error("offset must not exceed {}", MAX_OFFSET)]
    InvalidOffset,
}

/// Largest offset the stores accept; SQL `OFFSET` is a signed 64-bit value.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub cache_key: String,
    pub page_size: u64,
    pub max_page_size: u64,
}

/// Position of a neighbouring page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRef {
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub struct SamplePage {
    pub count: u64,
    pub next: Option<PageRef>,
    pub previous: Option<PageRef>,
    pub results: Vec<Sample>,
}

pub struct QueryService {
    store: Arc<dyn SampleStore>,
    cache: Arc<dyn LatestCache>,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn SampleStore>,
        cache: Arc<dyn LatestCache>,
        config: QueryConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Returns the most recent sample, or `None` when no sample exists yet.
    ///
    /// Cache-aside: a cached value is returned as-is. On a miss the store is
    /// queried and the result written back. Cache errors count as misses.
    /// A reader may write back a sample that a concurrent tick has already
    /// superseded; the next tick overwrites it.
    pub async fn get_latest(&self) -> Result<Option<SampleJson>, QueryError> {
        let key = self.config.cache_key.as_str();

        match self.cache.get(key).await {
            Ok(Some(cached)) => {
                debug!(cache_key = key, "Latest sample served from cache.");
                return Ok(Some(SampleJson::from_cached(cached)));
            }
            Ok(None) => debug!(cache_key = key, "Latest sample cache miss."),
            Err(e) => warn!(cache_key = key, error = %e, "Cache read failed, falling back to store."),
        }

        let Some(sample) = self.store.latest().await? else {
            return Ok(None);
        };

        let json = SampleJson::encode(&sample)?;
        if let Err(e) = self.cache.set(key, json.as_str()).await {
            warn!(cache_key = key, error = %e, "Failed to populate latest-sample cache.");
        }
        Ok(Some(json))
    }

    /// One page of samples in ascending `created_at` order.
    ///
    /// `limit` defaults to the configured page size and is capped at `max_page_size`.
    pub async fn list_samples(
        &self,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<SamplePage, QueryError> {
        if offset > MAX_OFFSET {
            return Err(QueryError::InvalidOffset);
        }
        let limit = match limit {
            Some(0) => return Err(QueryError::InvalidLimit),
            Some(limit) => limit.min(self.config.max_page_size),
            None => self.config.page_size,
        };

        let (results, count) = self.store.page(offset, limit).await?;

        let next_offset = offset.saturating_add(limit);
        let next = (next_offset < count).then_some(PageRef {
            offset: next_offset,
            limit,
        });
        let previous = (offset > 0).then(|| PageRef {
            offset: offset.saturating_sub(limit),
            limit,
        });

        Ok(SamplePage {
            count,
            next,
            previous,
            results,
        })
    }
}
