use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{SampleStore, StoreError};
use crate::db::models::Sample;

/// In-process store. Samples are kept in insertion order, which is also the
/// `(created_at, id)` order because timestamps are clamped to be non-decreasing.
#[derive(Debug, Default)]
pub struct MemorySampleStore {
    samples: RwLock<Vec<Sample>>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn insert(&self, cpu_percent: f64, ram_percent: f64) -> Result<Sample, StoreError> {
        let mut samples = self.samples.write().await;

        let now = Utc::now();
        let created_at = match samples.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };
        let sample = Sample {
            id: samples.len() as i64 + 1,
            created_at,
            cpu_percent,
            ram_percent,
        };
        samples.push(sample.clone());
        Ok(sample)
    }

    async fn latest(&self) -> Result<Option<Sample>, StoreError> {
        Ok(self.samples.read().await.last().cloned())
    }

    async fn page(&self, offset: u64, limit: u64) -> Result<(Vec<Sample>, u64), StoreError> {
        let samples = self.samples.read().await;
        let total = samples.len();

        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(total);
        let end = start
            .saturating_add(usize::try_from(limit).unwrap_or(usize::MAX))
            .min(total);

        Ok((samples[start..end].to_vec(), total as u64))
    }
}
