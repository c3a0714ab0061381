//! Append-only persistence for usage samples.
//!
//! Two backends implement [`SampleStore`]: an in-process store used in tests and
//! local development, and a PostgreSQL store used in production.

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::Sample;

pub mod memory;
pub mod postgres;

pub use memory::MemorySampleStore;
pub use postgres::PgSampleStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Durable, ordered collection of samples.
///
/// Ordering is ascending by `created_at`, ties broken by `id`.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Appends a new sample; the store assigns `id` and `created_at`.
    async fn insert(&self, cpu_percent: f64, ram_percent: f64) -> Result<Sample, StoreError>;

    /// The most recent sample, or `None` when nothing has been recorded yet.
    async fn latest(&self) -> Result<Option<Sample>, StoreError>;

    /// Up to `limit` samples starting at `offset`, together with the total sample count.
    async fn page(&self, offset: u64, limit: u64) -> Result<(Vec<Sample>, u64), StoreError>;
}
