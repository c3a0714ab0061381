//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use redis::RedisError;
use sea_orm::DbErr;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::{CacheError, LatestCache};
use crate::db::models::Sample;
use crate::db::sample_store::{MemorySampleStore, SampleStore, StoreError};
use crate::server::probe::{MetricsProbe, ProbeError, UsageReading};

/// Returns a fixed reading, or fails while `failing` is set.
pub struct FlakyProbe {
    reading: UsageReading,
    failing: AtomicBool,
}

impl FlakyProbe {
    pub fn new(cpu_percent: f64, ram_percent: f64) -> Self {
        Self {
            reading: UsageReading {
                cpu_percent,
                ram_percent,
            },
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl MetricsProbe for FlakyProbe {
    fn sample(&self) -> Result<UsageReading, ProbeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProbeError::Unavailable("probe offline".to_string()));
        }
        Ok(self.reading)
    }
}

/// In-memory store that counts reads and can be told to fail.
#[derive(Default)]
pub struct InstrumentedStore {
    inner: MemorySampleStore,
    reads: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `latest`/`page` calls made through the trait.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Total samples held, without touching the read counter.
    pub async fn count(&self) -> u64 {
        self.inner.page(0, 0).await.unwrap().1
    }

    pub async fn seed(&self, cpu_percent: f64, ram_percent: f64) -> Sample {
        self.inner.insert(cpu_percent, ram_percent).await.unwrap()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(DbErr::Custom("read refused".to_string())));
        }
        Ok(())
    }
}

#[async_trait]
impl SampleStore for InstrumentedStore {
    async fn insert(&self, cpu_percent: f64, ram_percent: f64) -> Result<Sample, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(DbErr::Custom("write refused".to_string())));
        }
        self.inner.insert(cpu_percent, ram_percent).await
    }

    async fn latest(&self) -> Result<Option<Sample>, StoreError> {
        self.check_read()?;
        self.inner.latest().await
    }

    async fn page(&self, offset: u64, limit: u64) -> Result<(Vec<Sample>, u64), StoreError> {
        self.check_read()?;
        self.inner.page(offset, limit).await
    }
}

/// Store whose inserts take scripted amounts of tokio time, recording when
/// each insert started and how many ran at once.
pub struct SlowStore {
    inner: MemorySampleStore,
    delays: Mutex<VecDeque<Duration>>,
    started: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowStore {
    /// The n-th insert waits for the n-th delay; inserts past the list are immediate.
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            inner: MemorySampleStore::new(),
            delays: Mutex::new(delays.into_iter().collect()),
            started: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn insert_starts(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn count(&self) -> u64 {
        self.inner.page(0, 0).await.unwrap().1
    }
}

#[async_trait]
impl SampleStore for SlowStore {
    async fn insert(&self, cpu_percent: f64, ram_percent: f64) -> Result<Sample, StoreError> {
        self.started.lock().unwrap().push(Instant::now());
        let delay = self.delays.lock().unwrap().pop_front();

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.inner.insert(cpu_percent, ram_percent).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn latest(&self) -> Result<Option<Sample>, StoreError> {
        self.inner.latest().await
    }

    async fn page(&self, offset: u64, limit: u64) -> Result<(Vec<Sample>, u64), StoreError> {
        self.inner.page(offset, limit).await
    }
}

fn connection_refused() -> CacheError {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
    CacheError::Redis(RedisError::from(io))
}

/// Cache whose backend is always down.
pub struct UnavailableCache;

#[async_trait]
impl LatestCache for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(connection_refused())
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
        Err(connection_refused())
    }

    async fn clear(&self, _key: &str) -> Result<(), CacheError> {
        Err(connection_refused())
    }
}
