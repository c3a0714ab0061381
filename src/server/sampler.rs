use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::LatestCache;
use crate::db::models::{Sample, SampleJson};
use crate::db::sample_store::{SampleStore, StoreError};
use crate::server::probe::{MetricsProbe, ProbeError};

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Failed to read host metrics: {0}")]
    Probe(#[from] ProbeError),
    #[error("Failed to persist sample: {0}")]
    StoreWrite(#[source] StoreError),
}

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub cache_key: String,
    pub tick_interval: Duration,
}

/// Periodic job that records one sample per tick and keeps the latest-sample cache warm.
pub struct Sampler {
    probe: Arc<dyn MetricsProbe>,
    store: Arc<dyn SampleStore>,
    cache: Arc<dyn LatestCache>,
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(
        probe: Arc<dyn MetricsProbe>,
        store: Arc<dyn SampleStore>,
        cache: Arc<dyn LatestCache>,
        config: SamplerConfig,
    ) -> Self {
        Self {
            probe,
            store,
            cache,
            config,
        }
    }

    /// Reads the probe, persists a new sample and refreshes the cache.
    ///
    /// Nothing is written when the probe or the insert fails. A failed cache
    /// write is logged only, since the sample is already persisted.
    pub async fn run_tick(&self) -> Result<Sample, SamplerError> {
        let probe = self.probe.clone();
        let reading = tokio::task::spawn_blocking(move || probe.sample())
            .await
            .map_err(|e| ProbeError::Task(e.to_string()))??;

        let sample = self
            .store
            .insert(reading.cpu_percent, reading.ram_percent)
            .await
            .map_err(SamplerError::StoreWrite)?;

        match SampleJson::encode(&sample) {
            Ok(json) => {
                if let Err(e) = self.cache.set(&self.config.cache_key, json.as_str()).await {
                    warn!(sample_id = sample.id, error = %e, "Failed to refresh latest-sample cache.");
                }
            }
            Err(e) => {
                warn!(sample_id = sample.id, error = %e, "Failed to serialize sample for cache.");
            }
        }

        Ok(sample)
    }

    /// Runs ticks until `shutdown` is cancelled.
    ///
    /// Tick bodies run one after another on this task, and ticks missed while a
    /// slow tick was running are skipped, so ticks never overlap. Cancellation is
    /// only observed between ticks.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_seconds = self.config.tick_interval.as_secs_f64(),
            "Sampler started."
        );
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            debug!("Running sampler tick...");
            match self.run_tick().await {
                Ok(sample) => info!(sample_id = sample.id, %sample, "Recorded usage sample."),
                Err(e) => error!(error = %e, "Sampler tick failed."),
            }
        }

        info!("Sampler stopped.");
    }

    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryLatestCache;
    use crate::test_support::{FlakyProbe, InstrumentedStore, SlowStore, UnavailableCache};

    const KEY: &str = "last_sample";

    fn config(tick_interval: Duration) -> SamplerConfig {
        SamplerConfig {
            cache_key: KEY.to_string(),
            tick_interval,
        }
    }

    fn sampler(
        probe: Arc<FlakyProbe>,
        store: Arc<InstrumentedStore>,
        cache: Arc<dyn LatestCache>,
    ) -> Sampler {
        Sampler::new(probe, store, cache, config(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_tick_persists_and_caches() {
        let probe = Arc::new(FlakyProbe::new(12.5, 48.0));
        let store = Arc::new(InstrumentedStore::new());
        let cache = Arc::new(MemoryLatestCache::new(Duration::ZERO));
        let sampler = sampler(probe, store.clone(), cache.clone());

        let sample = sampler.run_tick().await.unwrap();
        assert_eq!(sample.cpu_percent, 12.5);
        assert_eq!(sample.ram_percent, 48.0);
        assert_eq!(store.count().await, 1);

        let cached = cache.get(KEY).await.unwrap().unwrap();
        assert_eq!(SampleJson::from_cached(cached).decode().unwrap(), sample);
    }

    #[tokio::test]
    async fn test_identical_readings_yield_distinct_samples() {
        let probe = Arc::new(FlakyProbe::new(30.0, 30.0));
        let store = Arc::new(InstrumentedStore::new());
        let cache = Arc::new(MemoryLatestCache::new(Duration::ZERO));
        let sampler = sampler(probe, store.clone(), cache);

        let first = sampler.run_tick().await.unwrap();
        let second = sampler.run_tick().await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn test_probe_failure_skips_tick() {
        let probe = Arc::new(FlakyProbe::new(1.0, 2.0));
        let store = Arc::new(InstrumentedStore::new());
        let cache = Arc::new(MemoryLatestCache::new(Duration::ZERO));
        let sampler = sampler(probe.clone(), store.clone(), cache.clone());

        probe.set_failing(true);
        let err = sampler.run_tick().await.unwrap_err();
        assert!(matches!(err, SamplerError::Probe(_)));
        assert_eq!(store.count().await, 0);
        assert_eq!(cache.get(KEY).await.unwrap(), None);

        probe.set_failing(false);
        sampler.run_tick().await.unwrap();
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_store_failure_skips_tick() {
        let probe = Arc::new(FlakyProbe::new(1.0, 2.0));
        let store = Arc::new(InstrumentedStore::new());
        let cache = Arc::new(MemoryLatestCache::new(Duration::ZERO));
        let sampler = sampler(probe, store.clone(), cache.clone());

        store.set_fail_writes(true);
        let err = sampler.run_tick().await.unwrap_err();
        assert!(matches!(err, SamplerError::StoreWrite(_)));
        assert_eq!(store.count().await, 0);
        assert_eq!(cache.get(KEY).await.unwrap(), None);

        store.set_fail_writes(false);
        sampler.run_tick().await.unwrap();
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_cache_failure_does_not_fail_tick() {
        let probe = Arc::new(FlakyProbe::new(1.0, 2.0));
        let store = Arc::new(InstrumentedStore::new());
        let sampler = sampler(probe, store.clone(), Arc::new(UnavailableCache));

        sampler.run_tick().await.unwrap();
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_run_survives_failures_and_stops_on_cancel() {
        let probe = Arc::new(FlakyProbe::new(5.0, 6.0));
        let store = Arc::new(InstrumentedStore::new());
        let cache = Arc::new(MemoryLatestCache::new(Duration::ZERO));
        let sampler = Arc::new(Sampler::new(
            probe.clone(),
            store.clone(),
            cache,
            config(Duration::from_millis(20)),
        ));

        probe.set_failing(true);
        let shutdown = CancellationToken::new();
        let handle = sampler.spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(store.count().await, 0);

        probe.set_failing(false);
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.count().await < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sampler kept ticking after probe recovered");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sampler stopped after cancellation")
            .unwrap();

        let stopped_at = store.count().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.count().await, stopped_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tick_never_overlaps_and_missed_ticks_are_skipped() {
        // Interval 10s; the first insert takes 55s, later inserts are instant.
        let store = Arc::new(SlowStore::new([Duration::from_secs(55)]));
        let sampler = Arc::new(Sampler::new(
            Arc::new(FlakyProbe::new(1.0, 2.0)),
            store.clone(),
            Arc::new(MemoryLatestCache::new(Duration::ZERO)),
            config(Duration::from_secs(10)),
        ));

        let started_at = tokio::time::Instant::now();
        let shutdown = CancellationToken::new();
        let handle = sampler.spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(62)).await;

        // One late tick fires when the slow one finishes, then the schedule
        // realigns to the 10s grid; the five missed deadlines are not replayed.
        let offsets: Vec<u64> = store
            .insert_starts()
            .iter()
            .map(|at| (*at - started_at).as_secs())
            .collect();
        assert_eq!(offsets, vec![0, 55, 60]);
        assert_eq!(store.max_in_flight(), 1);
        assert_eq!(store.count().await, 3);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_lets_in_flight_tick_finish() {
        let store = Arc::new(SlowStore::new([Duration::from_secs(30)]));
        let cache = Arc::new(MemoryLatestCache::new(Duration::ZERO));
        let sampler = Arc::new(Sampler::new(
            Arc::new(FlakyProbe::new(7.0, 8.0)),
            store.clone(),
            cache.clone(),
            config(Duration::from_secs(60)),
        ));

        let started_at = tokio::time::Instant::now();
        let shutdown = CancellationToken::new();
        let handle = sampler.spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.insert_starts().len(), 1);
        assert_eq!(store.count().await, 0);

        shutdown.cancel();
        handle.await.unwrap();

        assert!(started_at.elapsed() >= Duration::from_secs(30));
        assert_eq!(store.count().await, 1);
        assert_eq!(store.insert_starts().len(), 1);
        let cached = cache.get(KEY).await.unwrap().unwrap();
        assert_eq!(SampleJson::from_cached(cached).decode().unwrap().cpu_percent, 7.0);
    }
}
