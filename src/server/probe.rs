use std::sync::Mutex;
use sysinfo::System;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Metrics probe unavailable: {0}")]
    Unavailable(String),
    #[error("Metrics probe task failed: {0}")]
    Task(String),
}

/// CPU and memory load of the host, both in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageReading {
    pub cpu_percent: f64,
    pub ram_percent: f64,
}

/// Synchronous source of host utilization readings.
pub trait MetricsProbe: Send + Sync {
    fn sample(&self) -> Result<UsageReading, ProbeError>;
}

/// Reads global CPU usage and memory load through `sysinfo`.
///
/// CPU usage is computed from the delta between two refreshes, so the probe
/// keeps its `System` between calls and primes it on construction.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProbe for SysinfoProbe {
    fn sample(&self) -> Result<UsageReading, ProbeError> {
        let mut sys = self
            .system
            .lock()
            .map_err(|_| ProbeError::Unavailable("system handle poisoned".to_string()))?;

        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let mem_total = sys.total_memory();
        if mem_total == 0 {
            return Err(ProbeError::Unavailable(
                "total memory reported as zero".to_string(),
            ));
        }

        let reading = UsageReading {
            cpu_percent: f64::from(sys.global_cpu_usage()),
            ram_percent: sys.used_memory() as f64 / mem_total as f64 * 100.0,
        };
        debug!(cpu = reading.cpu_percent, ram = reading.ram_percent, "Probe reading.");
        Ok(reading)
    }
}
