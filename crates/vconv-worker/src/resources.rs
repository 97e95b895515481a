//! Host resource sampling.

use async_trait::async_trait;
use serde::Serialize;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::sync::Mutex;

use vconv_models::SystemSnapshot;

use crate::allocator::SystemLoad;
use crate::error::WorkerResult;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// One CPU/memory reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceSample {
    /// Global CPU usage, 0-100
    pub cpu_percent: f64,
    /// Used memory share, 0-100
    pub memory_percent: f64,
    pub available_memory_mb: u64,
    pub total_memory_mb: u64,
    pub cpu_count: usize,
}

impl ResourceSample {
    pub fn to_load(&self) -> SystemLoad {
        SystemLoad {
            cpu_percent: self.cpu_percent,
            memory_percent: self.memory_percent,
            available_memory_mb: self.available_memory_mb,
            total_memory_mb: self.total_memory_mb,
        }
    }

    /// Snapshot recorded in failed jobs' error contexts.
    pub fn to_snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            cpu_count: self.cpu_count,
            memory_available_gb: self.available_memory_mb as f64 / 1024.0,
            cpu_percent: self.cpu_percent,
        }
    }
}

/// Source of CPU/memory readings.
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn sample(&self) -> WorkerResult<ResourceSample>;
}

/// [`ResourceSampler`] reading the host through `sysinfo`.
pub struct SysinfoSampler {
    system: Mutex<System>,
    primed: std::sync::atomic::AtomicBool,
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(system),
            primed: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ResourceSampler for SysinfoSampler {
    async fn sample(&self) -> WorkerResult<ResourceSample> {
        let mut system = self.system.lock().await;

        // CPU usage is a delta between two refreshes.
        if !self.primed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            system.refresh_cpu_all();
            tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        }

        system.refresh_cpu_all();
        system.refresh_memory();

        let total = system.total_memory();
        let used = system.used_memory();
        let memory_percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let cpu_count = match system.cpus().len() {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            n => n,
        };

        Ok(ResourceSample {
            cpu_percent: system.global_cpu_usage() as f64,
            memory_percent,
            available_memory_mb: system.available_memory() / BYTES_PER_MB,
            total_memory_mb: total / BYTES_PER_MB,
            cpu_count,
        })
    }
}
