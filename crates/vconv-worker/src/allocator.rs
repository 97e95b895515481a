//! Adaptive worker allocation.

use serde::Serialize;
use tracing::debug;
use vconv_models::{ContentType, MediaProfile, OutputFormat};

const MEMORY_RESERVE_FLOOR_MB: u64 = 1024;

/// Absolute per-job worker ceiling. Configuration can lower it, never raise it.
pub const HARD_MAX_WORKERS: usize = 8;

/// Live system load as seen by the allocator.
///
/// Percentages are on a 0-100 scale. A zero `total_memory_mb` means memory
/// figures are unknown and the memory ceiling is skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SystemLoad {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub available_memory_mb: u64,
    pub total_memory_mb: u64,
}

/// Computes a bounded worker count for one job.
#[derive(Debug, Clone)]
pub struct WorkerAllocator {
    cpu_count: usize,
    max_workers: usize,
    hard_cap: usize,
}

impl WorkerAllocator {
    /// * `cpu_count` - logical CPUs on the host
    /// * `max_workers` - configured ceiling before load scaling
    /// * `hard_cap` - absolute ceiling regardless of the formula, clamped
    ///   to [`HARD_MAX_WORKERS`]
    pub fn new(cpu_count: usize, max_workers: usize, hard_cap: usize) -> Self {
        Self {
            cpu_count: cpu_count.max(1),
            max_workers: max_workers.max(1),
            hard_cap: hard_cap.clamp(1, HARD_MAX_WORKERS),
        }
    }

    pub fn hard_cap(&self) -> usize {
        self.hard_cap
    }

    /// Worker count for a job converting to `formats`.
    ///
    /// Always in `1..=hard_cap`.
    pub fn allocate(
        &self,
        formats: &[OutputFormat],
        profile: Option<&MediaProfile>,
        load: &SystemLoad,
    ) -> usize {
        let base = self.cpu_count.min(self.max_workers) as f64;
        let heavy = formats.iter().any(OutputFormat::is_cpu_intensive);

        let (complexity, content) = match profile {
            Some(p) => (p.complexity_factor, content_factor(p.content_type)),
            None => (1.0, 1.0),
        };
        let format_weight = if heavy { 1.2 } else { 1.0 };

        let scaled = base
            * load_factor(load)
            * format_count_factor(formats.len())
            * complexity
            * content
            * format_weight;

        let mut workers = if scaled.is_finite() {
            scaled.round().max(0.0) as usize
        } else {
            1
        };

        if let Some(ceiling) = self.memory_ceiling(formats, profile, load) {
            workers = workers.min(ceiling);
        }

        let workers = workers.clamp(1, self.hard_cap);

        debug!(
            base,
            cpu_percent = load.cpu_percent,
            memory_percent = load.memory_percent,
            complexity,
            workers,
            "Allocated workers"
        );

        workers
    }

    /// Workers that fit in available memory after the reserve, or `None`
    /// when memory figures are unknown.
    pub fn memory_ceiling(
        &self,
        formats: &[OutputFormat],
        profile: Option<&MediaProfile>,
        load: &SystemLoad,
    ) -> Option<usize> {
        if load.total_memory_mb == 0 {
            return None;
        }

        let reserve = MEMORY_RESERVE_FLOOR_MB.max(load.total_memory_mb / 10);
        let usable = load.available_memory_mb.saturating_sub(reserve);
        let per_worker = per_worker_memory_mb(formats, profile);

        Some(((usable / per_worker) as usize).max(1))
    }
}

/// Estimated resident memory of one conversion worker.
pub fn per_worker_memory_mb(formats: &[OutputFormat], profile: Option<&MediaProfile>) -> u64 {
    let pixels = profile.map(MediaProfile::pixels).unwrap_or(0);
    let base = if pixels > 3840 * 2160 {
        1500
    } else if pixels > 1920 * 1080 {
        1000
    } else if pixels > 1280 * 720 {
        750
    } else {
        500
    };

    if formats.iter().any(OutputFormat::is_cpu_intensive) {
        base * 6 / 5
    } else {
        base
    }
}

fn load_factor(load: &SystemLoad) -> f64 {
    let peak = load.cpu_percent.max(load.memory_percent);
    if peak >= 90.0 {
        0.4
    } else if peak >= 80.0 {
        0.6
    } else if peak >= 70.0 {
        0.7
    } else if peak >= 60.0 {
        0.8
    } else {
        1.0
    }
}

fn format_count_factor(count: usize) -> f64 {
    match count {
        0 | 1 => 0.8,
        2 => 0.9,
        3 => 1.0,
        _ => 1.1,
    }
}

fn content_factor(content_type: ContentType) -> f64 {
    match content_type {
        ContentType::Animation => 1.2,
        ContentType::Gaming => 1.1,
        ContentType::Screencast => 0.9,
        ContentType::Film | ContentType::General => 1.0,
    }
}
