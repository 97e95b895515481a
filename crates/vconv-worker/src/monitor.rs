//! Background resource monitor.
//!
//! Samples CPU and memory while a job's conversions run and resizes the job's
//! worker pool from the rolling-average trend.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::pool::WorkerPool;
use crate::resources::{ResourceSample, ResourceSampler};

/// Thresholds and pacing for [`ResourceMonitor`].
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorPolicy {
    /// Time between samples
    pub interval: Duration,
    /// Samples averaged into the trend
    pub history_size: usize,
    /// Trend at or above which the pool shrinks by 40%
    pub critical_percent: f64,
    /// Trend at or above which the pool shrinks by 20%
    pub warning_percent: f64,
    /// CPU trend below which the pool may grow
    pub low_cpu_percent: f64,
    /// Memory trend below which the pool may grow
    pub low_memory_percent: f64,
    /// Samples skipped after any resize
    pub cooldown_cycles: usize,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            history_size: 3,
            critical_percent: 90.0,
            warning_percent: 80.0,
            low_cpu_percent: 50.0,
            low_memory_percent: 60.0,
            cooldown_cycles: 2,
        }
    }
}

pub struct ResourceMonitor {
    sampler: Arc<dyn ResourceSampler>,
    pool: WorkerPool,
    policy: MonitorPolicy,
    history: VecDeque<(f64, f64)>,
    cooldown: usize,
}

impl ResourceMonitor {
    pub fn new(sampler: Arc<dyn ResourceSampler>, pool: WorkerPool, policy: MonitorPolicy) -> Self {
        let history = VecDeque::with_capacity(policy.history_size.max(1));
        Self {
            sampler,
            pool,
            policy,
            history,
            cooldown: 0,
        }
    }

    /// Feed one sample; returns the new pool limit if it was changed.
    pub fn observe(&mut self, sample: &ResourceSample) -> Option<usize> {
        let window = self.policy.history_size.max(1);
        if self.history.len() == window {
            self.history.pop_front();
        }
        self.history.push_back((sample.cpu_percent, sample.memory_percent));

        if self.cooldown > 0 {
            self.cooldown -= 1;
            return None;
        }

        let count = self.history.len() as f64;
        let cpu = self.history.iter().map(|(c, _)| c).sum::<f64>() / count;
        let memory = self.history.iter().map(|(_, m)| m).sum::<f64>() / count;
        let trend = cpu.max(memory);

        let current = self.pool.limit();
        let proposed = if trend >= self.policy.critical_percent {
            (current as f64 * 0.6).floor() as usize
        } else if trend >= self.policy.warning_percent {
            (current as f64 * 0.8).floor() as usize
        } else if cpu < self.policy.low_cpu_percent
            && memory < self.policy.low_memory_percent
            && self.history.len() == window
            && current < self.pool.initial()
        {
            current + 1
        } else {
            current
        };
        let target = proposed.clamp(1, self.pool.initial());

        if target == current {
            return None;
        }

        let resized = self.pool.resize(target);
        self.cooldown = self.policy.cooldown_cycles;
        info!(
            cpu_percent = cpu,
            memory_percent = memory,
            from = current,
            to = resized,
            "Adjusted worker pool to resource trend"
        );
        Some(resized)
    }

    /// Sample until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        debug!(interval = ?self.policy.interval, "Resource monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.policy.interval) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            match self.sampler.sample().await {
                Ok(sample) => {
                    self.observe(&sample);
                }
                Err(e) => warn!("Resource sampling failed: {}", e),
            }
        }

        debug!("Resource monitor stopped");
    }
}
