//! In-memory job registry.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;
use vconv_models::{ConversionJob, JobId, JobStatus};

use crate::metrics;

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub partially_completed: usize,
    pub failed: usize,
}

impl JobStats {
    fn count(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::PartiallyCompleted => self.partially_completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    pub fn for_status(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::PartiallyCompleted => self.partially_completed,
            JobStatus::Failed => self.failed,
        }
    }
}

/// Concurrency-safe map of job ID to the latest published job record.
///
/// The orchestrator owns the live record while processing and publishes
/// copies here; readers always see a consistent snapshot.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, ConversionJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job. Returns false if the ID is already taken.
    pub async fn insert(&self, job: ConversionJob) -> bool {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return false;
        }
        jobs.insert(job.id.clone(), job);
        true
    }

    pub async fn get(&self, id: &JobId) -> Option<ConversionJob> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Replace the stored copy of `job`.
    pub async fn publish(&self, job: &ConversionJob) {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
    }

    pub async fn remove(&self, id: &JobId) -> Option<ConversionJob> {
        self.jobs.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Counts by status; also refreshes the per-status job gauges.
    pub async fn stats(&self) -> JobStats {
        let mut stats = JobStats::default();
        for job in self.jobs.read().await.values() {
            stats.count(job.status);
        }

        for status in JobStatus::all() {
            metrics::set_jobs_by_status(status, stats.for_status(status));
        }
        stats
    }
}
