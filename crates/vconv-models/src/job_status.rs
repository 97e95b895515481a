//! Conversion job status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a conversion job.
///
/// `Pending -> Processing -> {Completed, PartiallyCompleted, Failed}`.
/// Terminal states are only left through an explicit operator reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for the orchestrator
    #[default]
    Pending,
    /// Conversions and uploads in flight
    Processing,
    /// Every requested format converted and uploaded
    Completed,
    /// At least one format succeeded and at least one failed
    PartiallyCompleted,
    /// No format succeeded, or processing aborted
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::PartiallyCompleted => "partially_completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::PartiallyCompleted | JobStatus::Failed
        )
    }

    /// Check whether the core may move a job from `self` to `next`.
    ///
    /// Failing is allowed from any non-terminal state so that a job that
    /// never reached processing can still be marked failed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            (JobStatus::Processing, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// All statuses, in lifecycle order.
    pub fn all() -> [JobStatus; 5] {
        [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::PartiallyCompleted,
            JobStatus::Failed,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
