//! Worker metrics.
//!
//! Emitted through the `metrics` facade; the API process installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use metrics::{counter, gauge, histogram};
use vconv_models::{JobStatus, OutputFormat};

/// Metric names as constants for consistency.
pub mod names {
    // Job metrics
    pub const JOBS_STARTED_TOTAL: &str = "vconv_jobs_started_total";
    pub const JOBS_FINISHED_TOTAL: &str = "vconv_jobs_finished_total";
    pub const JOB_DURATION_SECONDS: &str = "vconv_job_duration_seconds";
    pub const JOBS_BY_STATUS: &str = "vconv_jobs";

    // Conversion metrics
    pub const CONVERSION_DURATION_SECONDS: &str = "vconv_conversion_duration_seconds";
    pub const CONVERSION_FAILURES_TOTAL: &str = "vconv_conversion_failures_total";
    pub const WORKER_POOL_SIZE: &str = "vconv_worker_pool_size";

    // Upload metrics
    pub const UPLOAD_ATTEMPTS_TOTAL: &str = "vconv_upload_attempts_total";
    pub const UPLOAD_RETRIES_TOTAL: &str = "vconv_upload_retries_total";
    pub const UPLOAD_DURATION_SECONDS: &str = "vconv_upload_duration_seconds";

    // Circuit breaker metrics
    pub const CIRCUIT_BREAKER_TRIPS_TOTAL: &str = "vconv_circuit_breaker_trips_total";
    pub const CIRCUIT_BREAKER_REJECTIONS_TOTAL: &str = "vconv_circuit_breaker_rejections_total";
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

/// Record a job reaching a terminal status.
pub fn record_job_finished(status: JobStatus, duration_secs: f64) {
    let labels = [("status", status.as_str().to_string())];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Update the gauge of registry jobs in `status`.
pub fn set_jobs_by_status(status: JobStatus, count: usize) {
    let labels = [("status", status.as_str().to_string())];
    gauge!(names::JOBS_BY_STATUS, &labels).set(count as f64);
}

pub fn record_conversion_duration(format: OutputFormat, duration_secs: f64) {
    let labels = [("format", format.as_str().to_string())];
    histogram!(names::CONVERSION_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a failed conversion; `reason` is the error category.
pub fn record_conversion_failure(format: OutputFormat, reason: &str) {
    let labels = [
        ("format", format.as_str().to_string()),
        ("reason", reason.to_string()),
    ];
    counter!(names::CONVERSION_FAILURES_TOTAL, &labels).increment(1);
}

pub fn set_worker_pool_size(size: usize) {
    gauge!(names::WORKER_POOL_SIZE).set(size as f64);
}

pub fn record_upload_attempt() {
    counter!(names::UPLOAD_ATTEMPTS_TOTAL).increment(1);
}

pub fn record_upload_retry() {
    counter!(names::UPLOAD_RETRIES_TOTAL).increment(1);
}

pub fn record_upload_duration(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_breaker_trip(name: &str) {
    let labels = [("dependency", name.to_string())];
    counter!(names::CIRCUIT_BREAKER_TRIPS_TOTAL, &labels).increment(1);
}

pub fn record_breaker_rejection(name: &str) {
    let labels = [("dependency", name.to_string())];
    counter!(names::CIRCUIT_BREAKER_REJECTIONS_TOTAL, &labels).increment(1);
}
