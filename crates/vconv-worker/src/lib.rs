//! Conversion job orchestration core.
//!
//! This crate provides:
//! - Circuit breakers with a shared per-dependency registry
//! - Content-type and complexity estimation from media profiles
//! - Adaptive worker allocation and a resizable worker pool
//! - A background resource monitor that resizes the pool mid-job
//! - A retrying uploader guarded by the storage circuit breaker
//! - The job orchestrator and the in-memory job registry

pub mod allocator;
pub mod circuit_breaker;
pub mod complexity;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod planning;
pub mod pool;
pub mod registry;
pub mod resources;
pub mod retry;

pub use allocator::{SystemLoad, WorkerAllocator};
pub use circuit_breaker::{
    CallError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerRegistry,
    CircuitBreakerSnapshot, CircuitState,
};
pub use complexity::ComplexityEstimator;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use monitor::{MonitorPolicy, ResourceMonitor};
pub use orchestrator::JobOrchestrator;
pub use planning::{conversion_timeout, prioritize_formats};
pub use pool::{PoolPermit, WorkerPool};
pub use registry::{JobRegistry, JobStats};
pub use resources::{ResourceSample, ResourceSampler, SysinfoSampler};
pub use retry::{RetryConfig, RetryingUploader};
