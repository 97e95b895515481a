//! Application state.

use std::sync::Arc;

use vconv_media::{FfmpegTranscoder, Transcoder};
use vconv_storage::{ObjectStorage, R2Client};
use vconv_worker::{
    CircuitBreakerRegistry, JobOrchestrator, JobRegistry, ResourceSampler, SysinfoSampler, WorkerConfig,
};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: Arc<JobRegistry>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl AppState {
    /// Create application state from the environment: R2 storage, the
    /// ffmpeg transcoder and the host resource sampler.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let worker_config = WorkerConfig::from_env();
        tokio::fs::create_dir_all(&worker_config.temp_dir).await?;

        let storage = R2Client::from_env()?;
        let transcoder = FfmpegTranscoder::new().with_output_dir(worker_config.temp_dir.clone());
        let breakers = CircuitBreakerRegistry::from_env(worker_config.circuit_breaker.clone());

        Ok(Self::from_parts(
            config,
            worker_config,
            Arc::new(transcoder),
            Arc::new(storage),
            Arc::new(breakers),
            Arc::new(SysinfoSampler::new()),
        ))
    }

    /// Assemble state from explicit collaborators.
    pub fn from_parts(
        config: ApiConfig,
        worker_config: WorkerConfig,
        transcoder: Arc<dyn Transcoder>,
        storage: Arc<dyn ObjectStorage>,
        breakers: Arc<CircuitBreakerRegistry>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let orchestrator = Arc::new(JobOrchestrator::new(
            worker_config,
            transcoder,
            Arc::clone(&storage),
            &breakers,
            sampler,
            Arc::clone(&registry),
        ));

        Self {
            config,
            registry,
            orchestrator,
            breakers,
            storage,
        }
    }
}
