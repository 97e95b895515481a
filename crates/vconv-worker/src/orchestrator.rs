//! Conversion job orchestration.
//!
//! [`JobOrchestrator::process_job`] drives one job from PENDING to a terminal
//! status:
//! 1. probe the source and classify it
//! 2. size a worker pool from live load and start the resource monitor
//! 3. dispatch one conversion per format, most expensive first, each under
//!    its own timeout
//! 4. upload every converted output through the retrying uploader
//! 5. delete temporary files and reconcile per-format outcomes
//!
//! Per-format failures are collected as values and never fail siblings.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn, Instrument};

use vconv_media::{select_params, Transcoder};
use vconv_models::{ConversionJob, EncodingParams, ErrorContext, MediaProfile, OutputFormat};
use vconv_storage::{object_key_for, ObjectStorage};

use crate::allocator::WorkerAllocator;
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::complexity::ComplexityEstimator;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::monitor::ResourceMonitor;
use crate::planning::{conversion_timeout, prioritize_formats};
use crate::pool::WorkerPool;
use crate::registry::JobRegistry;
use crate::resources::{ResourceSample, ResourceSampler};
use crate::retry::RetryingUploader;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

type ConversionOutcome = (OutputFormat, WorkerResult<PathBuf>);

/// Runs conversion jobs end to end.
pub struct JobOrchestrator {
    transcoder: Arc<dyn Transcoder>,
    uploader: RetryingUploader,
    sampler: Arc<dyn ResourceSampler>,
    registry: Arc<JobRegistry>,
    estimator: ComplexityEstimator,
    config: WorkerConfig,
}

impl JobOrchestrator {
    /// The uploader is guarded by the breaker registered under
    /// `config.storage_dependency`.
    pub fn new(
        config: WorkerConfig,
        transcoder: Arc<dyn Transcoder>,
        storage: Arc<dyn ObjectStorage>,
        breakers: &CircuitBreakerRegistry,
        sampler: Arc<dyn ResourceSampler>,
        registry: Arc<JobRegistry>,
    ) -> Self {
        let breaker = breakers.get_or_create(&config.storage_dependency);
        let uploader = RetryingUploader::new(storage, breaker, config.upload_retry.clone());

        Self {
            transcoder,
            uploader,
            sampler,
            registry,
            estimator: ComplexityEstimator::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process `job` in the background. The job should already be
    /// registered; its record is published as it progresses.
    pub fn spawn(self: &Arc<Self>, mut job: ConversionJob) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let span = JobLogger::new(&job.id, "conversion").create_span();

        tokio::spawn(
            async move {
                orchestrator.process_job(&mut job).await;
            }
            .instrument(span),
        )
    }

    /// Drive `job` to a terminal status. Never returns an error: every
    /// outcome is recorded on the job and published to the registry.
    pub async fn process_job(&self, job: &mut ConversionJob) {
        let logger = JobLogger::new(&job.id, "conversion");

        if let Err(e) = job.start() {
            logger.log_error(&format!("Cannot start job: {}", e));
            return;
        }
        self.registry.publish(job).await;
        metrics::record_job_started();
        logger.log_start(&format!(
            "{} -> {}",
            job.original_filename,
            format_list(&job.formats)
        ));

        let mut profile = None;
        if let Err(e) = self.run_pipeline(job, &mut profile, &logger).await {
            self.handle_failure(job, e, profile.as_ref(), &logger).await;
        }

        self.registry.publish(job).await;
        metrics::record_job_finished(job.status, job.processing_time_secs());
        logger.log_completion(&format!(
            "status={} converted={} failed={} in {:.1}s",
            job.status,
            job.converted_files.len(),
            job.failed_formats.len(),
            job.processing_time_secs()
        ));
    }

    async fn run_pipeline(
        &self,
        job: &mut ConversionJob,
        profile_slot: &mut Option<MediaProfile>,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let size_mb = tokio::fs::metadata(&job.source_path).await?.len() as f64 / BYTES_PER_MB;
        job.original_size_mb = Some(size_mb);

        let profile = self.probe(&job.source_path, logger).await;
        *profile_slot = profile.clone();

        let sample = self.sample(logger).await;
        let cpu_count = sample.map(|s| s.cpu_count).unwrap_or_else(host_cpu_count);
        let load = sample.map(|s| s.to_load()).unwrap_or_default();

        let thread_budget = cpu_count.min(self.config.ffmpeg_threads);
        let ordered = prioritize_formats(&job.formats);
        let plan: Vec<(OutputFormat, EncodingParams)> = ordered
            .iter()
            .map(|&format| {
                let params = select_params(
                    format,
                    job.optimize_level,
                    job.preserve_audio,
                    profile.as_ref(),
                    thread_budget,
                );
                (format, params)
            })
            .collect();

        let allocator = WorkerAllocator::new(cpu_count, self.config.max_workers, self.config.hard_max_workers);
        let workers = allocator.allocate(&ordered, profile.as_ref(), &load);
        logger.log_progress(&format!(
            "{:.1} MB source, {} workers, order {}",
            size_mb,
            workers,
            format_list(&ordered)
        ));

        let outcomes = self
            .convert_all(job, plan, workers, size_mb, profile.as_ref(), logger)
            .await?;

        let mut converted = Vec::new();
        let mut conversion_errors = Vec::new();
        for (format, outcome) in outcomes {
            match outcome {
                Ok(path) => converted.push((format, path)),
                Err(e) => {
                    logger.for_format(format).log_warning(&e.to_string());
                    metrics::record_conversion_failure(format, e.category());
                    job.record_failed_format(format);
                    job.add_error_detail(
                        ErrorContext::new(e.error_type(), e.to_string(), e.category())
                            .with_video(profile.as_ref()),
                    );
                    conversion_errors.push(e.to_string());
                }
            }
        }
        self.registry.publish(job).await;

        if converted.is_empty() {
            return Err(WorkerError::job_failed(format!(
                "All format conversions failed: {}",
                conversion_errors.join("; ")
            )));
        }

        // Keep dispatch order for uploads.
        converted.sort_by_key(|(format, _)| ordered.iter().position(|f| f == format));
        self.upload_all(job, &converted, logger).await;

        // Timed-out conversions leave partial outputs behind.
        let partial_outputs = self.partial_outputs(&job.source_path).await;
        let outputs = converted
            .iter()
            .map(|(_, p)| p.as_path())
            .chain(partial_outputs.iter().map(PathBuf::as_path));
        self.cleanup_files(job.source_path.as_path(), outputs).await;

        self.finalize(job)?;
        Ok(())
    }

    async fn probe(&self, source: &Path, logger: &JobLogger) -> Option<MediaProfile> {
        match self.transcoder.probe(source).await {
            Ok(profile) => {
                let (content_type, complexity) = self.estimator.estimate(&profile);
                debug!(
                    resolution = %profile.resolution(),
                    content_type = %content_type,
                    complexity,
                    "Classified source"
                );
                Some(profile.classified(content_type, complexity))
            }
            Err(e) => {
                logger.log_warning(&format!("Probe failed, adaptive settings disabled: {}", e));
                None
            }
        }
    }

    async fn sample(&self, logger: &JobLogger) -> Option<ResourceSample> {
        match self.sampler.sample().await {
            Ok(sample) => Some(sample),
            Err(e) => {
                logger.log_warning(&format!("Resource sampling failed: {}", e));
                None
            }
        }
    }

    /// Run every conversion in a pool of `workers`, in `plan` order, and
    /// collect outcomes as they complete.
    async fn convert_all(
        &self,
        job: &ConversionJob,
        plan: Vec<(OutputFormat, EncodingParams)>,
        workers: usize,
        size_mb: f64,
        profile: Option<&MediaProfile>,
        logger: &JobLogger,
    ) -> WorkerResult<Vec<ConversionOutcome>> {
        let pool = WorkerPool::new(workers);
        let (stop_tx, stop_rx) = watch::channel(false);
        let monitor = ResourceMonitor::new(self.sampler.clone(), pool.clone(), self.config.monitor.clone());
        let monitor_handle = tokio::spawn(monitor.run(stop_rx).in_current_span());

        let mut tasks = JoinSet::new();
        let mut pending: BTreeSet<OutputFormat> = BTreeSet::new();

        for (format, params) in plan {
            let permit = pool.acquire().await?;
            let transcoder = Arc::clone(&self.transcoder);
            let input = job.source_path.clone();
            let preserve_audio = job.preserve_audio;
            let timeout = conversion_timeout(size_mb, format, profile);

            debug!(format = %format, timeout_secs = timeout.as_secs(), "Dispatching conversion");
            pending.insert(format);

            tasks.spawn(
                async move {
                    let _permit = permit;
                    let started = Instant::now();
                    let result = tokio::time::timeout(
                        timeout,
                        transcoder.transcode(&input, format, &params, preserve_audio),
                    )
                    .await;

                    let outcome = match result {
                        Ok(Ok(path)) => {
                            metrics::record_conversion_duration(format, started.elapsed().as_secs_f64());
                            Ok(path)
                        }
                        Ok(Err(e)) => Err(WorkerError::conversion_failed(format, e.to_string())),
                        Err(_) => Err(WorkerError::ConversionTimeout {
                            format,
                            timeout_secs: timeout.as_secs(),
                        }),
                    };
                    (format, outcome)
                }
                .in_current_span(),
            );
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((format, outcome)) => {
                    pending.remove(&format);
                    outcomes.push((format, outcome));
                }
                Err(e) => logger.log_error(&format!("Conversion task aborted: {}", e)),
            }
        }
        for format in pending {
            outcomes.push((
                format,
                Err(WorkerError::conversion_failed(format, "conversion task aborted")),
            ));
        }

        let _ = stop_tx.send(true);
        if let Err(e) = monitor_handle.await {
            warn!("Resource monitor task failed: {}", e);
        }

        Ok(outcomes)
    }

    /// Upload converted outputs in order. An open storage breaker skips every
    /// remaining upload of this job.
    async fn upload_all(&self, job: &mut ConversionJob, converted: &[(OutputFormat, PathBuf)], logger: &JobLogger) {
        let mut storage_down = false;

        for (format, path) in converted {
            let format = *format;
            if storage_down {
                job.record_failed_format(format);
                continue;
            }

            let key = object_key_for(path, format);
            match self.uploader.upload_with_retry(path, &key).await {
                Ok(uploaded) => {
                    job.add_converted_file(format, uploaded.url, uploaded.size_mb);
                    logger
                        .for_format(format)
                        .log_progress(&format!("Uploaded {} ({:.2} MB)", key, uploaded.size_mb));
                }
                Err(WorkerError::CircuitOpen(e)) => {
                    storage_down = true;
                    logger.log_warning(&format!("Skipping remaining uploads: {}", e));
                    job.record_failed_format(format);
                    job.add_error(format!("Storage service is currently unavailable: {}", e));
                    job.add_error_detail(
                        ErrorContext::new("CircuitBreakerOpenError", e.to_string(), "circuit_breaker")
                            .with_breaker(e.name.clone(), e.retry_after.as_secs_f64()),
                    );
                }
                Err(e) => {
                    logger
                        .for_format(format)
                        .log_warning(&format!("Upload of {} failed: {}", key, e));
                    job.record_failed_format(format);
                    job.add_error_detail(ErrorContext::new(e.error_type(), e.to_string(), e.category()));
                }
            }
            self.registry.publish(job).await;
        }
    }

    /// Reconcile per-format outcomes into the final status.
    fn finalize(&self, job: &mut ConversionJob) -> WorkerResult<()> {
        let requested = job.formats.len();
        let succeeded = job.converted_files.len();

        if succeeded == requested {
            job.complete()?;
        } else if succeeded > 0 {
            let failed: Vec<OutputFormat> = job
                .formats
                .iter()
                .copied()
                .filter(|f| !job.converted_files.contains_key(f))
                .collect();
            job.partially_complete(format!("Failed formats: {}", format_list(&failed)))?;
        } else {
            job.fail("No converted file could be uploaded")?;
        }
        Ok(())
    }

    /// Record an aborting error and mark the job FAILED.
    async fn handle_failure(
        &self,
        job: &mut ConversionJob,
        error: WorkerError,
        profile: Option<&MediaProfile>,
        logger: &JobLogger,
    ) {
        logger.log_error(&error.to_string());

        let system = self.sampler.sample().await.ok().map(|s| s.to_snapshot());
        let mut context = ErrorContext::new(error.error_type(), error.to_string(), error.category())
            .with_system(system)
            .with_video(profile);
        if let WorkerError::CircuitOpen(e) = &error {
            context = context.with_breaker(e.name.clone(), e.retry_after.as_secs_f64());
        }
        job.add_error_detail(context);

        if !job.is_terminal() {
            if let Err(e) = job.fail(error.to_string()) {
                logger.log_error(&format!("Cannot mark job failed: {}", e));
            }
        }

        let partial_outputs = self.partial_outputs(&job.source_path).await;
        self.cleanup_files(job.source_path.as_path(), partial_outputs.iter().map(PathBuf::as_path))
            .await;
    }

    /// Files in the temp directory or next to the source whose name starts
    /// with the source's stem followed by `_converted`.
    async fn partial_outputs(&self, source: &Path) -> Vec<PathBuf> {
        let Some(stem) = source.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            return Vec::new();
        };
        let prefix = format!("{}_converted", stem);

        let mut dirs = vec![self.config.temp_dir.clone()];
        if let Some(parent) = source.parent() {
            if parent != self.config.temp_dir && !parent.as_os_str().is_empty() {
                dirs.push(parent.to_path_buf());
            }
        }

        let mut found = Vec::new();
        for dir in dirs {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry.file_name().to_string_lossy().starts_with(&prefix) {
                    found.push(entry.path());
                }
            }
        }
        found
    }

    /// Best-effort removal of the source and `outputs`.
    async fn cleanup_files<'a>(&self, source: &'a Path, outputs: impl Iterator<Item = &'a Path>) {
        for path in std::iter::once(source).chain(outputs) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

fn host_cpu_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn format_list(formats: &[OutputFormat]) -> String {
    formats.iter().map(OutputFormat::as_str).collect::<Vec<_>>().join(", ")
}
