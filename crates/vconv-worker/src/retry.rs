//! Upload retries with exponential backoff.
//!
//! Uploads go through the storage dependency's circuit breaker. An open
//! breaker ends the retry loop at once; ordinary storage failures are retried
//! with jittered exponential backoff.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use vconv_storage::{ObjectStorage, StorageError, UploadedObject};

use crate::circuit_breaker::{CallError, CircuitBreaker};
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between attempts, before jitter.
    pub max_delay: Duration,
    /// Upper bound of the random jitter, as a fraction of the delay.
    pub jitter_ratio: f64,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_ratio: 0.2,
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Backoff after failed attempt `attempt` (1-based), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff plus uniform jitter in `[0, jitter_ratio × delay]`.
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        delay + delay.mul_f64(self.jitter_ratio * rand::random::<f64>())
    }
}

/// Storage uploads guarded by a circuit breaker and retried with backoff.
#[derive(Clone)]
pub struct RetryingUploader {
    storage: Arc<dyn ObjectStorage>,
    breaker: Arc<CircuitBreaker>,
    config: RetryConfig,
}

impl RetryingUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, breaker: Arc<CircuitBreaker>, config: RetryConfig) -> Self {
        Self {
            storage,
            breaker,
            config,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Upload `path` under `key`.
    ///
    /// Returns [`WorkerError::CircuitOpen`] without further attempts as soon
    /// as the breaker rejects a call. A missing local file is neither retried
    /// nor counted against the breaker.
    pub async fn upload_with_retry(&self, path: &Path, key: &str) -> WorkerResult<UploadedObject> {
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            metrics::record_upload_attempt();

            let result = self
                .breaker
                .execute_with(
                    || self.storage.upload(path, key),
                    |e| matches!(e, StorageError::FileNotFound(_)),
                )
                .await;

            match result {
                Ok(uploaded) => {
                    metrics::record_upload_duration(started.elapsed().as_secs_f64());
                    debug!(key, attempt, url = %uploaded.url, "Upload succeeded");
                    return Ok(uploaded);
                }
                Err(CallError::Open(e)) => {
                    warn!(key, attempt, "Upload skipped: {}", e);
                    return Err(WorkerError::CircuitOpen(e));
                }
                Err(CallError::Inner(e @ StorageError::FileNotFound(_))) => {
                    return Err(e.into());
                }
                Err(CallError::Inner(e)) => {
                    if attempt < self.config.max_attempts {
                        let delay = self.config.jittered_delay(attempt);
                        warn!(
                            "{} attempt {}/{} for {} failed, retrying in {:?}: {}",
                            self.config.operation_name,
                            attempt,
                            self.config.max_attempts,
                            key,
                            delay,
                            e
                        );
                        metrics::record_upload_retry();
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        Err(StorageError::upload_failed(format!(
            "Failed to upload {} after {} attempts: {}",
            key, self.config.max_attempts, reason
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vconv_storage::StorageResult;

    /// Fails the first `failures` uploads.
    struct FlakyStorage {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyStorage {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ObjectStorage for FlakyStorage {
        async fn upload(&self, path: &Path, key: &str) -> StorageResult<UploadedObject> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if path.as_os_str() == "missing" {
                return Err(StorageError::FileNotFound(PathBuf::from("missing")));
            }
            if call < self.failures {
                return Err(StorageError::upload_failed("503 Slow Down"));
            }
            Ok(UploadedObject {
                url: format!("https://cdn.example.com/{}", key),
                size_mb: 1.5,
            })
        }

        async fn delete(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "storage",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                ..CircuitBreakerConfig::default()
            },
        ))
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::new("test")
            .with_base_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(3));

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(3));
        assert_eq!(config.delay_for_attempt(60), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_bounded() {
        let config = RetryConfig::new("test");
        for _ in 0..100 {
            let delay = config.jittered_delay(2);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventual_success() {
        let storage = FlakyStorage::new(2);
        let uploader = RetryingUploader::new(storage.clone(), breaker(5), RetryConfig::new("upload"));

        let uploaded = uploader
            .upload_with_retry(Path::new("clip.mp4"), "mp4/clip.mp4")
            .await
            .unwrap();

        assert_eq!(uploaded.url, "https://cdn.example.com/mp4/clip.mp4");
        assert_eq!(storage.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts() {
        let storage = FlakyStorage::new(u32::MAX);
        let uploader = RetryingUploader::new(storage.clone(), breaker(100), RetryConfig::new("upload"));

        let err = uploader
            .upload_with_retry(Path::new("clip.mp4"), "mp4/clip.mp4")
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Storage(StorageError::UploadFailed(_))));
        assert!(err.to_string().contains("Failed to upload mp4/clip.mp4 after 5 attempts"));
        assert_eq!(storage.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_stops_retries() {
        let storage = FlakyStorage::new(u32::MAX);
        let uploader = RetryingUploader::new(storage.clone(), breaker(2), RetryConfig::new("upload"));

        let err = uploader
            .upload_with_retry(Path::new("clip.webm"), "webm/clip.webm")
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(storage.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_file_not_retried() {
        let storage = FlakyStorage::new(0);
        let breaker = breaker(1);
        let uploader = RetryingUploader::new(storage.clone(), breaker.clone(), RetryConfig::new("upload"));

        let err = uploader
            .upload_with_retry(Path::new("missing"), "mp4/missing.mp4")
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Storage(StorageError::FileNotFound(_))));
        assert_eq!(storage.calls.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), crate::CircuitState::Closed);
    }
}
