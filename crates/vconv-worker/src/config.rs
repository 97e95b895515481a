//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::allocator::HARD_MAX_WORKERS;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::monitor::MonitorPolicy;
use crate::retry::RetryConfig;

/// Orchestration core configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Configured worker ceiling per job (before load scaling)
    pub max_workers: usize,
    /// Absolute worker ceiling per job, regardless of the formula (at most 8)
    pub hard_max_workers: usize,
    /// Encoder thread budget per conversion; never raised above 4
    pub ffmpeg_threads: usize,
    /// Directory for uploaded sources and converted outputs
    pub temp_dir: PathBuf,
    /// Dependency name the uploader's circuit breaker is registered under
    pub storage_dependency: String,
    /// Default breaker thresholds for dependencies without overrides
    pub circuit_breaker: CircuitBreakerConfig,
    /// Upload retry policy
    pub upload_retry: RetryConfig,
    /// Resource monitor policy
    pub monitor: MonitorPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            hard_max_workers: HARD_MAX_WORKERS,
            ffmpeg_threads: 4,
            temp_dir: PathBuf::from("/tmp/video-converter"),
            storage_dependency: "storage".to_string(),
            circuit_breaker: CircuitBreakerConfig::default(),
            upload_retry: RetryConfig::new("storage_upload"),
            monitor: MonitorPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let monitor_defaults = MonitorPolicy::default();

        Self {
            max_workers: env_parse("MAX_WORKERS", defaults.max_workers),
            hard_max_workers: env_parse("HARD_MAX_WORKERS", defaults.hard_max_workers).clamp(1, HARD_MAX_WORKERS),
            ffmpeg_threads: env_parse("FFMPEG_THREADS", defaults.ffmpeg_threads).max(1),
            temp_dir: std::env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            storage_dependency: std::env::var("STORAGE_DEPENDENCY_NAME")
                .unwrap_or(defaults.storage_dependency),
            circuit_breaker: CircuitBreakerConfig::from_env(),
            upload_retry: RetryConfig::new("storage_upload")
                .with_max_attempts(env_parse("UPLOAD_MAX_ATTEMPTS", 5))
                .with_base_delay(Duration::from_millis(env_parse("UPLOAD_BASE_DELAY_MS", 500)))
                .with_max_delay(Duration::from_secs(env_parse("UPLOAD_MAX_DELAY_SECS", 30))),
            monitor: MonitorPolicy {
                interval: Duration::from_secs(env_parse(
                    "MONITOR_INTERVAL_SECS",
                    monitor_defaults.interval.as_secs(),
                )),
                history_size: env_parse("MONITOR_HISTORY", monitor_defaults.history_size),
                cooldown_cycles: env_parse("MONITOR_COOLDOWN_CYCLES", monitor_defaults.cooldown_cycles),
                ..monitor_defaults
            },
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or
/// malformed.
pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.hard_max_workers, 8);
        assert_eq!(config.storage_dependency, "storage");
        assert_eq!(config.upload_retry.max_attempts, 5);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_env_parse_fallback() {
        assert_eq!(env_parse("VCONV_TEST_UNSET_VARIABLE", 7usize), 7);
    }
}
