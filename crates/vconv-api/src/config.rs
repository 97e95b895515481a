//! API configuration.

use vconv_models::OutputFormat;

const BYTES_PER_MB: usize = 1024 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Largest accepted upload, in megabytes
    pub max_upload_size_mb: usize,
    /// Output formats clients may request
    pub supported_formats: Vec<OutputFormat>,
    /// Environment (development/production)
    pub environment: String,
    /// Expose Prometheus metrics at /metrics
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_upload_size_mb: 500,
            supported_formats: OutputFormat::all().to_vec(),
            environment: "development".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_upload_size_mb: std::env::var("MAX_UPLOAD_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_size_mb),
            supported_formats: std::env::var("SUPPORTED_FORMATS")
                .ok()
                .and_then(|s| OutputFormat::parse_list(&s).ok())
                .unwrap_or(defaults.supported_formats),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Upload ceiling in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Request body limit: the upload ceiling plus room for the other
    /// multipart fields, so oversized files reach the handler's 413.
    pub fn max_body_size(&self) -> usize {
        self.max_upload_bytes().saturating_add(BYTES_PER_MB)
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
