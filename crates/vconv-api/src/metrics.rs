//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder and return the handle used to render
/// the exposition text.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vconv_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vconv_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vconv_http_requests_in_flight";

    // Intake metrics
    pub const UPLOADS_ACCEPTED_TOTAL: &str = "vconv_uploads_accepted_total";
    pub const UPLOADS_REJECTED_TOTAL: &str = "vconv_uploads_rejected_total";
    pub const UPLOAD_SIZE_BYTES: &str = "vconv_upload_size_bytes";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an accepted upload and its size.
pub fn record_upload_accepted(size_bytes: u64) {
    counter!(names::UPLOADS_ACCEPTED_TOTAL).increment(1);
    histogram!(names::UPLOAD_SIZE_BYTES).record(size_bytes as f64);
}

/// Record a rejected upload.
pub fn record_upload_rejected(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::UPLOADS_REJECTED_TOTAL, &labels).increment(1);
}

fn uuid_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}").ok()
        })
        .as_ref()
}

fn job_path_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^/convert/[^/]+").ok())
        .as_ref()
}

/// Sanitize path for metrics labels (job IDs become `:id`).
pub(crate) fn sanitize_path(path: &str) -> String {
    let mut sanitized = path.to_string();
    if let Some(re) = uuid_pattern() {
        sanitized = re.replace_all(&sanitized, ":id").into_owned();
    }
    if let Some(re) = job_path_pattern() {
        sanitized = re.replace(&sanitized, "/convert/:id").into_owned();
    }
    sanitized
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/convert/550e8400-e29b-41d4-a716-446655440000"),
            "/convert/:id"
        );
        assert_eq!(
            sanitize_path("/convert/550e8400-e29b-41d4-a716-446655440000/logs"),
            "/convert/:id/logs"
        );
        assert_eq!(sanitize_path("/convert/not-a-uuid/logs"), "/convert/:id/logs");
        assert_eq!(sanitize_path("/convert"), "/convert");
        assert_eq!(sanitize_path("/health/circuit-breakers"), "/health/circuit-breakers");
    }
}
