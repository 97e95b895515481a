//! Dispatch order and per-format timeouts.

use std::time::Duration;

use vconv_models::{MediaProfile, OutputFormat};

/// Floor of the per-format timeout before scaling.
const MIN_BASE_TIMEOUT_SECS: f64 = 30.0;

/// Formats in dispatch order: most expensive first. Ties keep request order.
pub fn prioritize_formats(formats: &[OutputFormat]) -> Vec<OutputFormat> {
    let mut ordered = formats.to_vec();
    ordered.sort_by_key(|format| std::cmp::Reverse(format.priority()));
    ordered
}

/// Time allowed for converting a source of `size_mb` to `format`.
///
/// One second per megabyte with a 30s floor, scaled by the source's
/// complexity factor and the format's cost multiplier.
pub fn conversion_timeout(size_mb: f64, format: OutputFormat, profile: Option<&MediaProfile>) -> Duration {
    let size = if size_mb.is_finite() { size_mb } else { 0.0 };
    let base = size.max(MIN_BASE_TIMEOUT_SECS);

    let complexity = profile
        .map(|p| p.complexity_factor)
        .filter(|c| c.is_finite() && *c > 0.0)
        .unwrap_or(1.0);

    Duration::from_secs_f64(base * complexity * format.timeout_multiplier())
}
