//! Health and circuit breaker handlers.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vconv_worker::{CircuitBreakerSnapshot, JobStats};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub storage: String,
    pub jobs: JobStats,
}

/// Health check endpoint (liveness probe).
///
/// Always 200; an unreachable storage backend reports `degraded`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, storage) = match state.storage.check_connectivity().await {
        Ok(()) => ("healthy", "connected"),
        Err(e) => {
            warn!("Storage connectivity check failed: {}", e);
            ("degraded", "unreachable")
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        storage: storage.to_string(),
        jobs: state.registry.stats().await,
    })
}

#[derive(Serialize)]
pub struct CircuitBreakersResponse {
    pub status: String,
    pub circuit_breakers: Vec<CircuitBreakerSnapshot>,
}

/// State of every registered circuit breaker.
pub async fn circuit_breakers(State(state): State<AppState>) -> Json<CircuitBreakersResponse> {
    Json(CircuitBreakersResponse {
        status: "success".to_string(),
        circuit_breakers: state.breakers.snapshot_all(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub status: String,
    pub message: String,
    pub reset: usize,
}

/// Reset one breaker (`?name=`) or all of them.
pub async fn reset_circuit_breakers(
    State(state): State<AppState>,
    Query(query): Query<ResetQuery>,
) -> ApiResult<Json<ResetResponse>> {
    let (message, reset) = match query.name {
        Some(name) => {
            if !state.breakers.reset(&name) {
                return Err(ApiError::not_found(format!("Circuit breaker '{}' not found", name)));
            }
            (format!("Circuit breaker '{}' reset", name), 1)
        }
        None => {
            let count = state.breakers.reset_all();
            (format!("{} circuit breakers reset", count), count)
        }
    };

    info!("{}", message);
    Ok(Json(ResetResponse {
        status: "success".to_string(),
        message,
        reset,
    }))
}
