use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::observability::MetricsSnapshot;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub system_info: SystemInfo,
}

#[derive(Debug, Serialize)]
pub struct RateLimiterVars {
    pub enabled: bool,
    pub tracked_clients: usize,
}

#[derive(Debug, Serialize)]
pub struct DebugVars {
    pub version: &'static str,
    pub timestamp: i64,
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    pub rate_limiter: RateLimiterVars,
}

pub async fn healthcheck(State(state): State<AdminState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "available",
        system_info: SystemInfo {
            environment: state.environment.to_string(),
            version: VERSION,
        },
    })
}

pub async fn debug_vars(State(state): State<AdminState>) -> Json<DebugVars> {
    Json(DebugVars {
        version: VERSION,
        timestamp: chrono::Utc::now().timestamp(),
        metrics: state.metrics.snapshot(),
        rate_limiter: RateLimiterVars {
            enabled: state.registry.is_enabled(),
            tracked_clients: state.registry.len(),
        },
    })
}
