//! Read-only system endpoints: health and counter inspection.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::observability::MetricsCollector;
use crate::security::ClientRegistry;
use self::handlers::{debug_vars, healthcheck};

#[derive(Clone)]
pub struct AdminState {
    pub environment: Arc<str>,
    pub metrics: Arc<MetricsCollector>,
    pub registry: Arc<ClientRegistry>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .route("/debug/vars", get(debug_vars))
        .with_state(state)
}
