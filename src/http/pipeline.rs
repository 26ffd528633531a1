//! Request pipeline composition.
//!
//! Every request passes the same stages, outermost first:
//!
//! ```text
//! metrics → panic recovery → CORS → rate limit → credentials → [router]
//!                                                   → per-route authorization
//!                                                   → handler
//! ```
//!
//! Each stage is a tower layer. [`Pipeline::wrap`] stacks them with a
//! `ServiceBuilder`, whose first layer is the outermost, so the order above
//! is exactly the order of the calls below.
//!
//! Short-circuits:
//! - CORS answers trusted preflights (200) before rate limiting
//! - the rate limiter answers 429 before credentials are looked at
//! - the credential stage answers 401 for bad tokens
//! - panics anywhere inside become 500 with `Connection: close`

use std::sync::Arc;

use axum::{middleware, Router};
use tower::ServiceBuilder;

use crate::auth::{authenticate_middleware, AuthorizationGate, CredentialVerifier, IdentityStore};
use crate::config::ApiConfig;
use crate::http::recover::recover_panic_layer;
use crate::observability::{metrics_middleware, MetricsCollector};
use crate::security::{cors_middleware, rate_limit_middleware, ClientRegistry, CorsPolicy};

/// The shared cross-cutting stages of the API.
#[derive(Clone)]
pub struct Pipeline {
    metrics: Arc<MetricsCollector>,
    cors: Arc<CorsPolicy>,
    registry: Arc<ClientRegistry>,
    verifier: CredentialVerifier,
    gate: AuthorizationGate,
}

impl Pipeline {
    pub fn new(config: &ApiConfig, store: Arc<dyn IdentityStore>) -> Self {
        Self::from_parts(
            Arc::new(MetricsCollector::new()),
            Arc::new(CorsPolicy::from_config(&config.cors)),
            Arc::new(ClientRegistry::from_config(&config.limiter)),
            store,
        )
    }

    pub fn from_parts(
        metrics: Arc<MetricsCollector>,
        cors: Arc<CorsPolicy>,
        registry: Arc<ClientRegistry>,
        store: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            metrics,
            cors,
            registry,
            verifier: CredentialVerifier::new(Arc::clone(&store)),
            gate: AuthorizationGate::new(store),
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Gate for decorating routes with
    /// [`require_permission`](crate::auth::require_permission).
    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    /// Put every route (and fallback) of `routes` behind the pipeline.
    ///
    /// Routes added to the returned router afterwards bypass it.
    pub fn wrap(&self, routes: Router) -> Router {
        routes.layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(
                    Arc::clone(&self.metrics),
                    metrics_middleware,
                ))
                .layer(recover_panic_layer())
                .layer(middleware::from_fn_with_state(
                    Arc::clone(&self.cors),
                    cors_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    Arc::clone(&self.registry),
                    rate_limit_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    self.verifier.clone(),
                    authenticate_middleware,
                )),
        )
    }
}
