//! HTTP server setup.
//!
//! # Responsibilities
//! - Merge application routes with the admin endpoints
//! - Install the JSON 404/405 fallbacks
//! - Put everything behind the request [`Pipeline`]
//! - Wire up server-level layers (request id, tracing, timeout)
//! - Run the rate limiter sweeper alongside the server
//! - Serve with graceful, time-bounded shutdown

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::{setup_admin_router, AdminState};
use crate::config::ApiConfig;
use crate::http::error::{method_not_allowed, not_found};
use crate::http::pipeline::Pipeline;
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::security::ClientRegistry;

/// HTTP server for the API.
pub struct ApiServer {
    router: Router,
    config: ApiConfig,
    registry: Arc<ClientRegistry>,
}

impl ApiServer {
    /// Build the server around `routes`.
    ///
    /// `routes` should already carry its per-route authorization, built with
    /// the gate from `pipeline`.
    pub fn new(config: ApiConfig, pipeline: &Pipeline, routes: Router) -> Self {
        let admin = setup_admin_router(AdminState {
            environment: Arc::from(config.listener.env.as_str()),
            metrics: Arc::clone(pipeline.metrics()),
            registry: Arc::clone(pipeline.registry()),
        });

        let router = Self::build_router(&config, pipeline, routes.merge(admin));
        Self {
            router,
            config,
            registry: Arc::clone(pipeline.registry()),
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &ApiConfig, pipeline: &Pipeline, routes: Router) -> Router {
        let routes = routes
            .fallback(not_found)
            .method_not_allowed_fallback(method_not_allowed);

        pipeline.wrap(routes).layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
                .layer(propagate_request_id_layer())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.timeouts.request_secs,
                ))),
        )
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` is triggered.
    ///
    /// In-flight requests get `timeouts.shutdown_secs` to finish; after that
    /// the server stops regardless.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let mut graceful = shutdown.subscribe();
        let mut deadline = shutdown.subscribe();

        tracing::info!(
            address = %addr,
            env = %self.config.listener.env,
            limiter_enabled = self.registry.is_enabled(),
            "HTTP server starting"
        );

        let sweeper = if self.registry.is_enabled() {
            Some(self.registry.spawn_sweeper(shutdown.subscribe()))
        } else {
            None
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = graceful.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .into_future();
        tokio::pin!(serve);

        let grace = Duration::from_secs(self.config.timeouts.shutdown_secs);
        let result = tokio::select! {
            result = &mut serve => result,
            _ = deadline.recv() => {
                match tokio::time::timeout(grace, &mut serve).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            grace_secs = grace.as_secs(),
                            "Shutdown grace period elapsed, abandoning in-flight requests"
                        );
                        Ok(())
                    }
                }
            }
        };

        // The sweeper must stop however the server exited.
        if let Some(sweeper) = sweeper {
            shutdown.trigger();
            let _ = sweeper.await;
        }

        if let Err(err) = &result {
            tracing::error!(error = %err, "HTTP server failed");
        } else {
            tracing::info!("HTTP server stopped");
        }
        result
    }
}
