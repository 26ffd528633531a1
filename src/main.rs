//! API gatekeeper server.
//!
//! ```text
//!   client ──▶ request id ─▶ trace ─▶ timeout
//!          ──▶ metrics ─▶ recover ─▶ CORS ─▶ rate limit ─▶ credentials
//!          ──▶ router ─▶ authorization ─▶ handler
//! ```
//!
//! Configuration comes from an optional TOML file; command-line flags
//! override individual values.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use api_gatekeeper::auth::{require_activated_user, InMemoryStore, Principal, User};
use api_gatekeeper::config::{load_config, validate_config, ApiConfig, ConfigError};
use api_gatekeeper::lifecycle::{wait_for_signal, Shutdown};
use api_gatekeeper::observability::{init_logging, metrics::init_metrics};
use api_gatekeeper::{ApiError, ApiServer, Pipeline};
use axum::{routing::get, Json, Router};
use clap::Parser;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "api-gatekeeper")]
#[command(about = "JSON API server with rate limiting, CORS and token auth", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Environment (development|staging|production)
    #[arg(long)]
    env: Option<String>,

    /// Rate limiter maximum requests per second
    #[arg(long)]
    limiter_rps: Option<f64>,

    /// Rate limiter maximum burst
    #[arg(long)]
    limiter_burst: Option<u32>,

    /// Enable rate limiter
    #[arg(long)]
    limiter_enabled: Option<bool>,

    /// Trusted CORS origins (space separated)
    #[arg(long, value_delimiter = ' ', num_args = 1..)]
    cors_trusted_origins: Option<Vec<String>>,
}

impl Args {
    fn into_config(self) -> Result<ApiConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ApiConfig::default(),
        };

        if let Some(port) = self.port {
            config.listener.bind_address = with_port(&config.listener.bind_address, port);
        }
        if let Some(env) = self.env {
            config.listener.env = env;
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
        if let Some(origins) = self.cors_trusted_origins {
            config.cors.trusted_origins = origins.into_iter().filter(|o| !o.is_empty()).collect();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// Replace the port of `bind_address`, keeping its host.
fn with_port(bind_address: &str, port: u16) -> String {
    match bind_address.parse::<SocketAddr>() {
        Ok(mut addr) => {
            addr.set_port(port);
            addr.to_string()
        }
        Err(_) => format!("0.0.0.0:{port}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().into_config()?;
    init_logging(&config.observability)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        env = %config.listener.env,
        limiter_enabled = config.limiter.enabled,
        limiter_rps = config.limiter.requests_per_second,
        limiter_burst = config.limiter.burst,
        trusted_origins = config.cors.trusted_origins.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let store = Arc::new(InMemoryStore::new());
    let pipeline = Pipeline::new(&config, store);
    let routes = Router::new().route("/v1/users/me", require_activated_user(get(current_user)));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    ApiServer::new(config, &pipeline, routes)
        .run(listener, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn current_user(principal: Principal) -> Result<Json<User>, ApiError> {
    principal.user().cloned().map(Json).ok_or(ApiError::AuthenticationRequired)
}
