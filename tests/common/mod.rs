//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use api_gatekeeper::auth::{
    require_activated_user, require_authenticated_user, require_permission, InMemoryStore,
    Principal, TokenScope, User,
};
use api_gatekeeper::{ApiConfig, ApiServer, Pipeline, Shutdown};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TRUSTED_ORIGIN: &str = "https://trusted.example";

/// Plaintext tokens for the seeded users.
pub struct Tokens {
    /// Activated, holds `movies:read`.
    pub reader: String,
    /// Activated, no permissions.
    pub plain: String,
    /// Not activated, holds `movies:read`.
    pub inactive: String,
    /// Activation scope; never valid for authentication.
    pub activation: String,
    /// Well-formed but never issued.
    pub unknown: String,
}

pub fn user(id: i64, activated: bool) -> User {
    User {
        id,
        name: format!("user-{id}"),
        email: format!("user-{id}@example.com"),
        activated,
    }
}

pub fn seeded_store() -> (InMemoryStore, Tokens) {
    let store = InMemoryStore::new();
    store.insert_user(user(1, true));
    store.insert_user(user(2, true));
    store.insert_user(user(3, false));
    store.set_permissions(1, ["movies:read"]);
    store.set_permissions(3, ["movies:read"]);

    let day = chrono::Duration::hours(24);
    let tokens = Tokens {
        reader: store.issue_token(1, day, TokenScope::Authentication).plaintext,
        plain: store.issue_token(2, day, TokenScope::Authentication).plaintext,
        inactive: store.issue_token(3, day, TokenScope::Authentication).plaintext,
        activation: store.issue_token(1, day, TokenScope::Activation).plaintext,
        unknown: "ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string(),
    };
    (store, tokens)
}

pub fn config() -> ApiConfig {
    let mut config = ApiConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.env = "testing".to_string();
    config.cors.trusted_origins = vec![TRUSTED_ORIGIN.to_string()];
    config.limiter.requests_per_second = 0.0;
    config.limiter.burst = 1000;
    config.timeouts.shutdown_secs = 1;
    config
}

async fn list_movies() -> Json<Value> {
    Json(serde_json::json!({ "movies": [] }))
}

async fn whoami(principal: Principal) -> Json<Value> {
    Json(serde_json::json!({ "anonymous": principal.is_anonymous() }))
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

pub fn routes(pipeline: &Pipeline) -> Router {
    Router::new()
        .route("/v1/public", get(whoami))
        .route("/v1/me", require_authenticated_user(get(whoami)))
        .route("/v1/activated", require_activated_user(get(whoami)))
        .route(
            "/v1/movies",
            require_permission(pipeline.gate(), "movies:read", get(list_movies)),
        )
        .route("/v1/explode", get(explode))
}

pub struct TestApp {
    pub router: Router,
    pub pipeline: Pipeline,
    pub store: InMemoryStore,
    pub tokens: Tokens,
}

pub fn app(config: ApiConfig) -> TestApp {
    let (store, tokens) = seeded_store();
    let pipeline = Pipeline::new(&config, Arc::new(store.clone()));
    let server = ApiServer::new(config, &pipeline, routes(&pipeline));
    TestApp {
        router: server.router(),
        pipeline,
        store,
        tokens,
    }
}

pub fn peer(last_octet: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, last_octet], 52000))
}

/// Request from `peer` with an empty body.
pub fn request(method: Method, uri: &str, peer: SocketAddr) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(extensions) = builder.extensions_mut() {
        extensions.insert(ConnectInfo(peer));
    }
    builder
}

pub fn empty(builder: axum::http::request::Builder) -> Request<Body> {
    builder.body(Body::empty()).unwrap()
}

pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
    pub tokens: Tokens,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Serve the test routes on an ephemeral local port.
pub async fn spawn_server(config: ApiConfig) -> RunningServer {
    let (store, tokens) = seeded_store();
    let pipeline = Pipeline::new(&config, Arc::new(store));
    let server = ApiServer::new(config, &pipeline, routes(&pipeline));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));

    RunningServer {
        addr,
        shutdown,
        handle,
        tokens,
    }
}
