//! Cross-origin request gating.
//!
//! Requests whose `Origin` exactly matches a trusted origin get
//! `Access-Control-Allow-Origin` echoed back. Preflight probes from trusted
//! origins are answered here and never travel further down the pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::CorsConfig;

const PREFLIGHT_ALLOW_METHODS: &str = "OPTIONS, PUT, PATCH, DELETE";
const PREFLIGHT_ALLOW_HEADERS: &str = "Authorization, Content-Type";

/// Set of origins allowed to call the API from a browser.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    trusted_origins: HashSet<String>,
}

impl CorsPolicy {
    pub fn new<I, T>(origins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            trusted_origins: origins.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &CorsConfig) -> Self {
        Self::new(config.trusted_origins.iter().cloned())
    }

    pub fn is_trusted(&self, origin: &str) -> bool {
        self.trusted_origins.contains(origin)
    }
}

fn is_preflight(request: &Request) -> bool {
    request.method() == Method::OPTIONS
        && request
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .is_some_and(|value| !value.is_empty())
}

fn preflight_response() -> Response {
    (
        StatusCode::OK,
        [
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(PREFLIGHT_ALLOW_METHODS),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(PREFLIGHT_ALLOW_HEADERS),
            ),
        ],
    )
        .into_response()
}

/// Middleware applying the [`CorsPolicy`].
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let trusted_origin = request
        .headers()
        .get(header::ORIGIN)
        .filter(|origin| origin.to_str().is_ok_and(|o| policy.is_trusted(o)))
        .cloned();

    let mut response = match &trusted_origin {
        Some(origin) if is_preflight(&request) => {
            tracing::debug!(origin = ?origin, "Answered CORS preflight");
            preflight_response()
        }
        _ => next.run(request).await,
    };

    let headers = response.headers_mut();
    if let Some(origin) = trusted_origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.append(header::VARY, HeaderValue::from_static("Origin"));

    response
}
