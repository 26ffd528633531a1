//! HTTP-facing error taxonomy and the JSON error envelope.
//!
//! Every failure produced by the pipeline is rendered as
//! `{"error": "<message>"}` with the matching status code.

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::store::StoreError;

/// Errors that terminate the current request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed Authorization header, malformed token, or unknown/expired
    /// token. Deliberately one variant so callers cannot tell them apart.
    #[error("invalid or missing authentication token")]
    InvalidCredentials,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    InactiveAccount,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),

    /// Internal failure; the cause is logged, never sent to the client.
    #[error("the server encountered a problem and could not process your request")]
    Internal(String),
}

impl ApiError {
    /// Status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials | ApiError::AuthenticationRequired => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::InactiveAccount | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(cause) = &self {
            tracing::error!(error = %cause, "Request failed with internal error");
        }

        let status = self.status();
        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();

        if let ApiError::InvalidCredentials = self {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}

/// Router fallback for unknown paths.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Router fallback for known paths with an unsupported method.
pub async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}
