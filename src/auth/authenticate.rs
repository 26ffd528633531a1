//! Credential verification middleware.
//!
//! Resolves the `Authorization` header into a [`Principal`] and attaches it to
//! the request. A missing header means anonymous; anything else must be a
//! valid, live bearer token.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::store::IdentityStore;
use crate::auth::token::{hash_token, is_valid_plaintext, TokenScope};
use crate::auth::user::Principal;
use crate::http::error::ApiError;

/// Resolves bearer tokens to users.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn IdentityStore>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Authenticate the value of an `Authorization` header.
    ///
    /// An absent or empty header yields [`Principal::Anonymous`].
    ///
    /// Malformed headers, malformed tokens and unknown or expired tokens all
    /// fail with [`ApiError::InvalidCredentials`].
    pub async fn authenticate(&self, header: Option<&HeaderValue>) -> Result<Principal, ApiError> {
        let Some(header) = header.filter(|value| !value.is_empty()) else {
            return Ok(Principal::Anonymous);
        };

        let token = parse_bearer(header)?;
        if !is_valid_plaintext(token) {
            return Err(ApiError::InvalidCredentials);
        }

        let user = self
            .store
            .user_for_token(TokenScope::Authentication, hash_token(token))
            .await?
            .ok_or(ApiError::InvalidCredentials)?;

        Ok(Principal::User(user))
    }
}

/// Extract the token from a `Bearer <token>` header value.
fn parse_bearer(header: &HeaderValue) -> Result<&str, ApiError> {
    let value = header.to_str().map_err(|_| ApiError::InvalidCredentials)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(ApiError::InvalidCredentials),
    }
}

/// Middleware attaching the request's [`Principal`].
pub async fn authenticate_middleware(
    State(verifier): State<CredentialVerifier>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request.headers().get(header::AUTHORIZATION).cloned();

    let mut response = match verifier.authenticate(header.as_ref()).await {
        Ok(principal) => {
            if let Principal::User(user) = &principal {
                tracing::debug!(user_id = user.id, "Request authenticated");
            }
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => {
            tracing::debug!(error = %err, "Rejected request credentials");
            err.into_response()
        }
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}
