//! Per-route authorization.
//!
//! The checks nest: a permission check first requires an activated user, and
//! an activated user must first be authenticated. The first failing layer
//! answers the request.
//!
//! ```rust,ignore
//! let routes = Router::new()
//!     .route("/v1/movies", require_permission(&gate, "movies:read", get(list_movies)))
//!     .route("/v1/me", require_activated_user(get(show_me)));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::MethodRouter,
};

use crate::auth::store::IdentityStore;
use crate::auth::user::{Principal, User};
use crate::http::error::ApiError;

/// Checks principals against required capabilities.
#[derive(Clone)]
pub struct AuthorizationGate {
    store: Arc<dyn IdentityStore>,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    pub fn require_authenticated(principal: &Principal) -> Result<&User, ApiError> {
        principal.user().ok_or(ApiError::AuthenticationRequired)
    }

    pub fn require_activated(principal: &Principal) -> Result<&User, ApiError> {
        let user = Self::require_authenticated(principal)?;
        if !user.activated {
            return Err(ApiError::InactiveAccount);
        }
        Ok(user)
    }

    /// Permissions are fetched fresh on every call.
    pub async fn require_permission(&self, code: &str, principal: &Principal) -> Result<(), ApiError> {
        let user = Self::require_activated(principal)?;
        let permissions = self.store.permissions_for_user(user.id).await?;

        if permissions.includes(code) {
            Ok(())
        } else {
            tracing::debug!(user_id = user.id, permission = code, "Permission denied");
            Err(ApiError::NotPermitted)
        }
    }
}

#[derive(Clone)]
struct PermissionCheck {
    gate: AuthorizationGate,
    code: &'static str,
}

/// Only let authenticated users reach `route`.
pub fn require_authenticated_user<S>(route: MethodRouter<S>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.route_layer(middleware::from_fn(authenticated_middleware))
}

/// Only let authenticated, activated users reach `route`.
pub fn require_activated_user<S>(route: MethodRouter<S>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.route_layer(middleware::from_fn(activated_middleware))
}

/// Only let activated users holding `code` reach `route`.
pub fn require_permission<S>(
    gate: &AuthorizationGate,
    code: &'static str,
    route: MethodRouter<S>,
) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    let check = PermissionCheck {
        gate: gate.clone(),
        code,
    };
    route.route_layer(middleware::from_fn_with_state(check, permission_middleware))
}

async fn authenticated_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    AuthorizationGate::require_authenticated(&Principal::from_extensions(request.extensions()))?;
    Ok(next.run(request).await)
}

async fn activated_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    AuthorizationGate::require_activated(&Principal::from_extensions(request.extensions()))?;
    Ok(next.run(request).await)
}

async fn permission_middleware(
    State(check): State<PermissionCheck>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = Principal::from_extensions(request.extensions());
    check.gate.require_permission(check.code, &principal).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::InMemoryStore;

    fn user(id: i64, activated: bool) -> Principal {
        Principal::User(User {
            id,
            name: format!("user-{id}"),
            email: format!("user-{id}@example.com"),
            activated,
        })
    }

    fn gate() -> AuthorizationGate {
        let store = InMemoryStore::new();
        store.set_permissions(1, ["movies:read"]);
        store.set_permissions(2, ["movies:read", "movies:write"]);
        AuthorizationGate::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_anonymous_requires_authentication() {
        let err = gate()
            .require_permission("movies:read", &Principal::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_inactive_user_is_forbidden_not_unauthorized() {
        let err = gate()
            .require_permission("movies:read", &user(1, false))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InactiveAccount));
    }

    #[tokio::test]
    async fn test_permission_membership() {
        let gate = gate();
        assert!(gate.require_permission("movies:read", &user(1, true)).await.is_ok());

        let err = gate
            .require_permission("movies:write", &user(1, true))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotPermitted));

        assert!(gate.require_permission("movies:write", &user(2, true)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_permissions() {
        let err = gate()
            .require_permission("movies:read", &user(99, true))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotPermitted));
    }

    #[test]
    fn test_activated_check_only() {
        assert!(AuthorizationGate::require_activated(&user(5, true)).is_ok());
        assert!(matches!(
            AuthorizationGate::require_authenticated(&Principal::Anonymous),
            Err(ApiError::AuthenticationRequired)
        ));
    }
}
