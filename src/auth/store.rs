//! Identity store collaborator.
//!
//! The pipeline never owns user, token or permission data. It reaches the
//! backing store through [`IdentityStore`], which a relational model layer (or
//! the bundled [`InMemoryStore`]) implements.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};

use crate::auth::token::{AuthToken, TokenHash, TokenScope};
use crate::auth::user::{Permissions, User};

/// Failure reaching the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("identity store unavailable: {0}")]
    Unavailable(String),

    #[error("identity store query failed: {0}")]
    Query(String),
}

/// Read-only lookups the pipeline needs.
pub trait IdentityStore: Send + Sync {
    /// User owning a live (unexpired) token of `scope` whose digest is `hash`.
    fn user_for_token(
        &self,
        scope: TokenScope,
        hash: TokenHash,
    ) -> BoxFuture<'_, Result<Option<User>, StoreError>>;

    /// Permission codes currently granted to `user_id`.
    fn permissions_for_user(&self, user_id: i64) -> BoxFuture<'_, Result<Permissions, StoreError>>;
}

#[derive(Debug, Clone)]
struct TokenRecord {
    user_id: i64,
    expiry: chrono::DateTime<Utc>,
    scope: TokenScope,
}

/// Process-local store backed by concurrent maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    users: Arc<DashMap<i64, User>>,
    tokens: Arc<DashMap<TokenHash, TokenRecord>>,
    permissions: Arc<DashMap<i64, Permissions>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Replace the permission set of `user_id`.
    pub fn set_permissions<I, T>(&self, user_id: i64, codes: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.permissions.insert(user_id, codes.into_iter().collect());
    }

    /// Issue and store a new token, returning it with its plaintext.
    pub fn issue_token(&self, user_id: i64, ttl: Duration, scope: TokenScope) -> AuthToken {
        let token = AuthToken::generate(user_id, ttl, scope);
        self.insert_token(&token);
        token
    }

    pub fn insert_token(&self, token: &AuthToken) {
        self.tokens.insert(
            token.hash,
            TokenRecord {
                user_id: token.user_id,
                expiry: token.expiry,
                scope: token.scope,
            },
        );
    }

    /// Delete every token of `scope` belonging to `user_id`.
    pub fn revoke_tokens(&self, user_id: i64, scope: TokenScope) {
        self.tokens
            .retain(|_, record| !(record.user_id == user_id && record.scope == scope));
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

impl IdentityStore for InMemoryStore {
    fn user_for_token(
        &self,
        scope: TokenScope,
        hash: TokenHash,
    ) -> BoxFuture<'_, Result<Option<User>, StoreError>> {
        async move {
            let user_id = match self.tokens.get(&hash) {
                Some(record) if record.scope == scope && record.expiry > Utc::now() => {
                    record.user_id
                }
                _ => return Ok(None),
            };

            Ok(self.users.get(&user_id).map(|user| user.value().clone()))
        }
        .boxed()
    }

    fn permissions_for_user(&self, user_id: i64) -> BoxFuture<'_, Result<Permissions, StoreError>> {
        async move {
            Ok(self
                .permissions
                .get(&user_id)
                .map(|permissions| permissions.value().clone())
                .unwrap_or_default())
        }
        .boxed()
    }
}
