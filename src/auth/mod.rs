//! Authentication and authorization subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>
//!     → authenticate.rs (parse header, validate token, hash, store lookup)
//!     → Principal attached to request extensions
//!     → [route dispatch]
//!     → authorize.rs (per-route: authenticated → activated → permission)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Malformed and unknown tokens fail identically (no token enumeration)
//! - Only token digests are ever looked up or stored
//! - Permissions are read fresh per request, never cached

pub mod authenticate;
pub mod authorize;
pub mod store;
pub mod token;
pub mod user;

pub use authenticate::{authenticate_middleware, CredentialVerifier};
pub use authorize::{
    require_activated_user, require_authenticated_user, require_permission, AuthorizationGate,
};
pub use store::{IdentityStore, InMemoryStore, StoreError};
pub use token::{AuthToken, TokenScope};
pub use user::{Permissions, Principal, User};
