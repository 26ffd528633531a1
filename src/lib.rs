//! Request-processing core for a JSON API server.
//!
//! Every request crosses a fixed chain of cross-cutting stages before it
//! reaches a handler:
//!
//! ```text
//! metrics → panic recovery → CORS → rate limit → credentials → [router]
//!                                                   → authorization (per route)
//!                                                   → handler
//! ```
//!
//! See [`http::Pipeline`] for the composition and [`http::ApiServer`] for
//! serving it.

pub mod admin;
pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::ApiConfig;
pub use http::{ApiError, ApiServer, Pipeline};
pub use lifecycle::Shutdown;
