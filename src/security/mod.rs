//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (trusted-origin annotation, preflight short-circuit)
//!     → rate_limit.rs (per-IP token bucket admission)
//!     → Pass to credential verification
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input (origins matched exactly, peer IP from socket)
//! - Rate limiter state is process-local and lost on restart

pub mod cors;
pub mod rate_limit;

pub use cors::{cors_middleware, CorsPolicy};
pub use rate_limit::{rate_limit_middleware, ClientRegistry, LimiterSettings, TokenBucket};
