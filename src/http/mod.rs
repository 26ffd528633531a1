//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, tracing, timeout)
//!     → pipeline.rs (metrics, recover, CORS, rate limit, credentials)
//!     → [route dispatch + per-route authorization]
//!     → handler
//!     → error.rs (failures rendered as JSON)
//! ```

pub mod error;
pub mod pipeline;
pub mod recover;
pub mod request;
pub mod server;

pub use error::ApiError;
pub use pipeline::Pipeline;
pub use request::X_REQUEST_ID;
pub use server::ApiServer;
