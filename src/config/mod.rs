//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            command-line flags
//!     → loader.rs (parse)           │
//!     → validation.rs (semantic)    │
//!     → ApiConfig ◀─────────────────┘ (flags override file values)
//!     → shared by value/Arc with every pipeline stage
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ApiConfig, CorsConfig, LimiterConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
