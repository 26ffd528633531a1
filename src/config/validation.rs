//! Configuration validation.
//!
//! Semantic checks that serde cannot express. All errors are collected so an
//! operator sees every problem at once instead of fixing them one by one.

use std::net::SocketAddr;

use crate::config::schema::ApiConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("limiter.requests_per_second must be a finite, non-negative number (got {0})")]
    RequestsPerSecond(f64),

    #[error("limiter.sweep_interval_secs must be greater than zero")]
    SweepInterval,

    #[error("limiter.idle_ttl_secs must be greater than zero")]
    IdleTtl,

    #[error("cors.trusted_origins contains an invalid origin `{0}`")]
    TrustedOrigin(String),

    #[error("timeouts.request_secs must be greater than zero")]
    RequestTimeout,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ApiConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let rps = config.limiter.requests_per_second;
    if !rps.is_finite() || rps < 0.0 {
        errors.push(ValidationError::RequestsPerSecond(rps));
    }
    if config.limiter.sweep_interval_secs == 0 {
        errors.push(ValidationError::SweepInterval);
    }
    if config.limiter.idle_ttl_secs == 0 {
        errors.push(ValidationError::IdleTtl);
    }

    // Origins are compared byte-for-byte with the Origin header, so anything
    // with a path, a trailing slash or a wildcard can never match.
    for origin in &config.cors.trusted_origins {
        let valid = !origin.is_empty()
            && !origin.contains('*')
            && !origin.ends_with('/')
            && origin.contains("://");
        if !valid {
            errors.push(ValidationError::TrustedOrigin(origin.clone()));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::RequestTimeout);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
