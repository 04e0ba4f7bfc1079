//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (connection limits, addresses)
//! - Validate the context path shape
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use crate::config::schema::AppConfig;
use crate::routing::ContextPath;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("context_path must start with '/' (got '{0}')")]
    ContextPathNotAbsolute(String),

    #[error("listener.host must be an IP address (got '{0}')")]
    InvalidHost(String),

    #[error("listener.max_connections must be greater than 0")]
    ZeroMaxConnections,

    #[error("observability.metrics_address is not a socket address (got '{0}')")]
    InvalidMetricsAddress(String),
}

/// Check a configuration, collecting every violation.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Same rule the listener applies at startup.
    if let Err(invalid) = ContextPath::new(config.context_path.as_str()) {
        errors.push(ValidationError::ContextPathNotAbsolute(invalid.0));
    }

    if config.listener.host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidHost(config.listener.host.clone()));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
