//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Check that the heartbeat timings are coherent
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::RelayConfig;
use crate::store::MAX_TTL_SECS;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }

    if config.channels.default_channel.trim().is_empty() {
        errors.push(ValidationError::new("channels.default_channel", "must not be empty"));
    }
    if config.channels.preload.iter().any(|c| c.trim().is_empty()) {
        errors.push(ValidationError::new("channels.preload", "channel names must not be empty"));
    }

    let hb = &config.heartbeat;
    if hb.timeout_secs == 0 {
        errors.push(ValidationError::new("heartbeat.timeout_secs", "must be > 0"));
    }
    if hb.ping_interval_secs == 0 {
        errors.push(ValidationError::new("heartbeat.ping_interval_secs", "must be > 0"));
    } else if hb.ping_interval_secs >= hb.timeout_secs {
        errors.push(ValidationError::new(
            "heartbeat.ping_interval_secs",
            "must be shorter than heartbeat.timeout_secs",
        ));
    }
    if hb.handshake_timeout_secs == 0 {
        errors.push(ValidationError::new("heartbeat.handshake_timeout_secs", "must be > 0"));
    }
    if hb.sweep_interval_ms == 0 {
        errors.push(ValidationError::new("heartbeat.sweep_interval_ms", "must be > 0"));
    }

    for (field, ttl) in [
        ("store.message_ttl_secs", config.store.message_ttl_secs),
        ("store.emergency_ttl_secs", config.store.emergency_ttl_secs),
    ] {
        if ttl > MAX_TTL_SECS {
            errors.push(ValidationError::new(field, format!("must be <= {MAX_TTL_SECS}")));
        }
    }

    if config.limits.max_frame_bytes == 0 {
        errors.push(ValidationError::new("limits.max_frame_bytes", "must be > 0"));
    }
    if config.limits.read_buffer_bytes == 0 {
        errors.push(ValidationError::new("limits.read_buffer_bytes", "must be > 0"));
    }
    if config.limits.outbound_buffer == 0 {
        errors.push(ValidationError::new("limits.outbound_buffer", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("'{}' is not a socket address", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&RelayConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_error() {
        let mut config = RelayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.heartbeat.timeout_secs = 0;
        config.channels.default_channel = "  ".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"heartbeat.timeout_secs"));
        assert!(fields.contains(&"channels.default_channel"));
        // ping interval (10) is no longer shorter than the zero timeout
        assert!(fields.contains(&"heartbeat.ping_interval_secs"));
    }

    #[test]
    fn store_ttls_are_bounded() {
        let mut config = RelayConfig::default();
        config.store.message_ttl_secs = u64::MAX;
        config.store.emergency_ttl_secs = MAX_TTL_SECS + 1;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, ["store.message_ttl_secs", "store.emergency_ttl_secs"]);

        config.store.message_ttl_secs = MAX_TTL_SECS;
        config.store.emergency_ttl_secs = MAX_TTL_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn admin_address_only_checked_when_enabled() {
        let mut config = RelayConfig::default();
        config.admin.bind_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "admin.bind_address");
    }
}
