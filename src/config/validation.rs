//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (counts and timeouts > 0, percentages <= 100)
//! - Validate addresses parse before any process is forked
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClusterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ClusterConfig;

/// Upper bound for `cluster.refork_max_delay_ms` (one hour).
pub const MAX_REFORK_DELAY_MS: u64 = 60 * 60 * 1000;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("cluster.workers must be at least 1")]
    NoWorkers,

    #[error("cluster.minimum_health_percent must be between 0 and 100, got {0}")]
    HealthPercentOutOfRange(u32),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("cluster.refork_base_delay_ms ({base}) must not exceed cluster.refork_max_delay_ms ({max})")]
    ReforkDelayOrder { base: u64, max: u64 },

    #[error("cluster.refork_max_delay_ms must be at most {limit}, got {0}", limit = MAX_REFORK_DELAY_MS)]
    ReforkDelayTooLarge(u64),

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ClusterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.cluster.workers == 0 {
        errors.push(ValidationError::NoWorkers);
    }
    if config.cluster.minimum_health_percent > 100 {
        errors.push(ValidationError::HealthPercentOutOfRange(
            config.cluster.minimum_health_percent,
        ));
    }

    let durations = [
        ("cluster.shutdown_timeout_ms", config.cluster.shutdown_timeout_ms),
        ("cluster.refork_base_delay_ms", config.cluster.refork_base_delay_ms),
        ("cluster.refork_max_delay_ms", config.cluster.refork_max_delay_ms),
        ("worker.disconnect_delay_ms", config.worker.disconnect_delay_ms),
        ("worker.force_shutdown_timeout_ms", config.worker.force_shutdown_timeout_ms),
        ("worker.drain_poll_interval_ms", config.worker.drain_poll_interval_ms),
        ("worker.memory_check_interval_ms", config.worker.memory_check_interval_ms),
        ("server.request_timeout_secs", config.server.request_timeout_secs),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration(field));
        }
    }

    let (base, max) = (config.cluster.refork_base_delay_ms, config.cluster.refork_max_delay_ms);
    if base > max {
        errors.push(ValidationError::ReforkDelayOrder { base, max });
    }
    if max > MAX_REFORK_DELAY_MS {
        errors.push(ValidationError::ReforkDelayTooLarge(max));
    }

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "server.bind_address",
            value: config.server.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
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
    fn default_config_is_valid() {
        assert!(validate_config(&ClusterConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ClusterConfig::default();
        config.cluster.workers = 0;
        config.worker.disconnect_delay_ms = 0;
        config.server.bind_address = "not-an-address".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::NoWorkers));
        assert!(errors.contains(&ValidationError::ZeroDuration("worker.disconnect_delay_ms")));
    }

    #[test]
    fn rejects_inverted_or_absurd_refork_delays() {
        let mut config = ClusterConfig::default();
        config.cluster.refork_base_delay_ms = 10_000;
        config.cluster.refork_max_delay_ms = 1_000;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::ReforkDelayOrder { base: 10_000, max: 1_000 }]
        );

        config.cluster.refork_base_delay_ms = 100;
        config.cluster.refork_max_delay_ms = u64::MAX;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::ReforkDelayTooLarge(u64::MAX)]
        );
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = ClusterConfig::default();
        config.observability.metrics_address = "bogus".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
