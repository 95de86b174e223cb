//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Validate addresses and the storage URL
//! - Reject health check names that collide with built-in checks
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs after environment overrides, before config is accepted

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{GuardConfig, PLACEHOLDER_API_KEY};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: must be greater than zero")]
    NotPositive { field: String },

    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: String, value: String },

    #[error("{field}: unknown log level {value:?}")]
    InvalidLogLevel { field: String, value: String },

    #[error("storage.database_url: {0}")]
    InvalidDatabaseUrl(String),

    #[error("health.monitored: {0:?} is listed more than once")]
    DuplicateMonitor(String),

    #[error("health.monitored: {0:?} is reserved")]
    ReservedMonitor(String),

    #[error("admin.api_key: the placeholder key must be replaced when admin routes are enabled")]
    PlaceholderApiKey,
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_positive(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);

    let breakers = &config.breakers;
    check_positive(&mut errors, "breakers.timeout_ms", breakers.timeout_ms);
    check_positive(&mut errors, "breakers.error_threshold", breakers.error_threshold.into());
    check_positive(&mut errors, "breakers.reset_timeout_ms", breakers.reset_timeout_ms);

    for (name, overrides) in &breakers.services {
        let prefix = format!("breakers.services.{name}");
        if let Some(ms) = overrides.timeout_ms {
            check_positive(&mut errors, &format!("{prefix}.timeout_ms"), ms);
        }
        if let Some(threshold) = overrides.error_threshold {
            check_positive(&mut errors, &format!("{prefix}.error_threshold"), threshold.into());
        }
        if let Some(ms) = overrides.reset_timeout_ms {
            check_positive(&mut errors, &format!("{prefix}.reset_timeout_ms"), ms);
        }
    }

    check_positive(&mut errors, "health.probe_timeout_ms", config.health.probe_timeout_ms);
    let mut seen = HashSet::new();
    for name in &config.health.monitored {
        if name == "database" {
            errors.push(ValidationError::ReservedMonitor(name.clone()));
        } else if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateMonitor(name.clone()));
        }
    }

    if let Some(url) = &config.storage.database_url {
        match Url::parse(url) {
            Ok(parsed) if parsed.host_str().is_none() => {
                errors.push(ValidationError::InvalidDatabaseUrl("missing host".to_string()));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidDatabaseUrl(e.to_string())),
        }
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::InvalidLogLevel {
            field: "observability.log_level".to_string(),
            value: observability.log_level.clone(),
        });
    }
    if observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &observability.metrics_address);
    }

    if config.admin.enabled && config.admin.api_key == PLACEHOLDER_API_KEY {
        errors.push(ValidationError::PlaceholderApiKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::NotPositive {
            field: field.to_string(),
        });
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::BreakerOverrides;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&GuardConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = GuardConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.breakers.error_threshold = 0;
        config
            .breakers
            .services
            .insert("twilio".to_string(), BreakerOverrides::new().timeout_ms(0));
        config.observability.log_level = "loud".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::NotPositive {
            field: "breakers.services.twilio.timeout_ms".to_string(),
        }));
    }

    #[test]
    fn test_monitor_names() {
        let mut config = GuardConfig::default();
        config.health.monitored = vec!["database".into(), "sms".into(), "sms".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ReservedMonitor("database".into()),
                ValidationError::DuplicateMonitor("sms".into()),
            ]
        );
    }

    #[test]
    fn test_database_url() {
        let mut config = GuardConfig::default();
        config.storage.database_url = Some("not a url".to_string());
        assert!(matches!(
            validate_config(&config).unwrap_err()[..],
            [ValidationError::InvalidDatabaseUrl(_)]
        ));

        config.storage.database_url = Some("postgres://app@db.internal/app".to_string());
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_admin_placeholder_key() {
        let mut config = GuardConfig::default();
        config.admin.enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::PlaceholderApiKey])
        );

        config.admin.api_key = "s3cret".to_string();
        assert_eq!(validate_config(&config), Ok(()));
    }
}
