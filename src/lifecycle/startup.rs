//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the storage probe from validated config
//! - Construct the process-wide breaker registry
//! - Construct the health reporter over both
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - One registry per process, handed out by `Arc`

use std::sync::Arc;
use std::time::Duration;

use crate::config::GuardConfig;
use crate::health::{probe_from_config, HealthReporter, ProbeError};
use crate::resilience::BreakerRegistry;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("storage probe: {0}")]
    Probe(#[from] ProbeError),
}

/// Shared services built at startup.
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<BreakerRegistry>,
    pub reporter: Arc<HealthReporter>,
}

/// Build the registry and health reporter described by `config`.
pub fn build_services(config: &GuardConfig) -> Result<Services, StartupError> {
    let probe_timeout = Duration::from_millis(config.health.probe_timeout_ms);
    let probe = probe_from_config(&config.storage, probe_timeout)?;

    let registry = Arc::new(BreakerRegistry::from_settings(&config.breakers));
    let reporter = Arc::new(HealthReporter::from_config(registry.clone(), probe, &config.health));

    tracing::info!(
        default_timeout_ms = config.breakers.timeout_ms,
        default_error_threshold = config.breakers.error_threshold,
        default_reset_timeout_ms = config.breakers.reset_timeout_ms,
        configured_services = config.breakers.services.len(),
        monitored = ?config.health.monitored,
        "Services initialized"
    );

    Ok(Services { registry, reporter })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::BreakerOverrides;

    #[test]
    fn test_registry_uses_configured_services() {
        let mut config = GuardConfig::default();
        config.breakers.error_threshold = 7;
        config
            .breakers
            .services
            .insert("anthropic".to_string(), BreakerOverrides::new().error_threshold(3));

        let services = build_services(&config).unwrap();
        assert!(services.registry.is_empty());
        assert_eq!(services.registry.get_or_create("anthropic", None).config().error_threshold, 3);
        assert_eq!(services.registry.get_or_create("twilio", None).config().error_threshold, 7);
    }

    #[test]
    fn test_invalid_database_url_fails() {
        let mut config = GuardConfig::default();
        config.storage.database_url = Some("nonsense".to_string());
        assert!(matches!(build_services(&config), Err(StartupError::Probe(_))));
    }
}
