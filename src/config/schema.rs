//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerConfig, BreakerOverrides};

/// Placeholder admin key shipped in the defaults.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root configuration for circuit-guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// HTTP request timeouts.
    pub timeouts: TimeoutConfig,

    /// Circuit breaker defaults and per-service settings.
    pub breakers: BreakerSettings,

    /// Health endpoint settings.
    pub health: HealthConfig,

    /// Storage liveness probe target.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin routes.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time to produce a response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Breaker defaults plus operator overrides per service name.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Default call deadline in milliseconds.
    pub timeout_ms: u64,

    /// Default consecutive failures before opening.
    pub error_threshold: u32,

    /// Default wait before a trial call, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Per-service overrides, keyed by lowercase service name.
    pub services: BTreeMap<String, BreakerOverrides>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let defaults = BreakerConfig::default();
        Self {
            timeout_ms: defaults.timeout.as_millis() as u64,
            error_threshold: defaults.error_threshold,
            reset_timeout_ms: defaults.reset_timeout.as_millis() as u64,
            services: BTreeMap::new(),
        }
    }
}

impl BreakerSettings {
    /// Base config for breakers without per-service settings.
    pub fn defaults(&self) -> BreakerConfig {
        BreakerConfig::new()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_error_threshold(self.error_threshold)
            .with_reset_timeout(Duration::from_millis(self.reset_timeout_ms))
    }

    /// Lowercase every service key, merging entries that differ only in case.
    pub fn normalize_service_names(&mut self) {
        if self.services.keys().all(|name| *name == name.to_lowercase()) {
            return;
        }
        let mut normalized: BTreeMap<String, BreakerOverrides> = BTreeMap::new();
        for (name, overrides) in std::mem::take(&mut self.services) {
            normalized.entry(name.to_lowercase()).or_default().overlay(&overrides);
        }
        self.services = normalized;
    }
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Breakers reported under `checks.<name>`.
    pub monitored: Vec<String>,

    /// Deadline for the storage probe in milliseconds.
    pub probe_timeout_ms: u64,

    /// Version string reported by the endpoint (defaults to the crate version).
    pub version: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            monitored: vec!["anthropic".to_string(), "twilio".to_string()],
            probe_timeout_ms: 2000,
            version: None,
        }
    }
}

/// Storage probe configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database URL (e.g., "postgres://user@db.internal:5432/app").
    pub database_url: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin routes configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount `/admin/*` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: GuardConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.breakers.defaults(), BreakerConfig::default());
        assert_eq!(config.health.monitored, vec!["anthropic", "twilio"]);
        assert!(config.storage.database_url.is_none());
    }

    #[test]
    fn test_service_overrides_parse() {
        let config: GuardConfig = toml::from_str(
            r#"
            [breakers]
            error_threshold = 4

            [breakers.services.anthropic]
            timeout_ms = 30000
            error_threshold = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.breakers.error_threshold, 4);
        assert_eq!(config.breakers.timeout_ms, 10_000);
        let anthropic = &config.breakers.services["anthropic"];
        assert_eq!(anthropic.timeout_ms, Some(30_000));
        assert_eq!(anthropic.error_threshold, Some(3));
        assert_eq!(anthropic.reset_timeout_ms, None);
    }
}
