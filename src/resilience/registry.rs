//! Named breaker registry.
//!
//! # Responsibilities
//! - Hand out exactly one breaker per service name
//! - Build breakers lazily on first lookup
//! - Layer operator-configured settings over call-site settings
//!
//! # Design Decisions
//! - Constructed once at startup and shared via `Arc`, never a global
//! - Creation goes through the map's entry API, so concurrent first lookups
//!   agree on a single instance
//! - First writer wins; a later lookup asking for a different config is logged

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::BreakerSettings;
use crate::resilience::circuit_breaker::{
    BreakerConfig, BreakerError, BreakerOverrides, BreakerSnapshot, CircuitBreaker,
};

/// Process-wide map of service name to circuit breaker.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    defaults: BreakerConfig,
    /// Operator settings per service name; these beat call-site overrides.
    configured: HashMap<String, BreakerOverrides>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Service names are case-insensitive; `configured` keys are lowercased.
    pub fn new(defaults: BreakerConfig, configured: HashMap<String, BreakerOverrides>) -> Self {
        let mut normalized: HashMap<String, BreakerOverrides> = HashMap::new();
        for (name, overrides) in configured {
            normalized.entry(name.to_lowercase()).or_default().overlay(&overrides);
        }
        Self {
            defaults,
            configured: normalized,
            breakers: DashMap::new(),
        }
    }

    /// Build a registry from the `[breakers]` config section.
    pub fn from_settings(settings: &BreakerSettings) -> Self {
        let configured = settings
            .services
            .iter()
            .map(|(name, overrides)| (name.clone(), overrides.clone()))
            .collect();
        Self::new(settings.defaults(), configured)
    }

    /// Config a new breaker named `name` would get.
    pub fn effective_config(&self, name: &str, overrides: Option<&BreakerOverrides>) -> BreakerConfig {
        let mut config = self.defaults;
        if let Some(overrides) = overrides {
            config = config.merged(overrides);
        }
        if let Some(configured) = self.configured.get(&name.to_lowercase()) {
            config = config.merged(configured);
        }
        config
    }

    /// Return the breaker for `name`, creating it on first use.
    ///
    /// `overrides` only take effect when this call creates the breaker.
    pub fn get_or_create(&self, name: &str, overrides: Option<&BreakerOverrides>) -> Arc<CircuitBreaker> {
        let name = name.to_lowercase();
        let requested = self.effective_config(&name, overrides);
        let mut created = false;

        let breaker = {
            let entry = self.breakers.entry(name.clone()).or_insert_with(|| {
                created = true;
                Arc::new(CircuitBreaker::new(name.as_str(), requested))
            });
            Arc::clone(entry.value())
        };

        if created {
            tracing::info!(
                breaker = %name,
                timeout_ms = requested.timeout.as_millis() as u64,
                error_threshold = requested.error_threshold,
                reset_timeout_ms = requested.reset_timeout.as_millis() as u64,
                "Circuit breaker created"
            );
        } else if *breaker.config() != requested {
            tracing::warn!(
                breaker = %name,
                existing = ?breaker.config(),
                requested = ?requested,
                "Breaker already exists with a different config; keeping the existing one"
            );
        }

        breaker
    }

    /// Look up a breaker without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .get(&name.to_lowercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Run `operation` through the breaker for `name`.
    pub async fn execute<F, Fut, T, E>(
        &self,
        name: &str,
        overrides: Option<&BreakerOverrides>,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let breaker = self.get_or_create(name, overrides);
        breaker.execute(operation).await
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
