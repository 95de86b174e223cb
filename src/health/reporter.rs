//! Aggregate health reporting.
//!
//! # Responsibilities
//! - Probe storage liveness with a bounded deadline
//! - Read (never mutate) the state of monitored breakers
//! - Fold both into one status for the health endpoint
//!
//! # Design Decisions
//! - `check_health` never fails; every probe error becomes a status field
//! - Storage failure is `unhealthy`; any non-closed breaker is `degraded`
//! - A breaker nobody has used yet reports `not_initialized` and counts as healthy

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::config::HealthConfig;
use crate::health::probe::StorageProbe;
use crate::observability::metrics;
use crate::resilience::timeouts::{run_with_deadline, DeadlineOutcome};
use crate::resilience::{BreakerRegistry, CircuitState};

/// Coarse health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    /// 503 for unhealthy, 200 otherwise.
    pub fn http_status(&self) -> StatusCode {
        match self {
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::OK,
        }
    }
}

/// Breaker state as shown on the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitReport {
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "half-open")]
    HalfOpen,
    #[serde(rename = "not_initialized")]
    NotInitialized,
}

impl From<CircuitState> for CircuitReport {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => CircuitReport::Closed,
            CircuitState::Open => CircuitReport::Open,
            CircuitState::HalfOpen => CircuitReport::HalfOpen,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseCheck {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: HealthStatus,
    pub circuit_state: CircuitReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub database: DatabaseCheck,
    /// One entry per monitored breaker, keyed by service name.
    #[serde(flatten)]
    pub services: BTreeMap<String, ServiceCheck>,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// ISO-8601, UTC, millisecond precision.
    pub timestamp: String,
    pub version: String,
    pub checks: HealthChecks,
}

/// Builds health reports from a storage probe and the breaker registry.
pub struct HealthReporter {
    registry: Arc<BreakerRegistry>,
    storage: Arc<dyn StorageProbe>,
    monitored: Vec<String>,
    probe_timeout: Duration,
    version: String,
}

impl HealthReporter {
    pub fn new(
        registry: Arc<BreakerRegistry>,
        storage: Arc<dyn StorageProbe>,
        monitored: Vec<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            storage,
            monitored,
            probe_timeout,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn from_config(
        registry: Arc<BreakerRegistry>,
        storage: Arc<dyn StorageProbe>,
        config: &HealthConfig,
    ) -> Self {
        let reporter = Self::new(
            registry,
            storage,
            config.monitored.clone(),
            Duration::from_millis(config.probe_timeout_ms),
        );
        match &config.version {
            Some(version) => reporter.with_version(version.clone()),
            None => reporter,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Produce a point-in-time report. Never fails.
    pub async fn check_health(&self) -> HealthReport {
        let database = self.check_database().await;
        let services: BTreeMap<_, _> = self
            .monitored
            .iter()
            .map(|name| (name.clone(), self.check_service(name)))
            .collect();

        let status = if database.status != HealthStatus::Healthy {
            HealthStatus::Unhealthy
        } else if services.values().any(|s| s.status != HealthStatus::Healthy) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        metrics::record_health_check(status.as_str());
        if status != HealthStatus::Healthy {
            tracing::warn!(status = status.as_str(), "Health check not healthy");
        }

        HealthReport {
            status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            version: self.version.clone(),
            checks: HealthChecks { database, services },
        }
    }

    async fn check_database(&self) -> DatabaseCheck {
        let probe = Arc::clone(&self.storage);
        let started = Instant::now();
        let outcome = run_with_deadline(self.probe_timeout, async move { probe.ping().await }).await;
        let elapsed = started.elapsed();

        let error = match outcome {
            DeadlineOutcome::Completed(Ok(())) => {
                metrics::record_storage_latency(elapsed);
                return DatabaseCheck {
                    status: HealthStatus::Healthy,
                    latency_ms: Some(elapsed.as_millis() as u64),
                    error: None,
                };
            }
            DeadlineOutcome::Completed(Err(e)) => e.to_string(),
            DeadlineOutcome::Panicked(_) => "storage probe panicked".to_string(),
            DeadlineOutcome::Cancelled => "storage probe cancelled".to_string(),
            DeadlineOutcome::Elapsed => {
                format!("storage probe timed out after {}ms", self.probe_timeout.as_millis())
            }
        };

        tracing::warn!(error = %error, "Storage probe failed");
        DatabaseCheck {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some(error),
        }
    }

    fn check_service(&self, name: &str) -> ServiceCheck {
        match self.registry.get(name) {
            Some(breaker) => {
                let state = breaker.state();
                ServiceCheck {
                    status: if state == CircuitState::Closed {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Degraded
                    },
                    circuit_state: state.into(),
                }
            }
            None => ServiceCheck {
                status: HealthStatus::Healthy,
                circuit_state: CircuitReport::NotInitialized,
            },
        }
    }
}
