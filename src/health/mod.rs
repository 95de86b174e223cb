//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET /api/health
//!     → reporter.rs
//!         → probe.rs (storage liveness, bounded by probe_timeout)
//!         → breaker registry (read-only state of monitored breakers)
//!     → HealthReport (healthy | degraded | unhealthy)
//! ```
//!
//! # Design Decisions
//! - Health reporting is off the execution path; it only reads breaker state
//! - The endpoint must always answer, so every probe failure is folded into the report
//! - Storage failure is fatal (503); open breakers only degrade (200)

pub mod probe;
pub mod reporter;

pub use probe::{probe_from_config, ProbeError, StorageProbe, TcpStorageProbe, UnconfiguredProbe};
pub use reporter::{
    CircuitReport, DatabaseCheck, HealthChecks, HealthReport, HealthReporter, HealthStatus, ServiceCheck,
};
