//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, health reporter and HTTP layer produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (breaker, state, failures) on every breaker event
//! - Request ID flows through the HTTP layer
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
