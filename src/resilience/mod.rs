//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an external service (LLM, SMS, ...):
//!     → registry.rs (look up the breaker for the service name)
//!     → circuit_breaker.rs (admit, or fail fast while open)
//!     → timeouts.rs (run the call on its own task under a deadline)
//!     → circuit_breaker.rs (record exactly one outcome)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every guarded call has a deadline
//! - Circuit breaker prevents cascading failures
//! - No retries here; callers apply their own backoff on `BreakerError::Open`

pub mod circuit_breaker;
pub mod registry;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerConfig, BreakerError, BreakerOverrides, BreakerSnapshot, CircuitBreaker, CircuitState,
};
pub use registry::BreakerRegistry;
