//! Circuit breakers and health reporting for external service calls.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::GuardConfig;
pub use health::{HealthReport, HealthReporter, HealthStatus};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{BreakerError, BreakerRegistry, CircuitBreaker, CircuitState};
