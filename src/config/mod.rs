//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → env.rs (CIRCUIT_BREAKER_*, DATABASE_URL overrides)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → handed to startup, which builds the registry and reporter
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; breakers keep the settings they were built with
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::{
    AdminConfig, BreakerSettings, GuardConfig, HealthConfig, ListenerConfig, ObservabilityConfig,
    StorageConfig, TimeoutConfig,
};
pub use validation::ValidationError;
