//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → storage probe → breaker registry → health reporter
//!
//! Shutdown (shutdown.rs):
//!     Trigger → HTTP server stops accepting → in-flight requests drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then services, then listeners
//! - Breakers live for the whole process; nothing tears them down

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_services, Services, StartupError};
