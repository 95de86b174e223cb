//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (assign request ID, echo it on the response)
//!     → /api/health handler → health reporter
//!     → /admin/* handlers (bearer auth) → breaker registry
//! ```

pub mod request;
pub mod server;

pub use request::{request_id, MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
