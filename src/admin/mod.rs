//! Admin routes for breaker diagnostics.
//!
//! Mounted only when `admin.enabled`; every route requires
//! `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
