use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::BreakerSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub breakers: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        breakers: state.registry.len(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.registry.snapshots())
}
