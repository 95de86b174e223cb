//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Serve the health endpoint
//! - Mount admin routes when enabled
//! - Bind server to listener and shut down gracefully

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::{AdminConfig, GuardConfig};
use crate::health::{HealthReport, HealthReporter};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::resilience::BreakerRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<BreakerRegistry>,
    pub reporter: Arc<HealthReporter>,
    pub admin: AdminConfig,
}

/// HTTP server exposing health and admin endpoints.
pub struct HttpServer {
    router: Router,
    config: GuardConfig,
}

impl HttpServer {
    /// Create a new HTTP server around already-built services.
    pub fn new(config: GuardConfig, registry: Arc<BreakerRegistry>, reporter: Arc<HealthReporter>) -> Self {
        let state = AppState {
            registry,
            reporter,
            admin: config.admin.clone(),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, state: AppState) -> Router {
        let mut router = Router::new().route("/api/health", get(health_handler));
        if config.admin.enabled {
            router = router.merge(admin::routes(state.clone()));
        }

        router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id(request.headers()),
                    )
                }))
                .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                .layer(propagate_request_id_layer()),
        )
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            admin_enabled = self.config.admin.enabled,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}

/// `GET /api/health`: 503 when unhealthy, 200 otherwise.
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.reporter.check_health().await;
    (report.status.http_status(), Json(report))
}
