//! circuit-guard service.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                circuit-guard                  │
//!                        │                                               │
//!   GET /api/health      │  ┌────────┐    ┌──────────┐    ┌───────────┐ │
//!   ─────────────────────┼─▶│  http  │───▶│  health  │───▶│  storage  │─┼──▶ Database
//!                        │  │ server │    │ reporter │    │   probe   │ │
//!                        │  └────────┘    └────┬─────┘    └───────────┘ │
//!                        │                     │ read-only              │
//!                        │                     ▼                        │
//!   LLM / SMS callers    │              ┌──────────────┐                │
//!   ─────────────────────┼─────────────▶│   breaker    │────────────────┼──▶ External
//!                        │              │   registry   │                │    services
//!                        │              └──────────────┘                │
//!                        │                                               │
//!                        │   config · observability · lifecycle          │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use circuit_guard::config;
use circuit_guard::http::HttpServer;
use circuit_guard::lifecycle::{build_services, Shutdown};
use circuit_guard::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "circuit-guard", version, about = "Circuit breakers and health reporting for external calls")]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted
    #[arg(short, long, env = "CIRCUIT_GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = config::load(args.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!("circuit-guard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        config_file = ?args.config,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = build_services(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config, services.registry, services.reporter);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
