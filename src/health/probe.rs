//! Storage liveness probes.
//!
//! # Responsibilities
//! - Define the probe contract consumed by the health reporter
//! - Check that the database host accepts connections
//!
//! # Design Decisions
//! - The persistence layer stays opaque; reachability is all we measure
//! - A missing `DATABASE_URL` is reported as a failing probe, not a startup error

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use url::Url;

use crate::config::StorageConfig;

const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Error reported by a storage probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("DATABASE_URL environment variable is not set")]
    NotConfigured,

    #[error("invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("connection timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Liveness check against the storage backend.
#[async_trait]
pub trait StorageProbe: Send + Sync {
    async fn ping(&self) -> Result<(), ProbeError>;
}

/// Probe used when no database URL is configured. Always fails.
#[derive(Debug, Default)]
pub struct UnconfiguredProbe;

#[async_trait]
impl StorageProbe for UnconfiguredProbe {
    async fn ping(&self) -> Result<(), ProbeError> {
        Err(ProbeError::NotConfigured)
    }
}

/// Opens (and immediately closes) a TCP connection to the database host.
#[derive(Debug, Clone)]
pub struct TcpStorageProbe {
    target: String,
    connect_timeout: Duration,
}

impl TcpStorageProbe {
    /// Build a probe from a URL such as `postgres://user@host:5432/db`.
    /// The port defaults to 5432.
    pub fn from_url(url: &str, connect_timeout: Duration) -> Result<Self, ProbeError> {
        let parsed = Url::parse(url).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ProbeError::InvalidUrl("missing host".to_string()))?;
        let port = parsed.port().unwrap_or(DEFAULT_POSTGRES_PORT);

        Ok(Self {
            target: format!("{host}:{port}"),
            connect_timeout,
        })
    }

    /// `host:port` the probe connects to.
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl StorageProbe for TcpStorageProbe {
    async fn ping(&self) -> Result<(), ProbeError> {
        let connect = TcpStream::connect(&self.target);
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Connect(e)),
            Err(_) => Err(ProbeError::Timeout(self.connect_timeout)),
        }
    }
}

/// Pick the probe for the `[storage]` section.
pub fn probe_from_config(
    storage: &StorageConfig,
    connect_timeout: Duration,
) -> Result<Arc<dyn StorageProbe>, ProbeError> {
    match &storage.database_url {
        Some(url) => {
            let probe = TcpStorageProbe::from_url(url, connect_timeout)?;
            tracing::info!(target_addr = %probe.target(), "Storage probe configured");
            Ok(Arc::new(probe))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; health checks will report storage as unhealthy");
            Ok(Arc::new(UnconfiguredProbe))
        }
    }
}
