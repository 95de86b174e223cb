//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use circuit_guard::config::GuardConfig;
use circuit_guard::health::{HealthReporter, ProbeError, StorageProbe};
use circuit_guard::http::HttpServer;
use circuit_guard::lifecycle::Shutdown;
use circuit_guard::resilience::BreakerRegistry;
use tokio::net::TcpListener;

/// Storage probe whose health can be flipped from the test.
#[derive(Default)]
pub struct SwitchProbe {
    down: AtomicBool,
}

#[allow(dead_code)]
impl SwitchProbe {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let probe = Self::default();
        probe.down.store(true, Ordering::SeqCst);
        Arc::new(probe)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageProbe for SwitchProbe {
    async fn ping(&self) -> Result<(), ProbeError> {
        if self.down.load(Ordering::SeqCst) {
            Err(ProbeError::Connect(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        } else {
            Ok(())
        }
    }
}

/// Operation that counts its invocations and fails or succeeds on demand.
#[allow(dead_code)]
pub fn counting_op(
    calls: &Arc<AtomicU32>,
    succeed: bool,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<&'static str, &'static str>> + Send>> {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if succeed {
                Ok("ok")
            } else {
                Err("upstream error")
            }
        })
    }
}

/// A running server bound to an ephemeral port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<BreakerRegistry>,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the HTTP server with `config` and the given storage probe.
#[allow(dead_code)]
pub async fn start_server(config: GuardConfig, probe: Arc<dyn StorageProbe>) -> TestServer {
    let registry = Arc::new(BreakerRegistry::from_settings(&config.breakers));
    let reporter = Arc::new(
        HealthReporter::from_config(registry.clone(), probe, &config.health).with_version("test"),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, registry.clone(), reporter);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        registry,
        shutdown,
    }
}

#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
