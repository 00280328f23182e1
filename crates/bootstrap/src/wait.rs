//! Dependency-wait loop: block until the database accepts TCP connections.

use crate::endpoint::DbEndpoint;
use async_trait::async_trait;
use poi_registry_telemetry::Metrics;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

/// Delay between connection attempts.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// One reachability check against the database endpoint.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, endpoint: &DbEndpoint) -> io::Result<()>;
}

/// Probe that completes a TCP handshake and drops the connection.
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, endpoint: &DbEndpoint) -> io::Result<()> {
        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        match timeout(self.connect_timeout, connect).await {
            Ok(stream) => stream.map(drop),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", self.connect_timeout),
            )),
        }
    }
}

/// Probe `endpoint` every `interval` until it answers.
///
/// There is no attempt limit: an endpoint that never comes up keeps the
/// caller here until the process is killed. Returns the number of attempts.
pub async fn wait_for_database(
    probe: &dyn Probe,
    endpoint: &DbEndpoint,
    interval: Duration,
    metrics: &Metrics,
) -> u64 {
    info!(%endpoint, "Waiting for database");
    let mut attempts = 0u64;

    loop {
        attempts += 1;
        metrics.inc_db_connect_attempts();

        match probe.probe(endpoint).await {
            Ok(()) => {
                info!(%endpoint, attempts, "Database is accepting connections");
                return attempts;
            }
            Err(e) => {
                debug!(%endpoint, attempts, error = %e, "Database not reachable yet");
            }
        }

        sleep(interval).await;
    }
}
