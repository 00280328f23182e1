//! The startup sequence: `WAITING_FOR_DB -> MIGRATING -> SERVING`.

use crate::endpoint::DbEndpoint;
use crate::error::BootstrapError;
use crate::launch::ServerLauncher;
use crate::migrate::MigrationStep;
use crate::phase::Phase;
use crate::wait::{wait_for_database, Probe, TcpProbe, DEFAULT_WAIT_INTERVAL};
use poi_registry_telemetry::Metrics;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Drives one container start through its phases.
///
/// Each stage runs once, in order, and blocks until it finishes. The
/// coordinator holds no database connection of its own.
pub struct Coordinator {
    endpoint: DbEndpoint,
    interval: Duration,
    probe: Box<dyn Probe>,
    migration: Box<dyn MigrationStep>,
    metrics: Metrics,
    phase: Phase,
    db_reachable: bool,
}

impl Coordinator {
    /// Create a coordinator that probes `endpoint` over TCP once per second.
    pub fn new(endpoint: DbEndpoint, migration: Box<dyn MigrationStep>, metrics: Metrics) -> Self {
        metrics.set_phase(Phase::WaitingForDb.ordinal());
        Self {
            endpoint,
            interval: DEFAULT_WAIT_INTERVAL,
            probe: Box::new(TcpProbe::default()),
            migration,
            metrics,
            phase: Phase::WaitingForDb,
            db_reachable: false,
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, to: Phase) -> Result<(), BootstrapError> {
        self.phase = self.phase.advance(to)?;
        self.metrics.set_phase(self.phase.ordinal());
        info!(phase = %self.phase, "Bootstrap phase changed");
        Ok(())
    }

    /// Block until the database accepts connections. Never gives up.
    pub async fn wait_for_db(&mut self) -> Result<u64, BootstrapError> {
        if self.phase != Phase::WaitingForDb {
            return Err(BootstrapError::InvalidTransition {
                from: self.phase,
                to: Phase::WaitingForDb,
            });
        }
        let attempts =
            wait_for_database(self.probe.as_ref(), &self.endpoint, self.interval, &self.metrics).await;
        self.db_reachable = true;
        Ok(attempts)
    }

    /// Run the migration step once. Must follow a completed
    /// [`Self::wait_for_db`].
    pub async fn migrate(&mut self) -> Result<(), BootstrapError> {
        if !self.db_reachable {
            return Err(BootstrapError::DatabaseNotReached);
        }
        self.advance(Phase::Migrating)?;
        info!(migration = %self.migration.describe(), "Applying migrations");

        let started = Instant::now();
        let result = self.migration.run().await;
        self.metrics
            .observe_migration_duration(started.elapsed().as_secs_f64());

        match &result {
            Ok(()) => info!("Migrations applied"),
            Err(e) => error!(error = %e, "Migrations failed, server will not start"),
        }
        result
    }

    /// Launch the server in the foreground. Must follow [`Self::migrate`].
    pub async fn serve(&mut self, server: &dyn ServerLauncher) -> Result<i32, BootstrapError> {
        self.advance(Phase::Serving)?;
        info!(server = %server.describe(), "Starting server");
        server.launch().await
    }

    /// Wait for the database, migrate, then serve. Returns the server's
    /// exit code.
    pub async fn run(mut self, server: &dyn ServerLauncher) -> Result<i32, BootstrapError> {
        self.wait_for_db().await?;
        self.migrate().await?;
        self.serve(server).await
    }
}
