//! Prometheus metrics for the startup sequence.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};

/// Metrics collector for the bootstrap coordinator.
///
/// Each instance owns its registry so several coordinators (or tests) can
/// coexist in one process.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    phase: IntGauge,
    db_connect_attempts: IntCounter,
    migration_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let phase = IntGauge::new(
            "poi_registry_bootstrap_phase",
            "Current bootstrap phase (0 waiting for db, 1 migrating, 2 serving)",
        )?;
        registry.register(Box::new(phase.clone()))?;

        let db_connect_attempts = IntCounter::new(
            "poi_registry_db_connect_attempts_total",
            "Total number of TCP connect attempts against the database",
        )?;
        registry.register(Box::new(db_connect_attempts.clone()))?;

        let migration_duration = Histogram::with_opts(HistogramOpts::new(
            "poi_registry_migration_duration_seconds",
            "Schema migration duration in seconds",
        ))?;
        registry.register(Box::new(migration_duration.clone()))?;

        Ok(Self {
            registry,
            phase,
            db_connect_attempts,
            migration_duration,
        })
    }

    /// Record the current bootstrap phase ordinal.
    pub fn set_phase(&self, ordinal: i64) {
        self.phase.set(ordinal);
    }

    pub fn phase(&self) -> i64 {
        self.phase.get()
    }

    /// Increment the database connect attempts counter.
    pub fn inc_db_connect_attempts(&self) {
        self.db_connect_attempts.inc();
    }

    pub fn db_connect_attempts(&self) -> u64 {
        self.db_connect_attempts.get()
    }

    /// Record how long the migration step took.
    pub fn observe_migration_duration(&self, duration_secs: f64) {
        self.migration_duration.observe(duration_secs);
    }

    /// Get Prometheus metrics as a string.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
