//! Observability for the POI registry service: structured logging and
//! bootstrap metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, resolve_filter};
pub use metrics::Metrics;
