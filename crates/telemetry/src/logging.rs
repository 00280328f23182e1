//! Structured logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pick the log filter directive.
///
/// An explicit level wins, then `RUST_LOG`, then `debug` when the service
/// runs with `DEBUG` enabled, then `info`.
pub fn resolve_filter(log_level: Option<&str>, debug: bool) -> EnvFilter {
    if let Some(level) = log_level {
        return EnvFilter::new(level);
    }

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

/// Initialize structured JSON logging.
///
/// # Arguments
/// * `log_level` - Optional log level override (e.g., "info", "debug", "error")
/// * `debug` - Whether the application's `DEBUG` toggle is on
pub fn init_logging(log_level: Option<&str>, debug: bool) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(resolve_filter(log_level, debug))
        .with(fmt::layer().json())
        .try_init()?;

    Ok(())
}
