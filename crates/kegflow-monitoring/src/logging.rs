//! Structured logging module using tracing.

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::MonitoringConfig;

/// Install the global tracing subscriber described by `config`
pub fn init_logging(config: &MonitoringConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .with_context(|| format!("Invalid log filter: {}", config.log_filter))?;

    // JSON logs for production, pretty logs for development
    let json_layer = config.json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let pretty_layer = (!config.json).then(|| {
        fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .context("Failed to set global default subscriber")?;

    info!(
        service_name = %config.service_name,
        log_format = if config.json { "json" } else { "pretty" },
        "Logging initialized"
    );

    Ok(())
}

/// Log the error side of a `Result` on its way through.
///
/// The event carries the error under an `error` field and inherits the
/// caller's span, so flow and tap context come from there.
pub trait LogExt<T, E> {
    /// Log an error at ERROR level
    fn log_err(self, message: &str) -> Result<T, E>;

    /// Log an error at WARN level, for failures the caller recovers from
    fn log_warn(self, message: &str) -> Result<T, E>;
}

impl<T, E: std::fmt::Display> LogExt<T, E> for Result<T, E> {
    fn log_err(self, message: &str) -> Result<T, E> {
        if let Err(e) = &self {
            error!(error = %e, "{}", message);
        }
        self
    }

    fn log_warn(self, message: &str) -> Result<T, E> {
        if let Err(e) = &self {
            warn!(error = %e, "{}", message);
        }
        self
    }
}
