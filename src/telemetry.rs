//! Structured logging for plugin processes.
//!
//! Stdout carries the protocol, so every event goes to stderr.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Filter used when neither an explicit filter nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "warn";

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Install the global stderr subscriber on first call.
///
/// The filter is `filter` when given, else `RUST_LOG`, else
/// [`DEFAULT_LOG_FILTER`]. Later calls return a handle without touching
/// the global state.
///
/// # Examples
///
/// ```rust
/// use formatwire_plugin::telemetry;
///
/// # fn main() -> Result<(), telemetry::TelemetryError> {
/// let first = telemetry::initialise(Some("debug"))?;
/// let second = telemetry::initialise(None)?;
/// drop(first);
/// drop(second);
/// # Ok(())
/// # }
/// ```
pub fn initialise(filter: Option<&str>) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(filter))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(filter: Option<&str>) -> Result<(), TelemetryError> {
    let filter = build_filter(filter)?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

fn build_filter(filter: Option<&str>) -> Result<EnvFilter, TelemetryError> {
    match filter {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|error| TelemetryError::Filter(error.to_string()))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}
