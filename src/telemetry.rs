//! Logging setup.
//!
//! Installs a global `tracing` subscriber with an [`EnvFilter`] so verbosity
//! is controlled by `RUST_LOG`, falling back to `info`. Output format is
//! selected by `TURNPIKE_LOG_FORMAT` (`pretty` for development, `json` for
//! shipping to a log pipeline). Initialization is idempotent: embedders that
//! already installed their own subscriber keep it.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Read `TURNPIKE_LOG_FORMAT`; unknown values fall back to pretty.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("TURNPIKE_LOG_FORMAT").ok().as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

static INIT: OnceCell<()> = OnceCell::new();

/// Install the global subscriber using the environment's format and filter.
pub fn init_logging() {
    init_logging_with_format(LogFormat::from_env());
}

/// Install the global subscriber with an explicit format.
///
/// Only the first call in the process does anything; later calls (and calls
/// in processes that already have a subscriber) are no-ops.
pub fn init_logging_with_format(format: LogFormat) {
    INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true);
        let result = match format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
        // Err means another subscriber won the race; that one stays.
        let _ = result;
    });
}
