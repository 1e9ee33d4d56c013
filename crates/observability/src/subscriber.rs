//! `tracing-subscriber` wiring: env filter plus JSON or pretty output.

use tracing_subscriber::EnvFilter;

use iamsync_infra::{LogFormat, LoggingConfig};

/// `RUST_LOG` wins over the configured level; an unparsable level falls back to `info`.
pub fn filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(config: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let installed = match config.format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    if installed.is_ok() {
        tracing::debug!(level = %config.level, format = ?config.format, "tracing initialized");
    }
}
