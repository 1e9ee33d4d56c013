//! Process-wide tracing setup.

use iamsync_infra::{LogFormat, LoggingConfig};

pub mod subscriber;

/// Install the global subscriber described by `config`.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    subscriber::init(config);
}

/// JSON logs at `info`, overridable through `RUST_LOG`.
pub fn init_default() {
    subscriber::init(&LoggingConfig {
        level: "info".to_string(),
        format: LogFormat::Json,
    });
}
