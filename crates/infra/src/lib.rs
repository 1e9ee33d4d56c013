//! Infrastructure layer: store contracts, in-memory backends, configuration.

pub mod config;
pub mod store;

pub use config::{AppConfig, AuthConfig, ConfigError, LogFormat, LoggingConfig, SyncConfig};
