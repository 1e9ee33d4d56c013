//! Process configuration loaded from `IAMSYNC_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use iamsync_auth::TokenPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("expected json or pretty, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub token_issuer: String,
    /// Budget for the detached post-login "last seen" write.
    pub last_seen_timeout: Duration,
}

impl AuthConfig {
    /// Issuer name and lifetimes handed to the token issuer.
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            issuer: self.token_issuer.clone(),
            access_ttl: self.access_token_ttl,
            refresh_ttl: self.refresh_token_ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Upper bound on screen instances enumerated for the screens bucket.
    pub screen_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub sync: SyncConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Json,
            },
            auth: AuthConfig {
                access_token_ttl: Duration::from_secs(900),
                refresh_token_ttl: Duration::from_secs(7 * 24 * 3600),
                token_issuer: "iamsync".to_string(),
                last_seen_timeout: Duration::from_millis(5000),
            },
            sync: SyncConfig { screen_limit: 1000 },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(env) = lookup("IAMSYNC_ENV") {
            cfg.environment = env;
        }
        if let Some(level) = lookup("IAMSYNC_LOG_LEVEL") {
            cfg.logging.level = level;
        }
        if let Some(format) = parse(&lookup, "IAMSYNC_LOG_FORMAT")? {
            cfg.logging.format = format;
        }
        if let Some(secs) = parse::<u64>(&lookup, "IAMSYNC_ACCESS_TOKEN_TTL_SECS")? {
            cfg.auth.access_token_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "IAMSYNC_REFRESH_TOKEN_TTL_SECS")? {
            cfg.auth.refresh_token_ttl = Duration::from_secs(secs);
        }
        if let Some(issuer) = lookup("IAMSYNC_TOKEN_ISSUER") {
            if issuer.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "IAMSYNC_TOKEN_ISSUER",
                    reason: "must not be empty".to_string(),
                });
            }
            cfg.auth.token_issuer = issuer;
        }
        if let Some(ms) = parse::<u64>(&lookup, "IAMSYNC_LAST_SEEN_TIMEOUT_MS")? {
            cfg.auth.last_seen_timeout = Duration::from_millis(ms);
        }
        if let Some(limit) = parse::<u32>(&lookup, "IAMSYNC_SYNC_SCREEN_LIMIT")? {
            if limit == 0 {
                return Err(ConfigError::Invalid {
                    key: "IAMSYNC_SYNC_SCREEN_LIMIT",
                    reason: "must be greater than zero".to_string(),
                });
            }
            cfg.sync.screen_limit = limit;
        }

        Ok(cfg)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.auth.access_token_ttl, Duration::from_secs(900));
        assert_eq!(cfg.sync.screen_limit, 1000);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("IAMSYNC_ENV", "production"),
            ("IAMSYNC_LOG_FORMAT", "Pretty"),
            ("IAMSYNC_ACCESS_TOKEN_TTL_SECS", "60"),
            ("IAMSYNC_LAST_SEEN_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.environment, "production");
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        assert_eq!(cfg.auth.access_token_ttl, Duration::from_secs(60));
        assert_eq!(cfg.auth.last_seen_timeout, Duration::from_millis(250));
    }

    #[test]
    fn token_policy_follows_auth_settings() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("IAMSYNC_ACCESS_TOKEN_TTL_SECS", "120"),
            ("IAMSYNC_REFRESH_TOKEN_TTL_SECS", "3600"),
            ("IAMSYNC_TOKEN_ISSUER", "district-iam"),
        ]))
        .unwrap();
        let policy = cfg.auth.token_policy();
        assert_eq!(policy.issuer, "district-iam");
        assert_eq!(policy.access_ttl, Duration::from_secs(120));
        assert_eq!(policy.refresh_ttl, Duration::from_secs(3600));
        assert_eq!(AppConfig::default().auth.token_policy(), TokenPolicy::default());
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("IAMSYNC_SYNC_SCREEN_LIMIT", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "IAMSYNC_SYNC_SCREEN_LIMIT", .. }));

        let err = AppConfig::from_lookup(lookup(&[("IAMSYNC_LOG_FORMAT", "xml")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "IAMSYNC_LOG_FORMAT", .. }));

        let err = AppConfig::from_lookup(lookup(&[("IAMSYNC_TOKEN_ISSUER", " ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "IAMSYNC_TOKEN_ISSUER", .. }));
    }
}
