//! Credential and token capabilities consumed by the context manager.
//!
//! Password hashing and token signing are implemented elsewhere; the engine
//! only calls through these traits.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use iamsync_core::UserId;

use crate::{AccessClaims, TokenValidationError, UserContext};

/// Verifies a plaintext password against a stored hash.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, password_hash: &str, password: &str) -> bool;
}

/// Identity a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: UserId,
    pub email: String,
}

/// Access + refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub token_type: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token issuance failed: {0}")]
    Issue(String),
}

/// Issuer name and lifetimes every minted token follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPolicy {
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            issuer: "iamsync".to_string(),
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl TokenPolicy {
    pub fn access_expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, TokenError> {
        expiry(now, self.access_ttl)
    }

    pub fn refresh_expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, TokenError> {
        expiry(now, self.refresh_ttl)
    }

    /// Access lifetime in whole seconds, as reported in [`TokenPair::expires_in`].
    pub fn expires_in(&self) -> i64 {
        i64::try_from(self.access_ttl.as_secs()).unwrap_or(i64::MAX)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, TokenError> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| TokenError::Issue(format!("token lifetime {ttl:?} out of range")))
}

/// Sole authority for token format and signatures; lifetimes come from the policy.
pub trait TokenIssuer: Send + Sync {
    fn issue(
        &self,
        subject: &TokenSubject,
        context: &UserContext,
        policy: &TokenPolicy,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError>;

    /// Verify an access token and return its claims (time window included).
    fn validate(&self, access_token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenValidationError>;
}
