use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use iamsync_core::UserId;

use crate::UserContext;

/// Access-token claims model (transport-agnostic).
///
/// The token issuer owns encoding and signatures; this is the shape it embeds
/// and hands back after verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer name the token was minted under.
    pub iss: String,

    /// Subject / user identifier.
    pub sub: UserId,

    pub email: String,

    /// Resolved RBAC context, read-only until the next recompute.
    pub context: UserContext,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token issued by {0:?}, not by this service")]
    UnknownIssuer(String),
}

impl TokenValidationError {
    /// Stable tag reported to callers verifying a token.
    pub fn code(&self) -> &'static str {
        match self {
            TokenValidationError::Expired => "token_expired",
            TokenValidationError::NotYetValid => "token_not_yet_valid",
            TokenValidationError::InvalidTimeWindow => "invalid_time_window",
            TokenValidationError::Malformed(_) => "malformed_token",
            TokenValidationError::UnknownIssuer(_) => "unknown_issuer",
        }
    }
}

/// Deterministically validate the claims time window.
///
/// Signature verification / decoding is the issuer's job.
pub fn validate_claims(claims: &AccessClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
