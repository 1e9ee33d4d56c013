//! User account record (identity store row).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use iamsync_core::{DomainError, DomainResult, UserId};

/// A user account as seen by the identity store.
///
/// `password_hash` is opaque here; only a [`crate::PasswordVerifier`] reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Also serves as the "last seen" marker written after login.
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(
        email: &str,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        password_hash: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        Ok(Self {
            id: UserId::new(),
            email,
            first_name: first_name.into(),
            last_name: last_name.into(),
            password_hash: password_hash.into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Canonical form used for lookups by email.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
