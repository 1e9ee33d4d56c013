use thiserror::Error;

use iamsync_auth::TokenError;
use iamsync_core::DomainError;
use iamsync_infra::store::StoreError;

/// Failure of an engine operation.
///
/// Each variant maps to one stable tag via [`ServiceError::code`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is inactive")]
    InactiveAccount,

    #[error("no active role could be resolved")]
    NoRoleResolved,

    #[error("no membership or global role for the target tenant")]
    NoMembership,

    #[error("target tenant does not exist")]
    InvalidTarget,

    #[error("database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable, externally observable error tag.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InactiveAccount => "inactive_account",
            Self::NoRoleResolved => "no_role_resolved",
            Self::NoMembership => "no_membership",
            Self::InvalidTarget => "invalid_target",
            Self::Database { .. } => "database_error",
            Self::Token(_) => "token_error",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// `map_err` adapter naming the failed store operation.
pub(crate) fn db(operation: &'static str) -> impl FnOnce(StoreError) -> ServiceError {
    move |source| ServiceError::Database { operation, source }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
