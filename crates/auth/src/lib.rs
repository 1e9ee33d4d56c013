//! `iamsync-auth`: identity and RBAC records plus the token-embedded context.
//!
//! Pure data and rules only. Storage lives behind the infra store traits and
//! credential cryptography behind [`PasswordVerifier`] / [`TokenIssuer`].

pub mod assignment;
pub mod claims;
pub mod context;
pub mod credentials;
pub mod permissions;
pub mod resource;
pub mod roles;
pub mod screen;
pub mod tenancy;
pub mod user;

pub use assignment::RoleAssignment;
pub use claims::{AccessClaims, TokenValidationError, validate_claims};
pub use context::UserContext;
pub use credentials::{PasswordVerifier, TokenError, TokenIssuer, TokenPair, TokenPolicy, TokenSubject};
pub use permissions::Permission;
pub use resource::{Resource, ScreenBinding};
pub use roles::{PermissionRecord, Role};
pub use screen::{ScreenInstance, ScreenTemplate};
pub use tenancy::{Membership, Tenant, Unit};
pub use user::UserAccount;
