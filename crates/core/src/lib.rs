//! `iamsync-core`: identifiers and error primitives shared by every crate.
//!
//! This crate carries no IO and no policy; it only names things.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{
    AssignmentId, MembershipId, PermissionId, ResourceId, RoleId, ScreenBindingId,
    ScreenInstanceId, ScreenTemplateId, TenantId, UnitId, UserId,
};
