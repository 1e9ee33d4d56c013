//! `iamsync-engine`: context resolution, menu building and sync bundles.
//!
//! Every operation that depends on "who is acting where" takes an explicit
//! [`UserContext`](iamsync_auth::UserContext); nothing is read from ambient
//! request state.

pub mod contexts;
pub mod error;
pub mod hashing;
pub mod menu;
pub mod resolver;
pub mod resources;
pub mod roles;
pub mod screens;
pub mod services;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use contexts::{
    AvailableContexts, ContextManager, ContextSummary, LoginResponse, SwitchContextResponse,
    TenantSummary, TokenVerification, UserInfo,
};
pub use error::{ServiceError, ServiceResult};
pub use menu::{MenuNode, MenuService, build_menu};
pub use resolver::PermissionResolver;
pub use resources::{NewResource, ParentChange, ResourcePatch, ResourceService};
pub use roles::{GrantRole, RoleService, UserRole};
pub use screens::{
    LinkScreen, NewScreenInstance, NewScreenTemplate, Paged, ResolvedScreen, ScreenConfigService,
    ScreenInstancePatch, ScreenTemplatePatch, ScreenVersion,
};
pub use services::{EngineServices, Stores};
pub use sync::{Bucket, BucketData, BucketSelection, DeltaSync, ScreenBundle, SyncBundle, SyncService};
