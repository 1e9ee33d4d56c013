//! Persistence contracts consumed by the engine.
//!
//! One trait per concern, injected as `Arc<dyn Trait>`. Implementations own
//! query strategy; the engine only relies on the ordering and filtering rules
//! documented on each method.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use iamsync_auth::{
    Membership, Permission, PermissionRecord, Resource, Role, RoleAssignment, ScreenBinding,
    ScreenInstance, ScreenTemplate, Tenant, Unit, UserAccount,
};
use iamsync_core::{
    PermissionId, ResourceId, RoleId, ScreenBindingId, ScreenInstanceId, ScreenTemplateId, TenantId, UnitId,
    UserId,
};

pub mod in_memory;

pub use in_memory::InMemoryIamStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflicting record: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Query parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Offset pagination for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_LIMIT: u32 = 1000;

    /// 1-based page numbers; zero or missing values fall back to page 1 / 20 per page.
    pub fn numbered(page: Option<u32>, per_page: Option<u32>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = per_page
            .filter(|p| *p > 0)
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .min(Self::MAX_LIMIT);
        Self {
            limit,
            offset: (page - 1).saturating_mul(limit),
        }
    }

    pub fn first(limit: u32) -> Self {
        Self {
            limit: limit.min(Self::MAX_LIMIT),
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::numbered(None, None)
    }
}

/// How one scope dimension of an assignment is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter<T> {
    /// Any value, including none.
    Any,
    /// Only assignments without this scope.
    Unscoped,
    Is(T),
}

impl<T: Copy + PartialEq> ScopeFilter<T> {
    pub fn matches(&self, value: Option<T>) -> bool {
        match self {
            ScopeFilter::Any => true,
            ScopeFilter::Unscoped => value.is_none(),
            ScopeFilter::Is(expected) => value == Some(*expected),
        }
    }
}

/// Tenant/unit scope selector for assignment queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentScope {
    pub tenant: ScopeFilter<TenantId>,
    pub unit: ScopeFilter<UnitId>,
}

impl AssignmentScope {
    /// Every assignment of the user.
    pub fn any() -> Self {
        Self {
            tenant: ScopeFilter::Any,
            unit: ScopeFilter::Any,
        }
    }

    /// Exact match on provided dimensions, unconstrained on omitted ones.
    pub fn requested(tenant: Option<TenantId>, unit: Option<UnitId>) -> Self {
        Self {
            tenant: tenant.map_or(ScopeFilter::Any, ScopeFilter::Is),
            unit: unit.map_or(ScopeFilter::Any, ScopeFilter::Is),
        }
    }

    /// Exact match on both dimensions; `None` only matches `None`.
    pub fn exact(tenant: Option<TenantId>, unit: Option<UnitId>) -> Self {
        Self {
            tenant: tenant.map_or(ScopeFilter::Unscoped, ScopeFilter::Is),
            unit: unit.map_or(ScopeFilter::Unscoped, ScopeFilter::Is),
        }
    }

    /// Assignments that carry no tenant.
    pub fn global() -> Self {
        Self {
            tenant: ScopeFilter::Unscoped,
            unit: ScopeFilter::Any,
        }
    }

    pub fn matches(&self, assignment: &RoleAssignment) -> bool {
        self.tenant.matches(assignment.tenant_id) && self.unit.matches(assignment.unit_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFilter {
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub template_id: Option<ScreenTemplateId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<UserAccount>>;

    /// Lookup by normalized (trimmed, lowercased) email.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>>;

    /// Record activity; used as the "last seen" marker.
    async fn touch_user(&self, user_id: UserId, at: DateTime<Utc>) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait MembershipStore: Send + Sync {
    /// Active memberships ordered by creation time.
    async fn list_memberships(&self, user_id: UserId) -> StoreResult<Vec<Membership>>;

    async fn find_membership(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> StoreResult<Option<Membership>>;
}

#[async_trait::async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_tenant(&self, tenant_id: TenantId) -> StoreResult<Option<Tenant>>;

    async fn find_unit(&self, unit_id: UnitId) -> StoreResult<Option<Unit>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// RBAC
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    /// Inactive roles are reported as missing.
    async fn find_role(&self, role_id: RoleId) -> StoreResult<Option<Role>>;

    /// Active roles ordered by name, optionally restricted to a scope tag.
    async fn list_roles(&self, scope: Option<&str>) -> StoreResult<Vec<Role>>;
}

#[async_trait::async_trait]
pub trait PermissionStore: Send + Sync {
    /// Active permissions attached to the role, ordered by name.
    async fn list_role_permissions(&self, role_id: RoleId) -> StoreResult<Vec<PermissionRecord>>;

    /// The active permission catalog ordered by name.
    async fn list_permissions(&self) -> StoreResult<Vec<PermissionRecord>>;

    async fn find_permission(&self, id: PermissionId) -> StoreResult<Option<PermissionRecord>>;
}

#[async_trait::async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Active assignments matching the scope, in storage (grant) order.
    ///
    /// Expiry is not evaluated here.
    async fn list_assignments(
        &self,
        user_id: UserId,
        scope: &AssignmentScope,
    ) -> StoreResult<Vec<RoleAssignment>>;

    async fn assignment_exists(
        &self,
        user_id: UserId,
        role_id: RoleId,
        scope: &AssignmentScope,
    ) -> StoreResult<bool>;

    async fn insert_assignment(&self, assignment: RoleAssignment) -> StoreResult<()>;

    /// Deactivate every active assignment of the role for the user.
    /// Returns how many rows changed.
    async fn revoke_assignments(
        &self,
        user_id: UserId,
        role_id: RoleId,
        at: DateTime<Utc>,
    ) -> StoreResult<usize>;

    /// Distinct permissions granted through assignments effective at `at`
    /// that match the scope, ordered by name.
    async fn aggregate_permissions(
        &self,
        user_id: UserId,
        scope: &AssignmentScope,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<Permission>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Resources and screens
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Active, menu-visible resources ordered by sort order then key.
    async fn list_menu_resources(&self) -> StoreResult<Vec<Resource>>;

    async fn find_resource(&self, resource_id: ResourceId) -> StoreResult<Option<Resource>>;

    /// Every resource, hidden and inactive ones included, in menu order.
    async fn list_resources(&self) -> StoreResult<Vec<Resource>>;

    /// Fails with `Conflict` when the key is taken.
    async fn insert_resource(&self, resource: Resource) -> StoreResult<()>;

    /// Fails with `NotFound` when the resource does not exist.
    async fn update_resource(&self, resource: &Resource) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait ScreenBindingStore: Send + Sync {
    /// Active bindings for a resource key, in insertion order.
    async fn list_bindings_by_key(&self, resource_key: &str) -> StoreResult<Vec<ScreenBinding>>;

    async fn list_bindings_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> StoreResult<Vec<ScreenBinding>>;

    async fn insert_binding(&self, binding: ScreenBinding) -> StoreResult<()>;

    /// Returns whether a binding was removed.
    async fn delete_binding(&self, id: ScreenBindingId) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait ScreenTemplateStore: Send + Sync {
    async fn insert_template(&self, template: ScreenTemplate) -> StoreResult<()>;

    async fn find_template(&self, id: ScreenTemplateId) -> StoreResult<Option<ScreenTemplate>>;

    /// Page of templates ordered by pattern then name, plus the total match count.
    async fn list_templates(
        &self,
        filter: &TemplateFilter,
        page: Page,
    ) -> StoreResult<(Vec<ScreenTemplate>, u64)>;

    /// Fails with `NotFound` when the template does not exist.
    async fn update_template(&self, template: &ScreenTemplate) -> StoreResult<()>;

    async fn delete_template(&self, id: ScreenTemplateId) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait ScreenInstanceStore: Send + Sync {
    /// Fails with `Conflict` when the screen key is taken.
    async fn insert_instance(&self, instance: ScreenInstance) -> StoreResult<()>;

    async fn find_instance(&self, id: ScreenInstanceId) -> StoreResult<Option<ScreenInstance>>;

    async fn find_instance_by_key(&self, screen_key: &str) -> StoreResult<Option<ScreenInstance>>;

    /// Page of instances ordered by screen key, plus the total match count.
    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        page: Page,
    ) -> StoreResult<(Vec<ScreenInstance>, u64)>;

    async fn update_instance(&self, instance: &ScreenInstance) -> StoreResult<()>;

    async fn delete_instance(&self, id: ScreenInstanceId) -> StoreResult<bool>;
}
