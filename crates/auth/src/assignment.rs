//! Role assignments (user-role grants).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use iamsync_core::{AssignmentId, RoleId, TenantId, UnitId, UserId};

/// A grant of a role to a user, optionally scoped to a tenant and/or unit.
///
/// # Invariants
/// - At most one active assignment per (user, role, tenant, unit); the grant
///   operation enforces this and never overwrites.
/// - An assignment past its `expires_at` is not effective even if still active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub id: AssignmentId,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub tenant_id: Option<TenantId>,
    pub unit_id: Option<UnitId>,
    pub is_active: bool,
    pub granted_by: Option<UserId>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RoleAssignment {
    pub fn grant(
        user_id: UserId,
        role_id: RoleId,
        tenant_id: Option<TenantId>,
        unit_id: Option<UnitId>,
        granted_by: Option<UserId>,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            user_id,
            role_id,
            tenant_id,
            unit_id,
            is_active: true,
            granted_by,
            granted_at: now,
            expires_at,
            updated_at: now,
        }
    }

    /// Active and not expired at `now`.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|at| at > now)
    }

    /// Exact scope match (a `None` tenant only matches another `None`).
    pub fn same_grant(
        &self,
        user_id: UserId,
        role_id: RoleId,
        tenant_id: Option<TenantId>,
        unit_id: Option<UnitId>,
    ) -> bool {
        self.user_id == user_id
            && self.role_id == role_id
            && self.tenant_id == tenant_id
            && self.unit_id == unit_id
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }
}
