use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use iamsync_core::{MembershipId, TenantId, UnitId, UserId};

/// An isolated organizational scope (a school).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub is_active: bool,
}

/// Optional finer-grained scope nested in a tenant (an academic unit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub tenant_id: TenantId,
    pub name: String,
}

/// A user's membership in a tenant.
///
/// Membership answers "may this user act inside the tenant at all"; the role
/// assignment answers "with which permissions".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
