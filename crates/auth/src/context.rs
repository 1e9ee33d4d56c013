//! The resolved RBAC context embedded in access tokens.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use iamsync_core::{RoleId, TenantId, UnitId};

use crate::Permission;

/// Active role, scope and flattened permission set for one user.
///
/// Immutable once built: callers receive it from the context manager (or from
/// validated token claims) and pass it explicitly into every context-dependent
/// operation. A context always names a role; the permission set may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    role_id: RoleId,
    role_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant_id: Option<TenantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit_id: Option<UnitId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit_name: Option<String>,
    permissions: BTreeSet<Permission>,
}

impl UserContext {
    pub fn new(
        role_id: RoleId,
        role_name: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self {
            role_id,
            role_name: role_name.into(),
            tenant_id: None,
            tenant_name: None,
            unit_id: None,
            unit_name: None,
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId, tenant_name: Option<String>) -> Self {
        self.tenant_id = Some(tenant_id);
        self.tenant_name = tenant_name;
        self
    }

    pub fn with_unit(mut self, unit_id: UnitId, unit_name: Option<String>) -> Self {
        self.unit_id = Some(unit_id);
        self.unit_name = unit_name;
        self
    }

    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    /// `None` denotes a global (cross-tenant) role.
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn tenant_name(&self) -> Option<&str> {
        self.tenant_name.as_deref()
    }

    pub fn unit_id(&self) -> Option<UnitId> {
        self.unit_id
    }

    pub fn unit_name(&self) -> Option<&str> {
        self.unit_name.as_deref()
    }

    /// Permissions in ascending lexical order.
    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p.as_str() == permission)
    }
}
