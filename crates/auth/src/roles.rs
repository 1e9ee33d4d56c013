use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use iamsync_core::{PermissionId, RoleId};

use crate::Permission;

/// Role definition used for RBAC.
///
/// `scope` is an opaque tag ("system", "school", "unit") used for listing only;
/// the effective scope of a grant is carried by the assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub scope: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A named permission as stored in the permission catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: PermissionId,
    /// Full `resource:action` string.
    pub name: String,
    pub display_name: String,
    pub resource_key: String,
    pub action: String,
    pub is_active: bool,
}

impl PermissionRecord {
    pub fn permission(&self) -> Permission {
        Permission::new(self.name.clone())
    }
}
