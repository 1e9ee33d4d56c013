//! Role catalog reads and role grants/revocations.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use iamsync_auth::{PermissionRecord, Role, RoleAssignment};
use iamsync_core::{AssignmentId, PermissionId, RoleId, TenantId, UnitId, UserId};
use iamsync_infra::store::{AssignmentScope, AssignmentStore, PermissionStore, RoleStore, StoreError};

use crate::error::{ServiceError, ServiceResult, db};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRole {
    pub user_id: UserId,
    pub role_id: RoleId,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub unit_id: Option<UnitId>,
    /// RFC3339 timestamp; must lie in the future.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// One assignment of a user, with the role name filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub assignment_id: AssignmentId,
    pub role_id: RoleId,
    pub role_name: String,
    pub tenant_id: Option<TenantId>,
    pub unit_id: Option<UnitId>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct RoleService {
    roles: Arc<dyn RoleStore>,
    permissions: Arc<dyn PermissionStore>,
    assignments: Arc<dyn AssignmentStore>,
}

impl RoleService {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        permissions: Arc<dyn PermissionStore>,
        assignments: Arc<dyn AssignmentStore>,
    ) -> Self {
        Self {
            roles,
            permissions,
            assignments,
        }
    }

    pub async fn list_roles(&self, scope: Option<&str>) -> ServiceResult<Vec<Role>> {
        self.roles
            .list_roles(scope.filter(|s| !s.is_empty()))
            .await
            .map_err(db("list_roles"))
    }

    pub async fn get_role(&self, role_id: RoleId) -> ServiceResult<Role> {
        self.roles
            .find_role(role_id)
            .await
            .map_err(db("find_role"))?
            .ok_or(ServiceError::NotFound("role"))
    }

    pub async fn list_role_permissions(&self, role_id: RoleId) -> ServiceResult<Vec<PermissionRecord>> {
        self.permissions
            .list_role_permissions(role_id)
            .await
            .map_err(db("list_role_permissions"))
    }

    /// The whole active permission catalog, ordered by name.
    pub async fn list_permissions(&self) -> ServiceResult<Vec<PermissionRecord>> {
        self.permissions.list_permissions().await.map_err(db("list_permissions"))
    }

    pub async fn get_permission(&self, id: PermissionId) -> ServiceResult<PermissionRecord> {
        self.permissions
            .find_permission(id)
            .await
            .map_err(db("find_permission"))?
            .ok_or(ServiceError::NotFound("permission"))
    }

    /// Active assignments of the user, optionally narrowed to one tenant.
    ///
    /// Assignments whose role can no longer be loaded are skipped.
    pub async fn list_user_roles(
        &self,
        user_id: UserId,
        tenant_id: Option<TenantId>,
    ) -> ServiceResult<Vec<UserRole>> {
        let assignments = self
            .assignments
            .list_assignments(user_id, &AssignmentScope::requested(tenant_id, None))
            .await
            .map_err(db("list_assignments"))?;

        let mut names: HashMap<RoleId, Option<String>> = HashMap::new();
        let mut out = Vec::with_capacity(assignments.len());
        for a in assignments {
            let name = match names.get(&a.role_id) {
                Some(cached) => cached.clone(),
                None => {
                    let loaded = match self.roles.find_role(a.role_id).await {
                        Ok(role) => role.map(|r| r.name),
                        Err(error) => {
                            warn!(role_id = %a.role_id, %error, "role lookup failed");
                            None
                        }
                    };
                    names.insert(a.role_id, loaded.clone());
                    loaded
                }
            };
            let Some(role_name) = name else { continue };
            out.push(UserRole {
                assignment_id: a.id,
                role_id: a.role_id,
                role_name,
                tenant_id: a.tenant_id,
                unit_id: a.unit_id,
                granted_at: a.granted_at,
                expires_at: a.expires_at,
            });
        }
        Ok(out)
    }

    pub async fn grant_role(&self, req: GrantRole, granted_by: Option<UserId>) -> ServiceResult<RoleAssignment> {
        let now = Utc::now();
        let expires_at = req
            .expires_at
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|raw| parse_expiry(raw, now))
            .transpose()?;

        let role_exists = self
            .roles
            .find_role(req.role_id)
            .await
            .map_err(db("find_role"))?
            .is_some();
        if !role_exists {
            return Err(ServiceError::validation("role not found"));
        }

        let scope = AssignmentScope::exact(req.tenant_id, req.unit_id);
        let exists = self
            .assignments
            .assignment_exists(req.user_id, req.role_id, &scope)
            .await
            .map_err(db("assignment_exists"))?;
        if exists {
            return Err(ServiceError::AlreadyExists("role assignment"));
        }

        let assignment = RoleAssignment::grant(
            req.user_id,
            req.role_id,
            req.tenant_id,
            req.unit_id,
            granted_by,
            expires_at,
            now,
        );
        self.assignments
            .insert_assignment(assignment.clone())
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => ServiceError::AlreadyExists("role assignment"),
                other => db("insert_assignment")(other),
            })?;

        info!(
            user_id = %assignment.user_id,
            role_id = %assignment.role_id,
            tenant_id = ?assignment.tenant_id,
            "role granted"
        );
        Ok(assignment)
    }

    /// Deactivates every active assignment of the role for the user.
    pub async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> ServiceResult<usize> {
        let revoked = self
            .assignments
            .revoke_assignments(user_id, role_id, Utc::now())
            .await
            .map_err(db("revoke_assignments"))?;
        if revoked == 0 {
            return Err(ServiceError::NotFound("role assignment"));
        }
        info!(%user_id, %role_id, revoked, "role revoked");
        Ok(revoked)
    }
}

fn parse_expiry(raw: &str, now: DateTime<Utc>) -> ServiceResult<DateTime<Utc>> {
    let at = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| ServiceError::validation(format!("expires_at: {e}")))?
        .with_timezone(&Utc);
    if at <= now {
        return Err(ServiceError::validation("expires_at must be in the future"));
    }
    Ok(at)
}
