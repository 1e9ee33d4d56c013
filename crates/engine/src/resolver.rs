//! Permission resolution: which role and permission set apply in a scope.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use iamsync_auth::{RoleAssignment, UserContext};
use iamsync_core::{TenantId, UnitId, UserId};
use iamsync_infra::store::{AssignmentScope, AssignmentStore, RoleStore, TenantStore};

use crate::error::{ServiceResult, db};

pub struct PermissionResolver {
    assignments: Arc<dyn AssignmentStore>,
    roles: Arc<dyn RoleStore>,
    tenants: Arc<dyn TenantStore>,
}

impl PermissionResolver {
    pub fn new(
        assignments: Arc<dyn AssignmentStore>,
        roles: Arc<dyn RoleStore>,
        tenants: Arc<dyn TenantStore>,
    ) -> Self {
        Self {
            assignments,
            roles,
            tenants,
        }
    }

    /// Resolve the context for `user_id`, matching tenant/unit exactly when
    /// given and unconstrained when omitted.
    ///
    /// The context carries the canonical assignment's tenant and unit, and only
    /// the permissions granted in that same scope.
    ///
    /// `Ok(None)` means the user has no usable assignment in that scope.
    pub async fn resolve(
        &self,
        user_id: UserId,
        tenant_id: Option<TenantId>,
        unit_id: Option<UnitId>,
    ) -> ServiceResult<Option<UserContext>> {
        self.resolve_in(user_id, AssignmentScope::requested(tenant_id, unit_id), Utc::now())
            .await
    }

    /// Resolve using only assignments that carry no tenant.
    pub async fn resolve_global(&self, user_id: UserId) -> ServiceResult<Option<UserContext>> {
        self.resolve_in(user_id, AssignmentScope::global(), Utc::now()).await
    }

    async fn resolve_in(
        &self,
        user_id: UserId,
        scope: AssignmentScope,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<UserContext>> {
        let assignments = self
            .assignments
            .list_assignments(user_id, &scope)
            .await
            .map_err(db("list_assignments"))?;

        let Some(canonical) = canonical_assignment(assignments, now) else {
            return Ok(None);
        };

        let Some(role) = self
            .roles
            .find_role(canonical.role_id)
            .await
            .map_err(db("find_role"))?
        else {
            warn!(
                user_id = %user_id,
                role_id = %canonical.role_id,
                "assigned role is missing or inactive"
            );
            return Ok(None);
        };

        // Permissions come from exactly the scope the context will claim, not the
        // (possibly open) requested one.
        let claimed = AssignmentScope::exact(canonical.tenant_id, canonical.unit_id);
        let permissions = match self.assignments.aggregate_permissions(user_id, &claimed, now).await {
            Ok(perms) => perms,
            Err(error) => {
                warn!(user_id = %user_id, %error, "permission aggregation failed; using empty set");
                Vec::new()
            }
        };

        let mut context = UserContext::new(role.id, role.name, permissions);
        if let Some(tenant_id) = canonical.tenant_id {
            context = context.with_tenant(tenant_id, tenant_name(self.tenants.as_ref(), tenant_id).await);
        }
        if let Some(unit_id) = canonical.unit_id {
            context = context.with_unit(unit_id, unit_name(self.tenants.as_ref(), unit_id).await);
        }
        Ok(Some(context))
    }
}

/// Effective assignment with the earliest grant; ties go to the smallest id.
pub(crate) fn canonical_assignment(
    assignments: Vec<RoleAssignment>,
    now: DateTime<Utc>,
) -> Option<RoleAssignment> {
    assignments
        .into_iter()
        .filter(|a| a.is_effective(now))
        .min_by(|a, b| a.granted_at.cmp(&b.granted_at).then_with(|| a.id.cmp(&b.id)))
}

/// Soft lookup; failures are logged and yield `None`.
pub(crate) async fn tenant_name(tenants: &dyn TenantStore, tenant_id: TenantId) -> Option<String> {
    match tenants.find_tenant(tenant_id).await {
        Ok(tenant) => tenant.map(|t| t.name),
        Err(error) => {
            warn!(tenant_id = %tenant_id, %error, "tenant name lookup failed");
            None
        }
    }
}

pub(crate) async fn unit_name(tenants: &dyn TenantStore, unit_id: UnitId) -> Option<String> {
    match tenants.find_unit(unit_id).await {
        Ok(unit) => unit.map(|u| u.name),
        Err(error) => {
            warn!(unit_id = %unit_id, %error, "unit name lookup failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use chrono::Duration;
    use iamsync_auth::{PermissionRecord, Role, Unit};
    use iamsync_core::{PermissionId, RoleId};

    fn seed_role(fx: &Fixture, name: &str, permission: &str) -> Role {
        let role = Role {
            id: RoleId::new(),
            name: name.to_string(),
            display_name: name.to_string(),
            description: None,
            scope: "school".to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        fx.store.seed_role(role.clone());
        let (resource, action) = permission.split_once(':').unwrap();
        fx.store.seed_role_permission(
            role.id,
            PermissionRecord {
                id: PermissionId::new(),
                name: permission.to_string(),
                display_name: permission.to_string(),
                resource_key: resource.to_string(),
                action: action.to_string(),
                is_active: true,
            },
        );
        role
    }

    #[test]
    fn canonical_prefers_earliest_grant_then_smallest_id() {
        let now = Utc::now();
        let user = UserId::new();
        let early = RoleAssignment::grant(user, RoleId::new(), None, None, None, None, now - Duration::days(2));
        let late = RoleAssignment::grant(user, RoleId::new(), None, None, None, None, now - Duration::days(1));
        let picked = canonical_assignment(vec![late.clone(), early.clone()], now).unwrap();
        assert_eq!(picked.id, early.id);

        let mut twin = late.clone();
        twin.id = iamsync_core::AssignmentId::new();
        let expected = late.id.min(twin.id);
        let picked = canonical_assignment(vec![twin, late], now).unwrap();
        assert_eq!(picked.id, expected);
    }

    #[test]
    fn canonical_skips_expired() {
        let now = Utc::now();
        let user = UserId::new();
        let expired = RoleAssignment::grant(
            user,
            RoleId::new(),
            None,
            None,
            None,
            Some(now - Duration::seconds(1)),
            now - Duration::days(3),
        );
        assert!(canonical_assignment(vec![expired], now).is_none());
    }

    #[tokio::test]
    async fn resolves_teacher_in_school_scope() {
        let fx = Fixture::new();
        let ctx = fx
            .resolver()
            .resolve(fx.teacher.id, Some(fx.school.id), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(ctx.role_name(), "teacher");
        assert_eq!(ctx.tenant_id(), Some(fx.school.id));
        assert_eq!(ctx.tenant_name(), Some("North High"));
        let perms: Vec<&str> = ctx.permissions().iter().map(|p| p.as_str()).collect();
        assert_eq!(perms, vec!["attendance:write", "grades:read", "grades:write"]);
    }

    #[tokio::test]
    async fn no_assignment_is_not_an_error() {
        let fx = Fixture::new();
        let ctx = fx
            .resolver()
            .resolve(fx.teacher.id, Some(fx.other_school.id), None)
            .await
            .unwrap();
        assert!(ctx.is_none());
    }

    #[tokio::test]
    async fn missing_role_yields_none() {
        let fx = Fixture::new();
        let ghost_user = UserId::new();
        fx.store.seed_assignment(RoleAssignment::grant(
            ghost_user,
            RoleId::new(),
            None,
            None,
            None,
            None,
            Utc::now(),
        ));
        assert!(fx.resolver().resolve(ghost_user, None, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn permission_failure_degrades_to_empty_set() {
        let fx = Fixture::new();
        fx.store.fail_on("aggregate_permissions");
        let ctx = fx
            .resolver()
            .resolve(fx.teacher.id, Some(fx.school.id), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.role_name(), "teacher");
        assert!(ctx.permissions().is_empty());
    }

    #[tokio::test]
    async fn assignment_listing_failure_is_a_database_error() {
        let fx = Fixture::new();
        fx.store.fail_on("list_assignments");
        let err = fx
            .resolver()
            .resolve(fx.teacher.id, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "database_error");
    }

    #[tokio::test]
    async fn global_resolution_ignores_tenant_assignments() {
        let fx = Fixture::new();
        assert!(fx.resolver().resolve_global(fx.teacher.id).await.unwrap().is_none());

        let ctx = fx.resolver().resolve_global(fx.admin.id).await.unwrap().unwrap();
        assert_eq!(ctx.role_name(), "super_admin");
        assert!(ctx.is_global());
    }

    #[tokio::test]
    async fn open_scope_context_holds_only_its_own_tenant_permissions() {
        let fx = Fixture::new();
        let now = Utc::now();
        let principal = seed_role(&fx, "principal", "reports:read");
        fx.store.seed_assignment(RoleAssignment::grant(
            fx.admin.id,
            fx.teacher_role.id,
            Some(fx.school.id),
            None,
            None,
            None,
            now - Duration::days(30),
        ));
        fx.store.seed_assignment(RoleAssignment::grant(
            fx.admin.id,
            principal.id,
            Some(fx.other_school.id),
            None,
            None,
            None,
            now - Duration::days(20),
        ));

        let ctx = fx.resolver().resolve(fx.admin.id, None, None).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id(), Some(fx.school.id));
        assert_eq!(ctx.role_name(), "teacher");
        let perms: Vec<&str> = ctx.permissions().iter().map(|p| p.as_str()).collect();
        assert_eq!(perms, vec!["attendance:write", "grades:read", "grades:write"]);
    }

    #[tokio::test]
    async fn unit_context_holds_only_unit_permissions() {
        let fx = Fixture::new();
        let unit = Unit {
            id: iamsync_core::UnitId::new(),
            tenant_id: fx.school.id,
            name: "Science Dept".to_string(),
        };
        fx.store.seed_unit(unit.clone());
        let counselor = seed_role(&fx, "counselor", "students:read");
        fx.store.seed_assignment(RoleAssignment::grant(
            fx.teacher.id,
            counselor.id,
            Some(fx.school.id),
            Some(unit.id),
            None,
            None,
            Utc::now() - Duration::days(30),
        ));

        let ctx = fx
            .resolver()
            .resolve(fx.teacher.id, Some(fx.school.id), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.unit_id(), Some(unit.id));
        assert_eq!(ctx.unit_name(), Some("Science Dept"));
        let perms: Vec<&str> = ctx.permissions().iter().map(|p| p.as_str()).collect();
        assert_eq!(perms, vec!["students:read"]);
    }
}
