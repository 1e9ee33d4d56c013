//! In-memory implementation of every store contract (tests/dev).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use iamsync_auth::{
    Membership, Permission, PermissionRecord, Resource, Role, RoleAssignment, ScreenBinding,
    ScreenInstance, ScreenTemplate, Tenant, Unit, UserAccount,
};
use iamsync_auth::user::normalize_email;
use iamsync_core::{
    PermissionId, ResourceId, RoleId, ScreenBindingId, ScreenInstanceId, ScreenTemplateId, TenantId,
    UnitId, UserId,
};

use super::{
    AssignmentScope, AssignmentStore, InstanceFilter, MembershipStore, Page, PermissionStore,
    ResourceStore, RoleStore, ScreenBindingStore, ScreenInstanceStore, ScreenTemplateStore,
    StoreError, StoreResult, TemplateFilter, TenantStore, UserStore,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, UserAccount>,
    tenants: HashMap<TenantId, Tenant>,
    units: HashMap<UnitId, Unit>,
    memberships: Vec<Membership>,
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, PermissionRecord>,
    role_permissions: Vec<(RoleId, PermissionId)>,
    assignments: Vec<RoleAssignment>,
    resources: Vec<Resource>,
    bindings: Vec<ScreenBinding>,
    templates: HashMap<ScreenTemplateId, ScreenTemplate>,
    instances: HashMap<ScreenInstanceId, ScreenInstance>,
    failing: HashSet<&'static str>,
}

/// Single in-memory backend implementing all store traits.
///
/// Operations can be made to fail with [`InMemoryIamStore::fail_on`], keyed by
/// the trait method name (`"list_menu_resources"`, `"aggregate_permissions"`, ...).
#[derive(Debug, Default)]
pub struct InMemoryIamStore {
    inner: RwLock<Tables>,
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

fn page_of<T: Clone>(rows: Vec<T>, page: Page) -> (Vec<T>, u64) {
    let total = rows.len() as u64;
    let items = rows
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect();
    (items, total)
}

impl InMemoryIamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, op: &'static str) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        let tables = self.inner.read().map_err(|_| poisoned())?;
        if tables.failing.contains(op) {
            return Err(StoreError::Backend(format!("{op} unavailable")));
        }
        Ok(tables)
    }

    fn write(&self, op: &'static str) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        let tables = self.inner.write().map_err(|_| poisoned())?;
        if tables.failing.contains(op) {
            return Err(StoreError::Backend(format!("{op} unavailable")));
        }
        Ok(tables)
    }

    fn seed(&self, f: impl FnOnce(&mut Tables)) {
        if let Ok(mut tables) = self.inner.write() {
            f(&mut tables);
        }
    }

    /// Make the named operation return a backend error until cleared.
    pub fn fail_on(&self, op: &'static str) {
        self.seed(|t| {
            t.failing.insert(op);
        });
    }

    pub fn clear_failures(&self) {
        self.seed(|t| t.failing.clear());
    }

    // ── seeding ──────────────────────────────────────────────────────────────

    pub fn seed_user(&self, user: UserAccount) {
        self.seed(|t| {
            t.users.insert(user.id, user);
        });
    }

    pub fn seed_tenant(&self, tenant: Tenant) {
        self.seed(|t| {
            t.tenants.insert(tenant.id, tenant);
        });
    }

    pub fn seed_unit(&self, unit: Unit) {
        self.seed(|t| {
            t.units.insert(unit.id, unit);
        });
    }

    pub fn seed_membership(&self, membership: Membership) {
        self.seed(|t| t.memberships.push(membership));
    }

    pub fn seed_role(&self, role: Role) {
        self.seed(|t| {
            t.roles.insert(role.id, role);
        });
    }

    /// Register a permission and attach it to the role.
    pub fn seed_role_permission(&self, role_id: RoleId, permission: PermissionRecord) {
        self.seed(|t| {
            t.role_permissions.push((role_id, permission.id));
            t.permissions.insert(permission.id, permission);
        });
    }

    pub fn seed_assignment(&self, assignment: RoleAssignment) {
        self.seed(|t| t.assignments.push(assignment));
    }

    pub fn seed_resource(&self, resource: Resource) {
        self.seed(|t| t.resources.push(resource));
    }

    pub fn seed_binding(&self, binding: ScreenBinding) {
        self.seed(|t| t.bindings.push(binding));
    }

    pub fn seed_template(&self, template: ScreenTemplate) {
        self.seed(|t| {
            t.templates.insert(template.id, template);
        });
    }

    pub fn seed_instance(&self, instance: ScreenInstance) {
        self.seed(|t| {
            t.instances.insert(instance.id, instance);
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl UserStore for InMemoryIamStore {
    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<UserAccount>> {
        let t = self.read("find_user")?;
        Ok(t.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>> {
        let t = self.read("find_user_by_email")?;
        let email = normalize_email(email);
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn touch_user(&self, user_id: UserId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut t = self.write("touch_user")?;
        let user = t
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        user.touch(at);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MembershipStore for InMemoryIamStore {
    async fn list_memberships(&self, user_id: UserId) -> StoreResult<Vec<Membership>> {
        let t = self.read("list_memberships")?;
        let mut rows: Vec<Membership> = t
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    async fn find_membership(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> StoreResult<Option<Membership>> {
        let t = self.read("find_membership")?;
        Ok(t.memberships
            .iter()
            .find(|m| m.user_id == user_id && m.tenant_id == tenant_id && m.is_active)
            .cloned())
    }
}

#[async_trait::async_trait]
impl TenantStore for InMemoryIamStore {
    async fn find_tenant(&self, tenant_id: TenantId) -> StoreResult<Option<Tenant>> {
        let t = self.read("find_tenant")?;
        Ok(t.tenants.get(&tenant_id).cloned())
    }

    async fn find_unit(&self, unit_id: UnitId) -> StoreResult<Option<Unit>> {
        let t = self.read("find_unit")?;
        Ok(t.units.get(&unit_id).cloned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RBAC
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl RoleStore for InMemoryIamStore {
    async fn find_role(&self, role_id: RoleId) -> StoreResult<Option<Role>> {
        let t = self.read("find_role")?;
        Ok(t.roles.get(&role_id).filter(|r| r.is_active).cloned())
    }

    async fn list_roles(&self, scope: Option<&str>) -> StoreResult<Vec<Role>> {
        let t = self.read("list_roles")?;
        let mut rows: Vec<Role> = t
            .roles
            .values()
            .filter(|r| r.is_active && scope.is_none_or(|s| r.scope == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl PermissionStore for InMemoryIamStore {
    async fn list_role_permissions(&self, role_id: RoleId) -> StoreResult<Vec<PermissionRecord>> {
        let t = self.read("list_role_permissions")?;
        let mut rows: Vec<PermissionRecord> = t
            .role_permissions
            .iter()
            .filter(|(r, _)| *r == role_id)
            .filter_map(|(_, p)| t.permissions.get(p))
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn list_permissions(&self) -> StoreResult<Vec<PermissionRecord>> {
        let t = self.read("list_permissions")?;
        let mut rows: Vec<PermissionRecord> =
            t.permissions.values().filter(|p| p.is_active).cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn find_permission(&self, id: PermissionId) -> StoreResult<Option<PermissionRecord>> {
        let t = self.read("find_permission")?;
        Ok(t.permissions.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl AssignmentStore for InMemoryIamStore {
    async fn list_assignments(
        &self,
        user_id: UserId,
        scope: &AssignmentScope,
    ) -> StoreResult<Vec<RoleAssignment>> {
        let t = self.read("list_assignments")?;
        Ok(t.assignments
            .iter()
            .filter(|a| a.user_id == user_id && a.is_active && scope.matches(a))
            .cloned()
            .collect())
    }

    async fn assignment_exists(
        &self,
        user_id: UserId,
        role_id: RoleId,
        scope: &AssignmentScope,
    ) -> StoreResult<bool> {
        let t = self.read("assignment_exists")?;
        Ok(t.assignments
            .iter()
            .any(|a| a.user_id == user_id && a.role_id == role_id && a.is_active && scope.matches(a)))
    }

    async fn insert_assignment(&self, assignment: RoleAssignment) -> StoreResult<()> {
        let mut t = self.write("insert_assignment")?;
        let duplicate = t.assignments.iter().any(|a| {
            a.is_active
                && a.same_grant(
                    assignment.user_id,
                    assignment.role_id,
                    assignment.tenant_id,
                    assignment.unit_id,
                )
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "active assignment of role {} to user {}",
                assignment.role_id, assignment.user_id
            )));
        }
        t.assignments.push(assignment);
        Ok(())
    }

    async fn revoke_assignments(
        &self,
        user_id: UserId,
        role_id: RoleId,
        at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let mut t = self.write("revoke_assignments")?;
        let mut changed = 0;
        for a in t
            .assignments
            .iter_mut()
            .filter(|a| a.user_id == user_id && a.role_id == role_id && a.is_active)
        {
            a.is_active = false;
            a.updated_at = at;
            changed += 1;
        }
        Ok(changed)
    }

    async fn aggregate_permissions(
        &self,
        user_id: UserId,
        scope: &AssignmentScope,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<Permission>> {
        let t = self.read("aggregate_permissions")?;
        let roles: HashSet<RoleId> = t
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id && a.is_effective(at) && scope.matches(a))
            .map(|a| a.role_id)
            .filter(|r| t.roles.get(r).is_some_and(|role| role.is_active))
            .collect();

        let names: BTreeSet<&str> = t
            .role_permissions
            .iter()
            .filter(|(r, _)| roles.contains(r))
            .filter_map(|(_, p)| t.permissions.get(p))
            .filter(|p| p.is_active)
            .map(|p| p.name.as_str())
            .collect();

        Ok(names.into_iter().map(|n| Permission::new(n.to_string())).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resources and screens
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl ResourceStore for InMemoryIamStore {
    async fn list_menu_resources(&self) -> StoreResult<Vec<Resource>> {
        let t = self.read("list_menu_resources")?;
        let mut rows: Vec<Resource> = t
            .resources
            .iter()
            .filter(|r| r.is_active && r.is_menu_visible)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.key.cmp(&b.key)));
        Ok(rows)
    }

    async fn find_resource(&self, resource_id: ResourceId) -> StoreResult<Option<Resource>> {
        let t = self.read("find_resource")?;
        Ok(t.resources.iter().find(|r| r.id == resource_id).cloned())
    }

    async fn list_resources(&self) -> StoreResult<Vec<Resource>> {
        let t = self.read("list_resources")?;
        let mut rows = t.resources.clone();
        rows.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.key.cmp(&b.key)));
        Ok(rows)
    }

    async fn insert_resource(&self, resource: Resource) -> StoreResult<()> {
        let mut t = self.write("insert_resource")?;
        if t.resources.iter().any(|r| r.key == resource.key) {
            return Err(StoreError::Conflict(format!("resource key {}", resource.key)));
        }
        t.resources.push(resource);
        Ok(())
    }

    async fn update_resource(&self, resource: &Resource) -> StoreResult<()> {
        let mut t = self.write("update_resource")?;
        match t.resources.iter_mut().find(|r| r.id == resource.id) {
            Some(existing) => {
                *existing = resource.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("resource {}", resource.id))),
        }
    }
}

#[async_trait::async_trait]
impl ScreenBindingStore for InMemoryIamStore {
    async fn list_bindings_by_key(&self, resource_key: &str) -> StoreResult<Vec<ScreenBinding>> {
        let t = self.read("list_bindings_by_key")?;
        Ok(t.bindings
            .iter()
            .filter(|b| b.is_active && b.resource_key == resource_key)
            .cloned()
            .collect())
    }

    async fn list_bindings_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> StoreResult<Vec<ScreenBinding>> {
        let t = self.read("list_bindings_for_resource")?;
        Ok(t.bindings
            .iter()
            .filter(|b| b.is_active && b.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn insert_binding(&self, binding: ScreenBinding) -> StoreResult<()> {
        let mut t = self.write("insert_binding")?;
        let taken = t
            .bindings
            .iter()
            .any(|b| b.resource_id == binding.resource_id && b.screen_key == binding.screen_key);
        if taken {
            return Err(StoreError::Conflict(format!(
                "screen {} already linked to resource {}",
                binding.screen_key, binding.resource_key
            )));
        }
        t.bindings.push(binding);
        Ok(())
    }

    async fn delete_binding(&self, id: ScreenBindingId) -> StoreResult<bool> {
        let mut t = self.write("delete_binding")?;
        let before = t.bindings.len();
        t.bindings.retain(|b| b.id != id);
        Ok(t.bindings.len() != before)
    }
}

#[async_trait::async_trait]
impl ScreenTemplateStore for InMemoryIamStore {
    async fn insert_template(&self, template: ScreenTemplate) -> StoreResult<()> {
        let mut t = self.write("insert_template")?;
        t.templates.insert(template.id, template);
        Ok(())
    }

    async fn find_template(&self, id: ScreenTemplateId) -> StoreResult<Option<ScreenTemplate>> {
        let t = self.read("find_template")?;
        Ok(t.templates.get(&id).cloned())
    }

    async fn list_templates(
        &self,
        filter: &TemplateFilter,
        page: Page,
    ) -> StoreResult<(Vec<ScreenTemplate>, u64)> {
        let t = self.read("list_templates")?;
        let mut rows: Vec<ScreenTemplate> = t
            .templates
            .values()
            .filter(|tpl| filter.pattern.as_deref().is_none_or(|p| tpl.pattern == p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.pattern.cmp(&b.pattern).then_with(|| a.name.cmp(&b.name)));
        Ok(page_of(rows, page))
    }

    async fn update_template(&self, template: &ScreenTemplate) -> StoreResult<()> {
        let mut t = self.write("update_template")?;
        match t.templates.get_mut(&template.id) {
            Some(existing) => {
                *existing = template.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("screen template {}", template.id))),
        }
    }

    async fn delete_template(&self, id: ScreenTemplateId) -> StoreResult<bool> {
        let mut t = self.write("delete_template")?;
        Ok(t.templates.remove(&id).is_some())
    }
}

#[async_trait::async_trait]
impl ScreenInstanceStore for InMemoryIamStore {
    async fn insert_instance(&self, instance: ScreenInstance) -> StoreResult<()> {
        let mut t = self.write("insert_instance")?;
        if t.instances.values().any(|i| i.screen_key == instance.screen_key) {
            return Err(StoreError::Conflict(format!("screen key {}", instance.screen_key)));
        }
        t.instances.insert(instance.id, instance);
        Ok(())
    }

    async fn find_instance(&self, id: ScreenInstanceId) -> StoreResult<Option<ScreenInstance>> {
        let t = self.read("find_instance")?;
        Ok(t.instances.get(&id).cloned())
    }

    async fn find_instance_by_key(&self, screen_key: &str) -> StoreResult<Option<ScreenInstance>> {
        let t = self.read("find_instance_by_key")?;
        Ok(t.instances.values().find(|i| i.screen_key == screen_key).cloned())
    }

    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        page: Page,
    ) -> StoreResult<(Vec<ScreenInstance>, u64)> {
        let t = self.read("list_instances")?;
        let mut rows: Vec<ScreenInstance> = t
            .instances
            .values()
            .filter(|i| filter.template_id.is_none_or(|id| i.template_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.screen_key.cmp(&b.screen_key));
        Ok(page_of(rows, page))
    }

    async fn update_instance(&self, instance: &ScreenInstance) -> StoreResult<()> {
        let mut t = self.write("update_instance")?;
        match t.instances.get_mut(&instance.id) {
            Some(existing) => {
                *existing = instance.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("screen instance {}", instance.id))),
        }
    }

    async fn delete_instance(&self, id: ScreenInstanceId) -> StoreResult<bool> {
        let mut t = self.write("delete_instance")?;
        Ok(t.instances.remove(&id).is_some())
    }
}
