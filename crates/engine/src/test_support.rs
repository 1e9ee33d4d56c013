//! Shared seeded world for unit tests: two schools, a teacher, a global admin.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use iamsync_auth::{
    AccessClaims, Membership, PasswordVerifier, PermissionRecord, Resource, Role, RoleAssignment,
    ScreenBinding, ScreenInstance, ScreenTemplate, Tenant, TokenError, TokenIssuer, TokenPair,
    TokenPolicy, TokenSubject, TokenValidationError, UserAccount, UserContext, validate_claims,
};
use iamsync_core::{
    MembershipId, PermissionId, RoleId, ScreenBindingId, ScreenInstanceId, TenantId, UserId,
};
use iamsync_infra::AppConfig;
use iamsync_infra::store::InMemoryIamStore;

use crate::contexts::ContextManager;
use crate::menu::MenuService;
use crate::resolver::PermissionResolver;
use crate::resources::ResourceService;
use crate::roles::RoleService;
use crate::screens::ScreenConfigService;
use crate::services::{EngineServices, Stores};
use crate::sync::SyncService;

pub const PASSWORD: &str = "correct horse";

/// Stored hash is `plain:<password>`.
pub struct PlainPasswords;

impl PasswordVerifier for PlainPasswords {
    fn verify(&self, password_hash: &str, password: &str) -> bool {
        password_hash.strip_prefix("plain:") == Some(password)
    }
}

/// Unsigned tokens: the access token is the claims JSON.
pub struct JsonTokens;

impl TokenIssuer for JsonTokens {
    fn issue(
        &self,
        subject: &TokenSubject,
        context: &UserContext,
        policy: &TokenPolicy,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        let claims = AccessClaims {
            iss: policy.issuer.clone(),
            sub: subject.user_id,
            email: subject.email.clone(),
            context: context.clone(),
            issued_at: now,
            expires_at: policy.access_expires_at(now)?,
        };
        let access_token = serde_json::to_string(&claims).map_err(|e| TokenError::Issue(e.to_string()))?;
        let refresh_until = policy.refresh_expires_at(now)?;
        Ok(TokenPair {
            access_token,
            refresh_token: format!("refresh:{}:{}", subject.user_id, refresh_until.timestamp()),
            expires_in: policy.expires_in(),
            token_type: "Bearer".to_string(),
        })
    }

    fn validate(&self, access_token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenValidationError> {
        let claims: AccessClaims = serde_json::from_str(access_token)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
        validate_claims(&claims, now)?;
        Ok(claims)
    }
}

fn user(email: &str, first: &str, last: &str, active: bool, now: DateTime<Utc>) -> UserAccount {
    let mut user = UserAccount::new(email, first, last, format!("plain:{PASSWORD}"), now - Duration::days(30))
        .unwrap();
    user.is_active = active;
    user.updated_at = now - Duration::days(1);
    user
}

fn role(name: &str, scope: &str, now: DateTime<Utc>) -> Role {
    Role {
        id: RoleId::new(),
        name: name.to_string(),
        display_name: name.replace('_', " "),
        description: None,
        scope: scope.to_string(),
        is_active: true,
        created_at: now,
    }
}

fn permission(name: &str) -> PermissionRecord {
    let (resource, action) = name.split_once(':').unwrap();
    PermissionRecord {
        id: PermissionId::new(),
        name: name.to_string(),
        display_name: name.to_string(),
        resource_key: resource.to_string(),
        action: action.to_string(),
        is_active: true,
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryIamStore>,
    pub school: Tenant,
    pub other_school: Tenant,
    pub teacher: UserAccount,
    pub admin: UserAccount,
    pub inactive: UserAccount,
    pub teacher_role: Role,
    pub attendance: Resource,
    pub list_template: ScreenTemplate,
    pub grades_screen: ScreenInstance,
}

impl Fixture {
    pub fn new() -> Self {
        let now = Utc::now();
        let store = Arc::new(InMemoryIamStore::new());

        let school = Tenant {
            id: TenantId::new(),
            name: "North High".to_string(),
            is_active: true,
        };
        let other_school = Tenant {
            id: TenantId::new(),
            name: "South High".to_string(),
            is_active: true,
        };
        store.seed_tenant(school.clone());
        store.seed_tenant(other_school.clone());

        let teacher = user("teacher@example.com", "Tess", "Teacher", true, now);
        let admin = user("admin@example.com", "Ada", "Admin", true, now);
        let inactive = user("inactive@example.com", "Ina", "Active", false, now);
        let norole = user("norole@example.com", "Nora", "Role", true, now);
        for u in [&teacher, &admin, &inactive, &norole] {
            store.seed_user(u.clone());
        }

        let teacher_role = role("teacher", "school", now);
        let admin_role = role("super_admin", "system", now);
        store.seed_role(teacher_role.clone());
        store.seed_role(admin_role.clone());
        for name in ["grades:read", "grades:write", "attendance:write"] {
            store.seed_role_permission(teacher_role.id, permission(name));
        }
        for name in ["users:read", "users:write"] {
            store.seed_role_permission(admin_role.id, permission(name));
        }

        let granted = now - Duration::days(7);
        store.seed_assignment(RoleAssignment::grant(
            teacher.id,
            teacher_role.id,
            Some(school.id),
            None,
            Some(admin.id),
            None,
            granted,
        ));
        store.seed_assignment(RoleAssignment::grant(
            admin.id,
            admin_role.id,
            None,
            None,
            None,
            None,
            granted,
        ));

        let academics = Resource::new("academics", "Academics", 1).with_icon("book");
        let grades = Resource::new("grades", "Grades", 1).with_parent(&academics);
        let attendance = Resource::new("attendance", "Attendance", 2).with_parent(&academics);
        let administration = Resource::new("administration", "Administration", 2);
        let users = Resource::new("users", "Users", 1).with_parent(&administration);
        for r in [&academics, &grades, &attendance, &administration, &users] {
            store.seed_resource(r.clone());
        }

        let list_template = ScreenTemplate::new(
            "list",
            "List",
            json!({"layout": "table", "slots": ["columns", "filters"]}),
            now - Duration::days(3),
        );
        store.seed_template(list_template.clone());
        let grades_screen = ScreenInstance {
            id: ScreenInstanceId::new(),
            screen_key: "grades.list".to_string(),
            template_id: list_template.id,
            name: "Grades".to_string(),
            description: None,
            slot_data: json!({"columns": ["student"]}),
            scope: "school".to_string(),
            required_permission: Some("grades:read".to_string()),
            handler_key: None,
            is_active: true,
            created_at: now - Duration::days(3),
            updated_at: now - Duration::days(2),
        };
        store.seed_instance(grades_screen.clone());
        store.seed_binding(ScreenBinding {
            id: ScreenBindingId::new(),
            resource_id: grades.id,
            resource_key: grades.key.clone(),
            screen_key: grades_screen.screen_key.clone(),
            screen_type: "list".to_string(),
            is_default: true,
            is_active: true,
        });

        let fx = Self {
            store,
            school,
            other_school,
            teacher,
            admin,
            inactive,
            teacher_role,
            attendance,
            list_template,
            grades_screen,
        };
        fx.add_membership(fx.teacher.id, fx.school.id);
        fx.add_membership(fx.inactive.id, fx.school.id);
        fx.add_membership(norole.id, fx.school.id);
        fx
    }

    pub fn add_membership(&self, user_id: UserId, tenant_id: TenantId) {
        self.store.seed_membership(Membership {
            id: MembershipId::new(),
            user_id,
            tenant_id,
            is_active: true,
            created_at: Utc::now(),
        });
    }

    pub fn services(&self) -> EngineServices {
        EngineServices::new(
            Stores::from_backend(self.store.clone()),
            Arc::new(PlainPasswords),
            Arc::new(JsonTokens),
            &AppConfig::default(),
        )
    }

    pub fn resolver(&self) -> Arc<PermissionResolver> {
        self.services().resolver
    }

    pub fn contexts(&self) -> Arc<ContextManager> {
        self.services().contexts
    }

    pub fn menu(&self) -> Arc<MenuService> {
        self.services().menu
    }

    pub fn resources(&self) -> Arc<ResourceService> {
        self.services().resources
    }

    pub fn screens(&self) -> Arc<ScreenConfigService> {
        self.services().screens
    }

    pub fn roles(&self) -> Arc<RoleService> {
        self.services().roles
    }

    pub fn sync(&self) -> Arc<SyncService> {
        self.services().sync
    }
}
