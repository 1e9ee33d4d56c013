//! Login, context switching and available-context listing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use iamsync_auth::{
    AccessClaims, PasswordVerifier, Role, TokenIssuer, TokenPair, TokenPolicy, TokenSubject,
    TokenValidationError, UserAccount, UserContext,
};
use iamsync_core::{RoleId, TenantId, UnitId, UserId};
use iamsync_infra::store::{
    AssignmentScope, AssignmentStore, MembershipStore, RoleStore, TenantStore, UserStore,
};

use crate::error::{ServiceError, ServiceResult, db};
use crate::resolver::{PermissionResolver, tenant_name, unit_name};

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSummary {
    pub id: TenantId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub tokens: TokenPair,
    pub user: UserInfo,
    pub tenants: Vec<TenantSummary>,
    pub context: UserContext,
}

/// Short description of the context a switch landed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub tenant_id: TenantId,
    pub role: String,
    pub user_id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchContextResponse {
    pub tokens: TokenPair,
    pub summary: ContextSummary,
    pub context: UserContext,
}

/// Outcome of checking an access token; rejections carry the error tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenVerification {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TokenVerification {
    fn accepted(claims: AccessClaims) -> Self {
        Self {
            valid: true,
            user_id: Some(claims.sub),
            tenant_id: claims.context.tenant_id(),
            email: Some(claims.email),
            expires_at: Some(claims.expires_at),
            error: None,
        }
    }

    fn rejected(error: &TokenValidationError) -> Self {
        Self {
            valid: false,
            user_id: None,
            email: None,
            tenant_id: None,
            expires_at: None,
            error: Some(error.code().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableContexts {
    pub current: Option<UserContext>,
    pub available: Vec<UserContext>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

pub struct ContextManager {
    users: Arc<dyn UserStore>,
    memberships: Arc<dyn MembershipStore>,
    tenants: Arc<dyn TenantStore>,
    roles: Arc<dyn RoleStore>,
    assignments: Arc<dyn AssignmentStore>,
    resolver: Arc<PermissionResolver>,
    passwords: Arc<dyn PasswordVerifier>,
    tokens: Arc<dyn TokenIssuer>,
    policy: TokenPolicy,
    last_seen_timeout: Duration,
}

impl ContextManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserStore>,
        memberships: Arc<dyn MembershipStore>,
        tenants: Arc<dyn TenantStore>,
        roles: Arc<dyn RoleStore>,
        assignments: Arc<dyn AssignmentStore>,
        resolver: Arc<PermissionResolver>,
        passwords: Arc<dyn PasswordVerifier>,
        tokens: Arc<dyn TokenIssuer>,
        policy: TokenPolicy,
        last_seen_timeout: Duration,
    ) -> Self {
        Self {
            users,
            memberships,
            tenants,
            roles,
            assignments,
            resolver,
            passwords,
            tokens,
            policy,
            last_seen_timeout,
        }
    }

    /// Authenticate and resolve the initial context (first membership's tenant).
    pub async fn login(&self, email: &str, password: &str) -> ServiceResult<LoginResponse> {
        let user = self
            .users
            .find_user_by_email(email)
            .await
            .map_err(db("find_user_by_email"))?
            .ok_or(ServiceError::InvalidCredentials)?;

        // Password first so an inactive account is indistinguishable from a wrong guess.
        if !self.passwords.verify(&user.password_hash, password) {
            return Err(ServiceError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(ServiceError::InactiveAccount);
        }

        let tenants = self.member_tenants(user.id).await?;
        let default_tenant = tenants.first().map(|t| t.id);

        let context = self
            .resolver
            .resolve(user.id, default_tenant, None)
            .await?
            .ok_or(ServiceError::NoRoleResolved)?;

        let tokens = self.tokens.issue(&subject(&user), &context, &self.policy, Utc::now())?;
        self.record_last_seen(user.id);

        info!(
            user_id = %user.id,
            tenant_id = ?context.tenant_id(),
            role = context.role_name(),
            "user logged in"
        );

        Ok(LoginResponse {
            tokens,
            user: UserInfo {
                id: user.id,
                full_name: user.full_name(),
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                tenant_id: default_tenant,
            },
            tenants,
            context,
        })
    }

    /// Move the user into `target`, issuing fresh tokens.
    pub async fn switch_context(
        &self,
        user_id: UserId,
        target: TenantId,
    ) -> ServiceResult<SwitchContextResponse> {
        let user = self
            .users
            .find_user(user_id)
            .await
            .map_err(db("find_user"))?
            .ok_or(ServiceError::NotFound("user"))?;
        if !user.is_active {
            return Err(ServiceError::InactiveAccount);
        }

        let membership = self
            .memberships
            .find_membership(user_id, target)
            .await
            .map_err(db("find_membership"))?;

        let context = match membership {
            Some(_) => self
                .resolver
                .resolve(user_id, Some(target), None)
                .await?
                .ok_or(ServiceError::NoRoleResolved)?,
            None => {
                let global = self
                    .resolver
                    .resolve_global(user_id)
                    .await?
                    .ok_or(ServiceError::NoMembership)?;
                let tenant = self
                    .tenants
                    .find_tenant(target)
                    .await
                    .map_err(db("find_tenant"))?
                    .ok_or(ServiceError::InvalidTarget)?;
                UserContext::new(
                    global.role_id(),
                    global.role_name(),
                    global.permissions().iter().cloned(),
                )
                .with_tenant(tenant.id, Some(tenant.name))
            }
        };

        let tokens = self.tokens.issue(&subject(&user), &context, &self.policy, Utc::now())?;

        info!(
            user_id = %user_id,
            tenant_id = %target,
            role = context.role_name(),
            "context switched"
        );

        Ok(SwitchContextResponse {
            tokens,
            summary: ContextSummary {
                tenant_id: target,
                role: context.role_name().to_string(),
                user_id,
                email: user.email,
            },
            context,
        })
    }

    /// Check an access token and report who it speaks for.
    ///
    /// Never fails: decoding, time-window and issuer problems come back as
    /// `valid: false` with the error tag.
    pub fn verify_token(&self, access_token: &str) -> TokenVerification {
        let checked = self
            .tokens
            .validate(access_token, Utc::now())
            .and_then(|claims| {
                if claims.iss == self.policy.issuer {
                    Ok(claims)
                } else {
                    Err(TokenValidationError::UnknownIssuer(claims.iss))
                }
            });
        match checked {
            Ok(claims) => TokenVerification::accepted(claims),
            Err(error) => {
                debug!(code = error.code(), %error, "token rejected");
                TokenVerification::rejected(&error)
            }
        }
    }

    /// One context per effective assignment, in assignment order.
    ///
    /// Role, tenant and unit lookups are cached for the duration of the call.
    pub async fn list_available_contexts(
        &self,
        user_id: UserId,
        current: Option<UserContext>,
    ) -> ServiceResult<AvailableContexts> {
        let now = Utc::now();
        let assignments = self
            .assignments
            .list_assignments(user_id, &AssignmentScope::any())
            .await
            .map_err(db("list_assignments"))?;

        let mut roles: HashMap<RoleId, Option<Role>> = HashMap::new();
        let mut tenant_names: HashMap<TenantId, Option<String>> = HashMap::new();
        let mut unit_names: HashMap<UnitId, Option<String>> = HashMap::new();
        let mut available = Vec::new();

        for assignment in assignments.into_iter().filter(|a| a.is_effective(now)) {
            if !roles.contains_key(&assignment.role_id) {
                let role = match self.roles.find_role(assignment.role_id).await {
                    Ok(role) => role,
                    Err(error) => {
                        warn!(role_id = %assignment.role_id, %error, "role lookup failed");
                        None
                    }
                };
                roles.insert(assignment.role_id, role);
            }
            let Some(Some(role)) = roles.get(&assignment.role_id) else {
                warn!(
                    user_id = %user_id,
                    role_id = %assignment.role_id,
                    "skipping context for unavailable role"
                );
                continue;
            };

            let scope = AssignmentScope::exact(assignment.tenant_id, assignment.unit_id);
            let permissions = match self.assignments.aggregate_permissions(user_id, &scope, now).await {
                Ok(perms) => perms,
                Err(error) => {
                    warn!(user_id = %user_id, %error, "permission lookup failed for context");
                    Vec::new()
                }
            };

            let mut context = UserContext::new(role.id, role.name.clone(), permissions);
            if let Some(tenant_id) = assignment.tenant_id {
                if !tenant_names.contains_key(&tenant_id) {
                    let name = tenant_name(self.tenants.as_ref(), tenant_id).await;
                    tenant_names.insert(tenant_id, name);
                }
                let name = tenant_names.get(&tenant_id).cloned().flatten();
                context = context.with_tenant(tenant_id, name);
            }
            if let Some(unit_id) = assignment.unit_id {
                if !unit_names.contains_key(&unit_id) {
                    let name = unit_name(self.tenants.as_ref(), unit_id).await;
                    unit_names.insert(unit_id, name);
                }
                let name = unit_names.get(&unit_id).cloned().flatten();
                context = context.with_unit(unit_id, name);
            }
            available.push(context);
        }

        Ok(AvailableContexts { current, available })
    }

    /// Active memberships, one per tenant, dropping tenants that no longer exist.
    async fn member_tenants(&self, user_id: UserId) -> ServiceResult<Vec<TenantSummary>> {
        let memberships = self
            .memberships
            .list_memberships(user_id)
            .await
            .map_err(db("list_memberships"))?;

        let mut seen = HashSet::new();
        let mut tenants = Vec::new();
        for membership in memberships {
            if !seen.insert(membership.tenant_id) {
                continue;
            }
            match self
                .tenants
                .find_tenant(membership.tenant_id)
                .await
                .map_err(db("find_tenant"))?
            {
                Some(tenant) => tenants.push(TenantSummary {
                    id: tenant.id,
                    name: tenant.name,
                }),
                None => debug!(tenant_id = %membership.tenant_id, "membership points at missing tenant"),
            }
        }
        Ok(tenants)
    }

    /// Detached, best-effort activity write with its own deadline.
    fn record_last_seen(&self, user_id: UserId) {
        let users = Arc::clone(&self.users);
        let timeout = self.last_seen_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, users.touch_user(user_id, Utc::now())).await {
                Ok(Ok(())) => debug!(user_id = %user_id, "last seen updated"),
                Ok(Err(error)) => warn!(user_id = %user_id, %error, "last seen update failed"),
                Err(_) => warn!(user_id = %user_id, "last seen update timed out"),
            }
        });
    }
}

fn subject(user: &UserAccount) -> TokenSubject {
    TokenSubject {
        user_id: user.id,
        email: user.email.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, PASSWORD};
    use iamsync_auth::{PermissionRecord, RoleAssignment};
    use iamsync_core::PermissionId;

    #[tokio::test]
    async fn login_resolves_first_school() {
        let fx = Fixture::new();
        let resp = fx.contexts().login("Teacher@Example.com", PASSWORD).await.unwrap();

        assert_eq!(resp.user.id, fx.teacher.id);
        assert_eq!(resp.user.full_name, "Tess Teacher");
        assert_eq!(resp.user.tenant_id, Some(fx.school.id));
        assert_eq!(resp.tenants.len(), 1);
        assert_eq!(resp.context.role_name(), "teacher");
        assert!(resp.context.has_permission("grades:read"));
        assert_eq!(resp.tokens.token_type, "Bearer");
    }

    #[tokio::test]
    async fn login_rejects_unknown_email_and_bad_password_alike() {
        let fx = Fixture::new();
        let unknown = fx.contexts().login("nobody@example.com", PASSWORD).await.unwrap_err();
        let wrong = fx.contexts().login("teacher@example.com", "nope").await.unwrap_err();
        assert_eq!(unknown.code(), "invalid_credentials");
        assert_eq!(wrong.code(), "invalid_credentials");
    }

    #[tokio::test]
    async fn login_rejects_inactive_account() {
        let fx = Fixture::new();
        let err = fx.contexts().login("inactive@example.com", PASSWORD).await.unwrap_err();
        assert_eq!(err.code(), "inactive_account");
    }

    #[tokio::test]
    async fn login_without_roles_fails() {
        let fx = Fixture::new();
        let err = fx.contexts().login("norole@example.com", PASSWORD).await.unwrap_err();
        assert_eq!(err.code(), "no_role_resolved");
    }

    #[tokio::test]
    async fn login_succeeds_when_last_seen_write_fails() {
        let fx = Fixture::new();
        fx.store.fail_on("touch_user");
        assert!(fx.contexts().login("teacher@example.com", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn login_records_last_seen_in_the_background() {
        let fx = Fixture::new();
        let before = fx.teacher.updated_at;
        fx.contexts().login("teacher@example.com", PASSWORD).await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let user = fx.store.find_user(fx.teacher.id).await.unwrap().unwrap();
                if user.updated_at > before {
                    return user.updated_at;
                }
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(seen.is_ok(), "last seen was never written after login");
    }

    #[tokio::test]
    async fn login_without_membership_keeps_permissions_in_the_claimed_tenant() {
        let fx = Fixture::new();
        let principal = Role {
            id: RoleId::new(),
            name: "principal".to_string(),
            display_name: "Principal".to_string(),
            description: None,
            scope: "school".to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        fx.store.seed_role(principal.clone());
        fx.store.seed_role_permission(
            principal.id,
            PermissionRecord {
                id: PermissionId::new(),
                name: "reports:read".to_string(),
                display_name: "Read reports".to_string(),
                resource_key: "reports".to_string(),
                action: "read".to_string(),
                is_active: true,
            },
        );
        let earliest = Utc::now() - chrono::Duration::days(30);
        fx.store.seed_assignment(RoleAssignment::grant(
            fx.admin.id,
            fx.teacher_role.id,
            Some(fx.school.id),
            None,
            None,
            None,
            earliest,
        ));
        fx.store.seed_assignment(RoleAssignment::grant(
            fx.admin.id,
            principal.id,
            Some(fx.other_school.id),
            None,
            None,
            None,
            earliest + chrono::Duration::days(1),
        ));

        let resp = fx.contexts().login("admin@example.com", PASSWORD).await.unwrap();
        assert_eq!(resp.context.tenant_name(), Some("North High"));
        assert_eq!(resp.context.role_name(), "teacher");
        assert!(!resp.context.has_permission("reports:read"));
        assert!(!resp.context.has_permission("users:write"));
        assert!(resp.context.has_permission("grades:write"));
    }

    #[tokio::test]
    async fn issued_tokens_follow_the_policy_and_verify() {
        let fx = Fixture::new();
        let resp = fx.contexts().login("teacher@example.com", PASSWORD).await.unwrap();
        assert_eq!(resp.tokens.expires_in, 900);

        let verified = fx.contexts().verify_token(&resp.tokens.access_token);
        assert!(verified.valid);
        assert_eq!(verified.user_id, Some(fx.teacher.id));
        assert_eq!(verified.email.as_deref(), Some("teacher@example.com"));
        assert_eq!(verified.tenant_id, Some(fx.school.id));
        assert!(verified.expires_at.is_some_and(|at| at > Utc::now()));
        assert_eq!(verified.error, None);
    }

    #[tokio::test]
    async fn verify_reports_rejections_as_tags() {
        let fx = Fixture::new();
        let garbage = fx.contexts().verify_token("not a token");
        assert!(!garbage.valid);
        assert_eq!(garbage.error.as_deref(), Some("malformed_token"));
        assert_eq!(garbage.user_id, None);

        let now = Utc::now();
        let mut claims = AccessClaims {
            iss: "iamsync".to_string(),
            sub: fx.teacher.id,
            email: fx.teacher.email.clone(),
            context: UserContext::new(fx.teacher_role.id, "teacher", Vec::new()),
            issued_at: now - chrono::Duration::hours(2),
            expires_at: now - chrono::Duration::hours(1),
        };
        let expired = fx.contexts().verify_token(&serde_json::to_string(&claims).unwrap());
        assert_eq!(expired.error.as_deref(), Some("token_expired"));

        claims.iss = "someone-else".to_string();
        claims.expires_at = now + chrono::Duration::hours(1);
        let foreign = fx.contexts().verify_token(&serde_json::to_string(&claims).unwrap());
        assert!(!foreign.valid);
        assert_eq!(foreign.error.as_deref(), Some("unknown_issuer"));
    }

    #[tokio::test]
    async fn switch_requires_existing_active_user() {
        let fx = Fixture::new();
        let err = fx
            .contexts()
            .switch_context(UserId::new(), fx.school.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = fx
            .contexts()
            .switch_context(fx.inactive.id, fx.school.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "inactive_account");
    }

    #[tokio::test]
    async fn switch_without_membership_or_global_role_is_no_membership() {
        let fx = Fixture::new();
        let err = fx
            .contexts()
            .switch_context(fx.teacher.id, fx.other_school.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_membership");
    }

    #[tokio::test]
    async fn global_role_switch_needs_existing_tenant() {
        let fx = Fixture::new();
        let err = fx
            .contexts()
            .switch_context(fx.admin.id, TenantId::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_target");

        let resp = fx
            .contexts()
            .switch_context(fx.admin.id, fx.other_school.id)
            .await
            .unwrap();
        assert_eq!(resp.context.role_name(), "super_admin");
        assert_eq!(resp.context.tenant_id(), Some(fx.other_school.id));
        assert_eq!(resp.context.tenant_name(), Some("South High"));
        assert_eq!(resp.summary.role, "super_admin");
    }

    #[tokio::test]
    async fn member_without_role_in_target_is_no_role_resolved() {
        let fx = Fixture::new();
        fx.add_membership(fx.teacher.id, fx.other_school.id);
        let err = fx
            .contexts()
            .switch_context(fx.teacher.id, fx.other_school.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_role_resolved");
    }

    #[tokio::test]
    async fn switch_into_member_school() {
        let fx = Fixture::new();
        let resp = fx
            .contexts()
            .switch_context(fx.teacher.id, fx.school.id)
            .await
            .unwrap();
        assert_eq!(resp.context.tenant_id(), Some(fx.school.id));
        assert_eq!(resp.summary.email, "teacher@example.com");
    }

    #[tokio::test]
    async fn available_contexts_skip_unknown_roles() {
        let fx = Fixture::new();
        fx.store.seed_assignment(RoleAssignment::grant(
            fx.teacher.id,
            RoleId::new(),
            Some(fx.other_school.id),
            None,
            None,
            None,
            Utc::now(),
        ));

        let current = fx
            .resolver()
            .resolve(fx.teacher.id, Some(fx.school.id), None)
            .await
            .unwrap();
        let listed = fx
            .contexts()
            .list_available_contexts(fx.teacher.id, current.clone())
            .await
            .unwrap();

        assert_eq!(listed.current, current);
        assert_eq!(listed.available.len(), 1);
        assert_eq!(listed.available[0].tenant_name(), Some("North High"));
    }

    #[tokio::test]
    async fn available_contexts_survive_permission_failures() {
        let fx = Fixture::new();
        fx.store.fail_on("aggregate_permissions");
        let listed = fx
            .contexts()
            .list_available_contexts(fx.teacher.id, None)
            .await
            .unwrap();
        assert_eq!(listed.available.len(), 1);
        assert!(listed.available[0].permissions().is_empty());
    }
}
