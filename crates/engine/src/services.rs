//! Service wiring: one place that turns store handles and config into services.

use std::sync::Arc;

use anyhow::Context;

use iamsync_auth::{PasswordVerifier, TokenIssuer};
use iamsync_infra::AppConfig;
use iamsync_infra::store::{
    AssignmentStore, MembershipStore, PermissionStore, ResourceStore, RoleStore,
    ScreenBindingStore, ScreenInstanceStore, ScreenTemplateStore, TenantStore, UserStore,
};

use crate::contexts::ContextManager;
use crate::menu::MenuService;
use crate::resolver::PermissionResolver;
use crate::resources::ResourceService;
use crate::roles::RoleService;
use crate::screens::ScreenConfigService;
use crate::sync::SyncService;

/// Store handles, one per persistence concern.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub roles: Arc<dyn RoleStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub resources: Arc<dyn ResourceStore>,
    pub bindings: Arc<dyn ScreenBindingStore>,
    pub templates: Arc<dyn ScreenTemplateStore>,
    pub instances: Arc<dyn ScreenInstanceStore>,
}

impl Stores {
    /// Use a single backend for every concern.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: UserStore
            + MembershipStore
            + TenantStore
            + RoleStore
            + PermissionStore
            + AssignmentStore
            + ResourceStore
            + ScreenBindingStore
            + ScreenTemplateStore
            + ScreenInstanceStore
            + 'static,
    {
        Self {
            users: backend.clone(),
            memberships: backend.clone(),
            tenants: backend.clone(),
            roles: backend.clone(),
            permissions: backend.clone(),
            assignments: backend.clone(),
            resources: backend.clone(),
            bindings: backend.clone(),
            templates: backend.clone(),
            instances: backend,
        }
    }
}

#[derive(Clone)]
pub struct EngineServices {
    pub resolver: Arc<PermissionResolver>,
    pub contexts: Arc<ContextManager>,
    pub menu: Arc<MenuService>,
    pub resources: Arc<ResourceService>,
    pub screens: Arc<ScreenConfigService>,
    pub roles: Arc<RoleService>,
    pub sync: Arc<SyncService>,
}

impl EngineServices {
    pub fn new(
        stores: Stores,
        passwords: Arc<dyn PasswordVerifier>,
        tokens: Arc<dyn TokenIssuer>,
        config: &AppConfig,
    ) -> Self {
        let resolver = Arc::new(PermissionResolver::new(
            stores.assignments.clone(),
            stores.roles.clone(),
            stores.tenants.clone(),
        ));
        let contexts = Arc::new(ContextManager::new(
            stores.users,
            stores.memberships,
            stores.tenants,
            stores.roles.clone(),
            stores.assignments.clone(),
            resolver.clone(),
            passwords,
            tokens,
            config.auth.token_policy(),
            config.auth.last_seen_timeout,
        ));
        let menu = Arc::new(MenuService::new(stores.resources.clone(), stores.bindings.clone()));
        let resources = Arc::new(ResourceService::new(stores.resources.clone()));
        let screens = Arc::new(ScreenConfigService::new(
            stores.templates,
            stores.instances,
            stores.resources,
            stores.bindings,
        ));
        let roles = Arc::new(RoleService::new(
            stores.roles,
            stores.permissions,
            stores.assignments,
        ));
        let sync = Arc::new(SyncService::new(
            menu.clone(),
            contexts.clone(),
            screens.clone(),
            config.sync.screen_limit,
        ));

        Self {
            resolver,
            contexts,
            menu,
            resources,
            screens,
            roles,
            sync,
        }
    }

    /// Wire services with configuration read from `IAMSYNC_*` variables.
    pub fn from_env(
        stores: Stores,
        passwords: Arc<dyn PasswordVerifier>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> anyhow::Result<Self> {
        let config = AppConfig::from_env().context("loading engine configuration")?;
        tracing::info!(environment = %config.environment, "engine services configured");
        Ok(Self::new(stores, passwords, tokens, &config))
    }
}
