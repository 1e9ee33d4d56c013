//! Navigation menu service.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::warn;

use iamsync_auth::Permission;
use iamsync_infra::store::{ResourceStore, ScreenBindingStore};

use crate::error::{ServiceResult, db};

pub mod tree;

pub use tree::{MenuNode, MenuPlan, ScreenMap, build_menu};

pub struct MenuService {
    resources: Arc<dyn ResourceStore>,
    bindings: Arc<dyn ScreenBindingStore>,
}

impl MenuService {
    pub fn new(resources: Arc<dyn ResourceStore>, bindings: Arc<dyn ScreenBindingStore>) -> Self {
        Self {
            resources,
            bindings,
        }
    }

    /// Menu restricted to resources reachable from `permissions`.
    pub async fn menu_for_user(&self, permissions: &BTreeSet<Permission>) -> ServiceResult<Vec<MenuNode>> {
        if permissions.iter().all(|p| p.resource_key().is_none()) {
            return Ok(Vec::new());
        }
        self.menu(Some(permissions)).await
    }

    /// Every menu-visible resource, without permission data.
    pub async fn full_menu(&self) -> ServiceResult<Vec<MenuNode>> {
        self.menu(None).await
    }

    async fn menu(&self, permissions: Option<&BTreeSet<Permission>>) -> ServiceResult<Vec<MenuNode>> {
        let resources = self
            .resources
            .list_menu_resources()
            .await
            .map_err(db("list_menu_resources"))?;

        let plan = MenuPlan::new(&resources, permissions);
        let mut screens = ScreenMap::new();
        for key in plan.visible_keys() {
            match self.bindings.list_bindings_by_key(key).await {
                Ok(bindings) => {
                    // later bindings of the same type win
                    let by_type: BTreeMap<String, String> = bindings
                        .into_iter()
                        .map(|b| (b.screen_type, b.screen_key))
                        .collect();
                    if !by_type.is_empty() {
                        screens.insert(key.to_string(), by_type);
                    }
                }
                Err(error) => warn!(resource_key = key, %error, "screen binding lookup failed"),
            }
        }

        Ok(plan.build(&screens))
    }
}
