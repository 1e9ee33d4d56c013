//! Resource catalog maintenance: the rows the menu tree is built from.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use iamsync_auth::Resource;
use iamsync_core::ResourceId;
use iamsync_infra::store::{ResourceStore, StoreError};

use crate::error::{ServiceError, ServiceResult, db};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResource {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub parent_id: Option<ResourceId>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub is_menu_visible: bool,
    pub scope: String,
}

/// Re-parenting instruction for [`ResourcePatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentChange {
    /// Make the resource a root.
    Detach,
    Attach(ResourceId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePatch {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub parent: Option<ParentChange>,
    pub sort_order: Option<i32>,
    pub is_menu_visible: Option<bool>,
    pub scope: Option<String>,
    pub is_active: Option<bool>,
}

fn require(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(format!("{field} is required")));
    }
    Ok(())
}

pub struct ResourceService {
    resources: Arc<dyn ResourceStore>,
}

impl ResourceService {
    pub fn new(resources: Arc<dyn ResourceStore>) -> Self {
        Self { resources }
    }

    /// Every resource, including hidden and inactive ones, in menu order.
    pub async fn list_resources(&self) -> ServiceResult<Vec<Resource>> {
        self.resources.list_resources().await.map_err(db("list_resources"))
    }

    pub async fn get_resource(&self, id: ResourceId) -> ServiceResult<Resource> {
        self.resources
            .find_resource(id)
            .await
            .map_err(db("find_resource"))?
            .ok_or(ServiceError::NotFound("resource"))
    }

    pub async fn create_resource(&self, req: NewResource) -> ServiceResult<Resource> {
        require("key", &req.key)?;
        require("display_name", &req.display_name)?;
        require("scope", &req.scope)?;
        if let Some(parent_id) = req.parent_id {
            self.ensure_parent(parent_id).await?;
        }

        let resource = Resource {
            id: ResourceId::new(),
            key: req.key,
            display_name: req.display_name,
            description: req.description.filter(|d| !d.is_empty()),
            icon: req.icon.filter(|i| !i.is_empty()),
            parent_id: req.parent_id,
            is_menu_visible: req.is_menu_visible,
            is_active: true,
            sort_order: req.sort_order,
            scope: req.scope,
        };
        self.resources
            .insert_resource(resource.clone())
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => ServiceError::AlreadyExists("resource"),
                other => db("insert_resource")(other),
            })?;

        info!(resource_id = %resource.id, key = %resource.key, "resource created");
        Ok(resource)
    }

    /// Apply `patch`; attaching under a descendant (or itself) is rejected.
    pub async fn update_resource(&self, id: ResourceId, patch: ResourcePatch) -> ServiceResult<Resource> {
        let mut resource = self.get_resource(id).await?;

        if let Some(name) = patch.display_name {
            require("display_name", &name)?;
            resource.display_name = name;
        }
        if let Some(description) = patch.description {
            resource.description = Some(description);
        }
        if let Some(icon) = patch.icon {
            resource.icon = Some(icon);
        }
        match patch.parent {
            None => {}
            Some(ParentChange::Detach) => resource.parent_id = None,
            Some(ParentChange::Attach(parent_id)) => {
                self.ensure_parent(parent_id).await?;
                self.ensure_acyclic(id, parent_id).await?;
                resource.parent_id = Some(parent_id);
            }
        }
        if let Some(order) = patch.sort_order {
            resource.sort_order = order;
        }
        if let Some(visible) = patch.is_menu_visible {
            resource.is_menu_visible = visible;
        }
        if let Some(scope) = patch.scope {
            require("scope", &scope)?;
            resource.scope = scope;
        }
        if let Some(active) = patch.is_active {
            resource.is_active = active;
        }

        self.resources
            .update_resource(&resource)
            .await
            .map_err(db("update_resource"))?;

        info!(resource_id = %id, key = %resource.key, "resource updated");
        Ok(resource)
    }

    async fn ensure_parent(&self, parent_id: ResourceId) -> ServiceResult<()> {
        let exists = self
            .resources
            .find_resource(parent_id)
            .await
            .map_err(db("find_resource"))?
            .is_some();
        if !exists {
            return Err(ServiceError::validation("parent_id does not name a resource"));
        }
        Ok(())
    }

    /// Walk up from `parent_id`; meeting `id` on the way means a cycle.
    async fn ensure_acyclic(&self, id: ResourceId, parent_id: ResourceId) -> ServiceResult<()> {
        let parents: HashMap<ResourceId, Option<ResourceId>> = self
            .list_resources()
            .await?
            .into_iter()
            .map(|r| (r.id, r.parent_id))
            .collect();

        let mut cursor = Some(parent_id);
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == id {
                return Err(ServiceError::validation("a resource cannot be nested under itself"));
            }
            steps += 1;
            if steps > parents.len() {
                break;
            }
            cursor = parents.get(&current).copied().flatten();
        }
        Ok(())
    }
}
