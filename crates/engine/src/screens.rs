//! Screen template/instance configuration and resolution.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use iamsync_auth::{ScreenBinding, ScreenInstance, ScreenTemplate};
use iamsync_core::{ResourceId, ScreenBindingId, ScreenInstanceId, ScreenTemplateId};
use iamsync_infra::store::{
    InstanceFilter, Page, ResourceStore, ScreenBindingStore, ScreenInstanceStore,
    ScreenTemplateStore, StoreError, TemplateFilter,
};

use crate::error::{ServiceError, ServiceResult, db};

const DEFAULT_SCOPE: &str = "system";

// ─────────────────────────────────────────────────────────────────────────────
// Requests / responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScreenTemplate {
    pub pattern: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub definition: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenTemplatePatch {
    pub pattern: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub definition: Option<Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScreenInstance {
    pub screen_key: String,
    pub template_id: ScreenTemplateId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub slot_data: Option<Value>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub required_permission: Option<String>,
    #[serde(default)]
    pub handler_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenInstancePatch {
    pub screen_key: Option<String>,
    pub template_id: Option<ScreenTemplateId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub slot_data: Option<Value>,
    pub scope: Option<String>,
    pub required_permission: Option<String>,
    pub handler_key: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkScreen {
    pub resource_id: ResourceId,
    pub screen_key: String,
    pub screen_type: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

/// Instance and template combined, as delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedScreen {
    pub screen_id: ScreenInstanceId,
    pub screen_key: String,
    pub screen_name: String,
    pub pattern: String,
    pub version: u32,
    pub template: Value,
    pub slot_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenVersion {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

fn require(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// Absent or `null` slot data is stored as an empty object.
fn normalize_slot_data(slot_data: Option<Value>) -> Value {
    match slot_data {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(v) => v,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

pub struct ScreenConfigService {
    templates: Arc<dyn ScreenTemplateStore>,
    instances: Arc<dyn ScreenInstanceStore>,
    resources: Arc<dyn ResourceStore>,
    bindings: Arc<dyn ScreenBindingStore>,
}

impl ScreenConfigService {
    pub fn new(
        templates: Arc<dyn ScreenTemplateStore>,
        instances: Arc<dyn ScreenInstanceStore>,
        resources: Arc<dyn ResourceStore>,
        bindings: Arc<dyn ScreenBindingStore>,
    ) -> Self {
        Self {
            templates,
            instances,
            resources,
            bindings,
        }
    }

    // ── templates ───────────────────────────────────────────────────────────

    pub async fn create_template(&self, req: NewScreenTemplate) -> ServiceResult<ScreenTemplate> {
        require("pattern", &req.pattern)?;
        require("name", &req.name)?;

        let mut template = ScreenTemplate::new(req.pattern, req.name, req.definition, Utc::now());
        template.description = req.description;
        self.templates
            .insert_template(template.clone())
            .await
            .map_err(db("insert_template"))?;

        info!(template_id = %template.id, pattern = %template.pattern, "screen template created");
        Ok(template)
    }

    pub async fn get_template(&self, id: ScreenTemplateId) -> ServiceResult<ScreenTemplate> {
        self.templates
            .find_template(id)
            .await
            .map_err(db("find_template"))?
            .ok_or(ServiceError::NotFound("screen template"))
    }

    pub async fn list_templates(
        &self,
        pattern: Option<String>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> ServiceResult<Paged<ScreenTemplate>> {
        let window = Page::numbered(page, per_page);
        let filter = TemplateFilter {
            pattern: pattern.filter(|p| !p.is_empty()),
        };
        let (items, total) = self
            .templates
            .list_templates(&filter, window)
            .await
            .map_err(db("list_templates"))?;
        Ok(Paged {
            items,
            total,
            page: page.filter(|p| *p > 0).unwrap_or(1),
            per_page: window.limit,
        })
    }

    /// The version only moves when the definition content changes.
    pub async fn update_template(
        &self,
        id: ScreenTemplateId,
        patch: ScreenTemplatePatch,
    ) -> ServiceResult<ScreenTemplate> {
        let mut template = self.get_template(id).await?;

        if let Some(pattern) = patch.pattern {
            require("pattern", &pattern)?;
            template.pattern = pattern;
        }
        if let Some(name) = patch.name {
            require("name", &name)?;
            template.name = name;
        }
        if let Some(description) = patch.description {
            template.description = Some(description);
        }
        let bumped = patch
            .definition
            .is_some_and(|definition| template.apply_definition(definition));
        if let Some(active) = patch.is_active {
            template.is_active = active;
        }
        template.updated_at = Utc::now();

        self.templates
            .update_template(&template)
            .await
            .map_err(db("update_template"))?;

        info!(template_id = %id, version = template.version, bumped, "screen template updated");
        Ok(template)
    }

    pub async fn delete_template(&self, id: ScreenTemplateId) -> ServiceResult<()> {
        if !self.templates.delete_template(id).await.map_err(db("delete_template"))? {
            return Err(ServiceError::NotFound("screen template"));
        }
        info!(template_id = %id, "screen template deleted");
        Ok(())
    }

    // ── instances ───────────────────────────────────────────────────────────

    pub async fn create_instance(&self, req: NewScreenInstance) -> ServiceResult<ScreenInstance> {
        require("screen_key", &req.screen_key)?;
        require("name", &req.name)?;
        self.ensure_template(req.template_id).await?;

        let now = Utc::now();
        let instance = ScreenInstance {
            id: ScreenInstanceId::new(),
            screen_key: req.screen_key,
            template_id: req.template_id,
            name: req.name,
            description: req.description,
            slot_data: normalize_slot_data(req.slot_data),
            scope: req
                .scope
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            required_permission: req.required_permission.filter(|p| !p.is_empty()),
            handler_key: req.handler_key,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.instances
            .insert_instance(instance.clone())
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => ServiceError::AlreadyExists("screen instance"),
                other => db("insert_instance")(other),
            })?;

        info!(screen_key = %instance.screen_key, "screen instance created");
        Ok(instance)
    }

    pub async fn get_instance(&self, id: ScreenInstanceId) -> ServiceResult<ScreenInstance> {
        self.instances
            .find_instance(id)
            .await
            .map_err(db("find_instance"))?
            .ok_or(ServiceError::NotFound("screen instance"))
    }

    pub async fn get_instance_by_key(&self, screen_key: &str) -> ServiceResult<ScreenInstance> {
        self.instances
            .find_instance_by_key(screen_key)
            .await
            .map_err(db("find_instance_by_key"))?
            .ok_or(ServiceError::NotFound("screen instance"))
    }

    pub async fn list_instances(
        &self,
        template_id: Option<ScreenTemplateId>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> ServiceResult<Paged<ScreenInstance>> {
        let window = Page::numbered(page, per_page);
        let (items, total) = self
            .instances
            .list_instances(&InstanceFilter { template_id }, window)
            .await
            .map_err(db("list_instances"))?;
        Ok(Paged {
            items,
            total,
            page: page.filter(|p| *p > 0).unwrap_or(1),
            per_page: window.limit,
        })
    }

    pub async fn update_instance(
        &self,
        id: ScreenInstanceId,
        patch: ScreenInstancePatch,
    ) -> ServiceResult<ScreenInstance> {
        let mut instance = self.get_instance(id).await?;

        if let Some(key) = patch.screen_key {
            require("screen_key", &key)?;
            if key != instance.screen_key {
                let taken = self
                    .instances
                    .find_instance_by_key(&key)
                    .await
                    .map_err(db("find_instance_by_key"))?
                    .is_some();
                if taken {
                    return Err(ServiceError::AlreadyExists("screen instance"));
                }
                instance.screen_key = key;
            }
        }
        if let Some(template_id) = patch.template_id {
            self.ensure_template(template_id).await?;
            instance.template_id = template_id;
        }
        if let Some(name) = patch.name {
            require("name", &name)?;
            instance.name = name;
        }
        if let Some(description) = patch.description {
            instance.description = Some(description);
        }
        if let Some(slot_data) = patch.slot_data {
            instance.slot_data = normalize_slot_data(Some(slot_data));
        }
        if let Some(scope) = patch.scope {
            instance.scope = scope;
        }
        if let Some(permission) = patch.required_permission {
            instance.required_permission = Some(permission).filter(|p| !p.is_empty());
        }
        if let Some(handler) = patch.handler_key {
            instance.handler_key = Some(handler);
        }
        if let Some(active) = patch.is_active {
            instance.is_active = active;
        }
        instance.updated_at = Utc::now();

        self.instances
            .update_instance(&instance)
            .await
            .map_err(db("update_instance"))?;

        info!(screen_key = %instance.screen_key, "screen instance updated");
        Ok(instance)
    }

    pub async fn delete_instance(&self, id: ScreenInstanceId) -> ServiceResult<()> {
        if !self.instances.delete_instance(id).await.map_err(db("delete_instance"))? {
            return Err(ServiceError::NotFound("screen instance"));
        }
        info!(screen_instance_id = %id, "screen instance deleted");
        Ok(())
    }

    // ── resolution ──────────────────────────────────────────────────────────

    pub async fn resolve_screen_by_key(&self, screen_key: &str) -> ServiceResult<ResolvedScreen> {
        let instance = self.get_instance_by_key(screen_key).await?;
        self.resolve_instance(instance).await
    }

    pub async fn screen_version(&self, screen_key: &str) -> ServiceResult<ScreenVersion> {
        let instance = self.get_instance_by_key(screen_key).await?;
        let template = self.template_of(&instance).await?;
        Ok(ScreenVersion {
            version: template.version,
            updated_at: instance.updated_at,
        })
    }

    /// Combine an already loaded instance with its template.
    pub async fn resolve_instance(&self, instance: ScreenInstance) -> ServiceResult<ResolvedScreen> {
        let template = self.template_of(&instance).await?;
        Ok(ResolvedScreen {
            screen_id: instance.id,
            screen_key: instance.screen_key,
            screen_name: instance.name,
            pattern: template.pattern,
            version: template.version,
            template: template.definition,
            slot_data: instance.slot_data,
            handler_key: instance.handler_key,
            updated_at: instance.updated_at,
        })
    }

    /// First `limit` instances in key order; used to fill the screens bucket.
    pub(crate) async fn instances_for_sync(&self, limit: u32) -> Result<Vec<ScreenInstance>, StoreError> {
        let (items, _) = self
            .instances
            .list_instances(&InstanceFilter::default(), Page::first(limit))
            .await?;
        Ok(items)
    }

    // ── resource links ──────────────────────────────────────────────────────

    pub async fn link_screen_to_resource(&self, req: LinkScreen) -> ServiceResult<ScreenBinding> {
        require("screen_key", &req.screen_key)?;
        require("screen_type", &req.screen_type)?;
        let resource = self
            .resources
            .find_resource(req.resource_id)
            .await
            .map_err(db("find_resource"))?
            .ok_or(ServiceError::NotFound("resource"))?;

        let binding = ScreenBinding {
            id: ScreenBindingId::new(),
            resource_id: resource.id,
            resource_key: resource.key,
            screen_key: req.screen_key,
            screen_type: req.screen_type,
            is_default: req.is_default,
            is_active: true,
        };
        self.bindings
            .insert_binding(binding.clone())
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => ServiceError::AlreadyExists("screen link"),
                other => db("insert_binding")(other),
            })?;

        info!(
            resource_key = %binding.resource_key,
            screen_key = %binding.screen_key,
            "screen linked"
        );
        Ok(binding)
    }

    pub async fn screens_for_resource(&self, resource_id: ResourceId) -> ServiceResult<Vec<ScreenBinding>> {
        self.bindings
            .list_bindings_for_resource(resource_id)
            .await
            .map_err(db("list_bindings_for_resource"))
    }

    pub async fn unlink_screen(&self, id: ScreenBindingId) -> ServiceResult<()> {
        if !self.bindings.delete_binding(id).await.map_err(db("delete_binding"))? {
            return Err(ServiceError::NotFound("screen link"));
        }
        info!(binding_id = %id, "screen unlinked");
        Ok(())
    }

    async fn ensure_template(&self, id: ScreenTemplateId) -> ServiceResult<()> {
        let exists = self
            .templates
            .find_template(id)
            .await
            .map_err(db("find_template"))?
            .is_some();
        if !exists {
            return Err(ServiceError::validation("template not found"));
        }
        Ok(())
    }

    async fn template_of(&self, instance: &ScreenInstance) -> ServiceResult<ScreenTemplate> {
        self.templates
            .find_template(instance.template_id)
            .await
            .map_err(db("find_template"))?
            .ok_or(ServiceError::NotFound("screen template"))
    }
}
