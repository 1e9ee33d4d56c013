use serde::{Deserialize, Serialize};

use iamsync_core::{ResourceId, ScreenBindingId};

/// A navigable node in the resource forest.
///
/// `key` is the resource segment of permission strings (`<key>:<action>`).
/// `parent_id` is a lookup back-reference only; the forest is never walked
/// downward through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub key: String,
    pub display_name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub parent_id: Option<ResourceId>,
    pub is_menu_visible: bool,
    pub is_active: bool,
    pub sort_order: i32,
    pub scope: String,
}

impl Resource {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>, sort_order: i32) -> Self {
        Self {
            id: ResourceId::new(),
            key: key.into(),
            display_name: display_name.into(),
            description: None,
            icon: None,
            parent_id: None,
            is_menu_visible: true,
            is_active: true,
            sort_order,
            scope: "system".to_string(),
        }
    }

    pub fn with_parent(mut self, parent: &Resource) -> Self {
        self.parent_id = Some(parent.id);
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Links a resource to a screen key under a screen-type label ("list", "detail", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenBinding {
    pub id: ScreenBindingId,
    pub resource_id: ResourceId,
    pub resource_key: String,
    pub screen_key: String,
    pub screen_type: String,
    pub is_default: bool,
    pub is_active: bool,
}
