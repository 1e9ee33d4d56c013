//! Screen templates and instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use iamsync_core::{ScreenInstanceId, ScreenTemplateId};

/// A reusable screen layout keyed by a pattern ("list", "form", ...).
///
/// `version` increases only when `definition` actually changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenTemplate {
    pub id: ScreenTemplateId,
    pub pattern: String,
    pub name: String,
    pub description: Option<String>,
    pub version: u32,
    pub definition: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScreenTemplate {
    pub fn new(
        pattern: impl Into<String>,
        name: impl Into<String>,
        definition: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScreenTemplateId::new(),
            pattern: pattern.into(),
            name: name.into(),
            description: None,
            version: 1,
            definition,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the definition; returns whether the version was bumped.
    pub fn apply_definition(&mut self, definition: Value) -> bool {
        if self.definition == definition {
            return false;
        }
        self.definition = definition;
        self.version = self.version.saturating_add(1);
        true
    }
}

/// A concrete screen: a template plus its slot data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenInstance {
    pub id: ScreenInstanceId,
    pub screen_key: String,
    pub template_id: ScreenTemplateId,
    pub name: String,
    pub description: Option<String>,
    pub slot_data: Value,
    pub scope: String,
    pub required_permission: Option<String>,
    pub handler_key: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
