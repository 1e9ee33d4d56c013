//! Bucket names, bundle shapes and delta results.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use iamsync_auth::UserContext;

use crate::error::ServiceError;
use crate::menu::MenuNode;
use crate::screens::ResolvedScreen;

/// Prefix of per-screen hash keys (`screen:<screen key>`).
pub const SCREEN_KEY_PREFIX: &str = "screen:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Menu,
    Permissions,
    AvailableContexts,
    Screens,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Menu,
        Bucket::Permissions,
        Bucket::AvailableContexts,
        Bucket::Screens,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Menu => "menu",
            Bucket::Permissions => "permissions",
            Bucket::AvailableContexts => "available_contexts",
            Bucket::Screens => "screens",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bucket::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| ServiceError::validation(format!("unknown sync bucket: {s}")))
    }
}

/// Requested buckets; an empty request selects all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSelection(BTreeSet<Bucket>);

impl BucketSelection {
    pub fn all() -> Self {
        Self(Bucket::ALL.into_iter().collect())
    }

    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, ServiceError> {
        if names.is_empty() {
            return Ok(Self::all());
        }
        let buckets = names
            .iter()
            .map(|n| n.as_ref().trim().parse())
            .collect::<Result<BTreeSet<Bucket>, _>>()?;
        Ok(Self(buckets))
    }

    pub fn contains(&self, bucket: Bucket) -> bool {
        self.0.contains(&bucket)
    }

    pub fn iter(&self) -> impl Iterator<Item = Bucket> + '_ {
        self.0.iter().copied()
    }
}

impl Default for BucketSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// One resolved screen as shipped in the screens bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenBundle {
    pub screen_key: String,
    pub screen_name: String,
    pub pattern: String,
    pub version: u32,
    pub template: Value,
    pub slot_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_key: Option<String>,
}

impl From<ResolvedScreen> for ScreenBundle {
    fn from(screen: ResolvedScreen) -> Self {
        Self {
            screen_key: screen.screen_key,
            screen_name: screen.screen_name,
            pattern: screen.pattern,
            version: screen.version,
            template: screen.template,
            slot_data: screen.slot_data,
            handler_key: screen.handler_key,
        }
    }
}

/// Requested buckets plus one hash per delivered bucket.
///
/// Hash keys are `menu`, `permissions`, `available_contexts` and one
/// `screen:<key>` per delivered screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu: Option<Vec<MenuNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_contexts: Option<Vec<UserContext>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screens: Option<BTreeMap<String, ScreenBundle>>,
    pub hashes: BTreeMap<String, String>,
}

impl SyncBundle {
    /// JSON payload behind a hash key, if that bucket was delivered.
    pub fn payload(&self, hash_key: &str) -> Result<Option<Value>, serde_json::Error> {
        let value = match hash_key {
            "menu" => self.menu.as_ref().map(serde_json::to_value),
            "permissions" => self.permissions.as_ref().map(serde_json::to_value),
            "available_contexts" => self.available_contexts.as_ref().map(serde_json::to_value),
            key => key
                .strip_prefix(SCREEN_KEY_PREFIX)
                .and_then(|screen_key| self.screens.as_ref()?.get(screen_key))
                .map(serde_json::to_value),
        };
        value.transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketData {
    pub data: Value,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaSync {
    pub changed: BTreeMap<String, BucketData>,
    /// Hash keys whose client hash matched, sorted.
    pub unchanged: Vec<String>,
}
