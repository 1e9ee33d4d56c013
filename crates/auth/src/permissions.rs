use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission string in `<resource-key>:<action>` form (e.g. "dashboard:read").
///
/// Grouping by resource is purely lexical: the key is everything before the
/// first `:`. Strings without a non-empty key and action are kept as-is but
/// never map onto a resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(resource_key, action)` on the first `:`.
    pub fn split(&self) -> Option<(&str, &str)> {
        let (key, action) = self.0.split_once(':')?;
        if key.is_empty() || action.is_empty() {
            return None;
        }
        Some((key, action))
    }

    pub fn resource_key(&self) -> Option<&str> {
        self.split().map(|(key, _)| key)
    }

    pub fn action(&self) -> Option<&str> {
        self.split().map(|(_, action)| action)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}
