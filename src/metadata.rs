use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MofkaError, Result};

/// Immutable JSON document carried with every event.
///
/// Metadata wraps a `serde_json::Value` rather than exposing one
/// directly so that construction always goes through validation of the
/// underlying document shape (it must be a JSON object, matching the
/// reference implementation's `Metadata` which is backed by a
/// `rapidjson::Document`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Value);

impl Metadata {
    /// Build a Metadata from an already-parsed JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse Metadata from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Ok(Self(value))
    }

    /// An empty `{}` metadata document.
    pub fn empty() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }

    /// Borrow the underlying JSON value.
    pub fn json(&self) -> &Value {
        &self.0
    }

    /// Look up a top-level field by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Serialize to a compact JSON string, as it would appear on the
    /// wire before a Serializer plug-in gets a chance to transform it
    /// further.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&self.0).map_err(MofkaError::from)
    }
}

impl From<Value> for Metadata {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::empty()
    }
}
