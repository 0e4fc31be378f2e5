//! Typed access to resource state documents.
//!
//! State crosses the wire as a JSON object. [`ResourceData`] wraps that object
//! with the getters and setters resource callbacks need, and converts the
//! `attributes` map between its state form (`"a##b"`) and keycloak's
//! multi-valued form (`["a", "b"]`).

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ProviderError;

/// Joins the values of a multi-valued keycloak attribute in state.
pub const MULTIVALUE_ATTRIBUTE_SEPARATOR: &str = "##";

/// Name of the id attribute every resource carries.
pub const ID: &str = "id";

/// A resource state or planned-state document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    values: Map<String, Value>,
}

impl ResourceData {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a document received from the host. Null is treated as empty.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::new()),
            other => Err(ProviderError::InvalidRequest(format!(
                "resource state must be an object, got {}",
                other
            ))),
        }
    }

    /// The document as JSON.
    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }

    /// Raw access to an attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// A required string attribute. Missing, null or empty is an error.
    pub fn get_str(&self, key: &str) -> Result<&str, ProviderError> {
        self.get_opt_str(key).ok_or_else(|| {
            ProviderError::Validation(format!("missing required attribute '{}'", key))
        })
    }

    /// An optional string attribute. Null and empty strings read as `None`.
    pub fn get_opt_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// An optional map of strings. Non-string values are skipped.
    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.values
            .get(key)
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The resource id, if one has been assigned.
    pub fn id(&self) -> Option<&str> {
        self.get_opt_str(ID)
    }

    /// The resource id, or an error naming the resource type.
    pub fn require_id(&self, resource_type: &str) -> Result<&str, ProviderError> {
        self.id().ok_or_else(|| {
            ProviderError::InvalidRequest(format!("{} state has no id", resource_type))
        })
    }

    /// Assign the resource id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.set(ID, id.into());
    }

    /// Set an attribute.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Set a string attribute, storing null for `None` or an empty string.
    pub fn set_opt_str(&mut self, key: impl Into<String>, value: Option<&str>) {
        let value = match value {
            Some(s) if !s.is_empty() => Value::String(s.to_string()),
            _ => Value::Null,
        };
        self.values.insert(key.into(), value);
    }

    /// Set a map of strings, storing null for an empty map.
    pub fn set_string_map(&mut self, key: impl Into<String>, map: BTreeMap<String, String>) {
        let value = if map.is_empty() {
            Value::Null
        } else {
            Value::Object(map.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
        };
        self.values.insert(key.into(), value);
    }
}

/// Expand state attributes into keycloak's multi-valued form.
pub fn split_attributes(attributes: &BTreeMap<String, String>) -> BTreeMap<String, Vec<String>> {
    attributes
        .iter()
        .map(|(key, value)| {
            let values = value
                .split(MULTIVALUE_ATTRIBUTE_SEPARATOR)
                .map(str::to_string)
                .collect();
            (key.clone(), values)
        })
        .collect()
}

/// Collapse keycloak's multi-valued attributes into their state form.
pub fn join_attributes(attributes: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, String> {
    attributes
        .iter()
        .map(|(key, values)| (key.clone(), values.join(MULTIVALUE_ATTRIBUTE_SEPARATOR)))
        .collect()
}
