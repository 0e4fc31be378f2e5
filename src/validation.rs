//! Schema validation helpers.
//!
//! Checks a configuration document against a [`Schema`] before the provider
//! acts on it, producing one diagnostic per problem.
//!
//! # Example
//!
//! ```
//! use embracecloud_provider::schema::{Attribute, Schema};
//! use embracecloud_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("realm_id", Attribute::required_string())
//!     .with_attribute("description", Attribute::optional_string());
//!
//! let diagnostics = validate(&schema, &json!({"realm_id": "acme"}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"realm_id": 7}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("realm_id".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, DiagnosticSeverity, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (provider sets these)
/// - Attribute types must match the schema, recursively for lists and maps
/// - Attributes the schema does not declare are rejected
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => {
            for (name, attr) in &schema.attributes {
                validate_attribute(attr, None, name, &mut diagnostics);
            }
            return diagnostics;
        },
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }

    for name in obj.keys() {
        if !schema.attributes.contains_key(name) {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", name))
                    .with_detail("This attribute is not declared in the schema")
                    .with_attribute(name),
            );
        }
    }

    diagnostics
}

/// Like [`validate`], returning `Err` with the diagnostics when invalid.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => match value.as_array() {
            Some(arr) => {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(obj) => {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() => true,
        Value::Number(n) => n
            .as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!("Expected {}, got {}", expected, value_type_name(got))),
        attribute: Some(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeFlags;
    use serde_json::json;

    fn role_schema() -> Schema {
        Schema::v0()
            .with_attribute("realm_id", Attribute::required_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("attributes", Attribute::optional_string_map())
            .with_attribute("id", Attribute::computed_string())
    }

    #[test]
    fn test_validate_valid_config() {
        let config = json!({
            "realm_id": "acme",
            "name": "reader",
            "attributes": {"scope": "a##b"}
        });
        assert!(validate(&role_schema(), &config).is_empty());
    }

    #[test]
    fn test_validate_missing_required() {
        let diagnostics = validate(&role_schema(), &json!({"realm_id": "acme"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("name"));
        assert!(diagnostics[0].summary.contains("Missing required"));
    }

    #[test]
    fn test_validate_null_required() {
        let diagnostics = validate(&role_schema(), &json!({"realm_id": null, "name": "r"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("realm_id"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let config = json!({"realm_id": "acme", "name": "reader", "id": 5});
        assert!(validate(&role_schema(), &config).is_empty());
    }

    #[test]
    fn test_validate_unknown_attribute() {
        let config = json!({"realm_id": "acme", "name": "reader", "colour": "red"});
        let diagnostics = validate(&role_schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("colour"));
        assert!(diagnostics[0].summary.contains("Unsupported"));
    }

    #[test]
    fn test_validate_map_values() {
        let config = json!({
            "realm_id": "acme",
            "name": "reader",
            "attributes": {"scope": 1}
        });
        let diagnostics = validate(&role_schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("attributes.scope"));

        let config = json!({"realm_id": "acme", "name": "reader", "attributes": "scope"});
        let diagnostics = validate(&role_schema(), &config);
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("Expected map, got string")
        );
    }

    #[test]
    fn test_validate_bool_and_int() {
        let schema = Schema::v0()
            .with_attribute("enabled", Attribute::required_bool())
            .with_attribute(
                "port",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional()),
            );

        assert!(is_valid(&schema, &json!({"enabled": true, "port": 8080})));
        assert!(is_valid(&schema, &json!({"enabled": false, "port": 8080.0})));
        assert!(!is_valid(&schema, &json!({"enabled": "true"})));
        assert!(!is_valid(&schema, &json!({"enabled": true, "port": 1.5})));
    }

    #[test]
    fn test_validate_list() {
        let schema = Schema::v0().with_attribute(
            "names",
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::required(),
            ),
        );

        assert!(is_valid(&schema, &json!({"names": ["a", "b"]})));
        let diagnostics = validate(&schema, &json!({"names": ["a", 2]}));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("names.1"));
    }

    #[test]
    fn test_validate_null_document() {
        let diagnostics = validate(&role_schema(), &Value::Null);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_validate_root_not_object() {
        let diagnostics = validate(&role_schema(), &json!(["realm"]));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
        assert!(diagnostics[0].attribute.is_none());
    }

    #[test]
    fn test_validate_result_helper() {
        assert!(validate_result(&role_schema(), &json!({"realm_id": "a", "name": "b"})).is_ok());
        let err = validate_result(&role_schema(), &json!({})).unwrap_err();
        assert_eq!(err.len(), 2);
    }
}
