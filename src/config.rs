//! Provider configuration.
//!
//! Each attribute may come from the configuration document or, when unset,
//! from its `EMBRACECLOUD_KEYCLOACK_*` environment variable.

use serde_json::{Map, Value};

use crate::keycloak::ClientCredentials;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::validation::validate;

/// Turns keycloak management on.
pub const KEYCLOAK_ENABLED: &str = "keycloack_enabled";
/// Base url of the keycloak server.
pub const KEYCLOAK_URL: &str = "keycloak_url";
/// Client id of the provider's admin client.
pub const KEYCLOAK_CLIENT_ID: &str = "keycloak_client_id";
/// Client secret of the provider's admin client.
pub const KEYCLOAK_CLIENT_SECRET: &str = "keycloak_client_secret";

/// Schema of the provider configuration block.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("Connection to the keycloak server whose roles are managed")
        .with_attribute(
            KEYCLOAK_ENABLED,
            Attribute::required_bool()
                .with_description("Enable keycloak resources")
                .with_env_default("EMBRACECLOUD_KEYCLOACK_ENABLED")
                .with_default(Value::Bool(false)),
        )
        .with_attribute(
            KEYCLOAK_URL,
            Attribute::optional_string()
                .with_description("Keycloak base url, e.g. https://sso.example.com")
                .with_env_default("EMBRACECLOUD_KEYCLOACK_URL"),
        )
        .with_attribute(
            KEYCLOAK_CLIENT_ID,
            Attribute::optional_string()
                .with_description("Client id used for the client-credentials login")
                .with_env_default("EMBRACECLOUD_KEYCLOACK_CLIENT_ID"),
        )
        .with_attribute(
            KEYCLOAK_CLIENT_SECRET,
            Attribute::optional_string()
                .sensitive()
                .with_description("Client secret used for the client-credentials login")
                .with_env_default("EMBRACECLOUD_KEYCLOACK_CLIENT_SECRET"),
        )
}

/// Resolved provider configuration.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Whether keycloak resources are usable.
    pub keycloak_enabled: bool,
    /// Keycloak base url.
    pub keycloak_url: String,
    /// Admin client id.
    pub client_id: String,
    /// Admin client secret.
    pub client_secret: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("keycloak_enabled", &self.keycloak_enabled)
            .field("keycloak_url", &self.keycloak_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve and check a configuration document.
    ///
    /// Environment defaults are applied first, so a document that only relies
    /// on environment variables is valid. When keycloak is enabled the url,
    /// client id and client secret must all be non-empty.
    pub fn from_value(config: &Value) -> Result<Self, Vec<Diagnostic>> {
        let schema = schema();
        let resolved = resolve(&schema, config)?;

        let diagnostics = validate(&schema, &resolved);
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        let text = |key: &str| {
            resolved
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let parsed = Self {
            keycloak_enabled: resolved
                .get(KEYCLOAK_ENABLED)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            keycloak_url: text(KEYCLOAK_URL),
            client_id: text(KEYCLOAK_CLIENT_ID),
            client_secret: text(KEYCLOAK_CLIENT_SECRET),
        };

        let missing = parsed.missing_connection_settings(&schema);
        if missing.is_empty() {
            Ok(parsed)
        } else {
            Err(missing)
        }
    }

    /// Credentials for the admin login.
    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    fn missing_connection_settings(&self, schema: &Schema) -> Vec<Diagnostic> {
        if !self.keycloak_enabled {
            return Vec::new();
        }

        [
            (KEYCLOAK_URL, &self.keycloak_url),
            (KEYCLOAK_CLIENT_ID, &self.client_id),
            (KEYCLOAK_CLIENT_SECRET, &self.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| {
            let env = schema
                .attribute(key)
                .and_then(|attr| attr.env_default.as_deref())
                .unwrap_or_default();
            Diagnostic::error(format!("Missing {}", key))
                .with_detail(format!(
                    "{} must be set when {} is true, in configuration or through {}",
                    key, KEYCLOAK_ENABLED, env
                ))
                .with_attribute(key)
        })
        .collect()
    }
}

/// Serializes tests that read or write the `EMBRACECLOUD_KEYCLOACK_*` variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn resolve(schema: &Schema, config: &Value) -> Result<Value, Vec<Diagnostic>> {
    let mut obj = match config {
        Value::Object(obj) => obj.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(vec![Diagnostic::error("Expected object")
                .with_detail(format!("Provider configuration must be an object, got {}", other))]);
        },
    };
    schema.apply_defaults(&mut obj);
    Ok(Value::Object(obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{MutexGuard, PoisonError};

    const ENV_VARS: [(&str, &str); 4] = [
        ("EMBRACECLOUD_KEYCLOACK_ENABLED", "true"),
        ("EMBRACECLOUD_KEYCLOACK_URL", "https://env.example.com"),
        ("EMBRACECLOUD_KEYCLOACK_CLIENT_ID", "env-client"),
        ("EMBRACECLOUD_KEYCLOACK_CLIENT_SECRET", "env-secret"),
    ];

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[test]
    fn test_schema_shape() {
        let schema = schema();
        assert!(schema.attribute(KEYCLOAK_ENABLED).unwrap().flags.required);
        assert!(schema.attribute(KEYCLOAK_CLIENT_SECRET).unwrap().flags.sensitive);
        assert_eq!(
            schema.attribute(KEYCLOAK_URL).unwrap().env_default.as_deref(),
            Some("EMBRACECLOUD_KEYCLOACK_URL")
        );
    }

    #[test]
    fn test_enabled_config() {
        let config = ProviderConfig::from_value(&json!({
            "keycloack_enabled": true,
            "keycloak_url": "https://sso.example.com",
            "keycloak_client_id": "terraform",
            "keycloak_client_secret": "s3cret"
        }))
        .unwrap();

        assert!(config.keycloak_enabled);
        assert_eq!(config.keycloak_url, "https://sso.example.com");
        assert_eq!(config.credentials().client_id, "terraform");
    }

    #[test]
    fn test_environment_fallback_and_precedence() {
        let _env = env_lock();
        for (var, value) in ENV_VARS {
            std::env::set_var(var, value);
        }
        let from_env = ProviderConfig::from_value(&json!({}));
        let overridden = ProviderConfig::from_value(&json!({
            "keycloak_url": "https://sso.example.com",
            "keycloak_client_id": "terraform"
        }));
        let disabled = ProviderConfig::from_value(&json!({"keycloack_enabled": false}));
        let diagnostics = validate(&schema(), &resolve(&schema(), &json!({})).unwrap());
        for (var, _) in ENV_VARS {
            std::env::remove_var(var);
        }

        let from_env = from_env.unwrap();
        assert!(from_env.keycloak_enabled);
        assert_eq!(from_env.keycloak_url, "https://env.example.com");
        assert_eq!(from_env.client_id, "env-client");
        assert_eq!(from_env.client_secret, "env-secret");

        let overridden = overridden.unwrap();
        assert!(overridden.keycloak_enabled);
        assert_eq!(overridden.keycloak_url, "https://sso.example.com");
        assert_eq!(overridden.client_id, "terraform");
        assert_eq!(overridden.client_secret, "env-secret");

        assert!(!disabled.unwrap().keycloak_enabled);
        assert!(diagnostics.is_empty());

        let unset = ProviderConfig::from_value(&json!({})).unwrap();
        assert!(!unset.keycloak_enabled);
        assert!(unset.client_secret.is_empty());
    }

    #[test]
    fn test_enabled_requires_connection_settings() {
        let _env = env_lock();
        let diagnostics = ProviderConfig::from_value(&json!({
            "keycloack_enabled": true,
            "keycloak_url": "https://sso.example.com",
            "keycloak_client_id": ""
        }))
        .unwrap_err();

        let attrs: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(attrs, vec![KEYCLOAK_CLIENT_ID, KEYCLOAK_CLIENT_SECRET]);
        assert!(diagnostics[1]
            .detail
            .as_deref()
            .unwrap()
            .contains("EMBRACECLOUD_KEYCLOACK_CLIENT_SECRET"));
    }

    #[test]
    fn test_disabled_needs_nothing_else() {
        let _env = env_lock();
        let config = ProviderConfig::from_value(&json!({"keycloack_enabled": false})).unwrap();
        assert!(!config.keycloak_enabled);
        assert!(config.keycloak_url.is_empty());
    }

    #[test]
    fn test_wrong_type() {
        let diagnostics =
            ProviderConfig::from_value(&json!({"keycloack_enabled": "yes"})).unwrap_err();
        assert_eq!(diagnostics[0].attribute.as_deref(), Some(KEYCLOAK_ENABLED));
    }

    #[test]
    fn test_not_an_object() {
        let diagnostics = ProviderConfig::from_value(&json!([1, 2])).unwrap_err();
        assert_eq!(diagnostics[0].summary, "Expected object");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ProviderConfig {
            keycloak_enabled: true,
            client_secret: "s3cret".to_string(),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
