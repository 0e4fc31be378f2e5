//! The embracecloud provider.
//!
//! [`EmbraceCloudProvider`] implements [`ProviderService`]: it owns the
//! resource registry and, once configured, the keycloak admin session every
//! resource callback runs against.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::{self, ProviderConfig, KEYCLOAK_URL};
use crate::error::ProviderError;
use crate::keycloak::{KeycloakAdmin, KeycloakClient};
use crate::resources::{Resource, ResourceRegistry};
use crate::schema::{Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::state::ResourceData;
use crate::types::{ImportedResource, PlanResult};
use crate::validation;

/// Manages keycloak roles, role composites and service-account details.
pub struct EmbraceCloudProvider {
    registry: ResourceRegistry,
    admin: RwLock<Option<Arc<dyn KeycloakAdmin>>>,
}

impl EmbraceCloudProvider {
    /// An unconfigured provider. Resource operations fail until `configure`
    /// enables keycloak.
    pub fn new() -> Self {
        Self {
            registry: ResourceRegistry::new(),
            admin: RwLock::new(None),
        }
    }

    /// A provider that is already connected to `admin`.
    pub fn with_admin(admin: Arc<dyn KeycloakAdmin>) -> Self {
        Self {
            registry: ResourceRegistry::new(),
            admin: RwLock::new(Some(admin)),
        }
    }

    async fn admin(&self) -> Result<Arc<dyn KeycloakAdmin>, ProviderError> {
        self.admin.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration(format!(
                "keycloak is not enabled; set {} and the keycloak connection settings",
                config::KEYCLOAK_ENABLED
            ))
        })
    }

    /// The resource for `resource_type` and the admin session to run it with.
    async fn target(
        &self,
        resource_type: &str,
    ) -> Result<(&dyn Resource, Arc<dyn KeycloakAdmin>), ProviderError> {
        let resource = self.registry.get(resource_type)?;
        Ok((resource, self.admin().await?))
    }

    fn resource_schema(&self, resource_type: &str) -> Result<Schema, ProviderError> {
        Ok(self.registry.get(resource_type)?.schema())
    }
}

impl Default for EmbraceCloudProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderService for EmbraceCloudProvider {
    fn schema(&self) -> ProviderSchema {
        self.registry.schemas().into_iter().fold(
            ProviderSchema::new().with_provider_config(config::schema()),
            |schema, (name, resource)| schema.with_resource(name, resource),
        )
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(ProviderConfig::from_value(&config).err().unwrap_or_default())
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = match ProviderConfig::from_value(&config) {
            Ok(config) => config,
            Err(diagnostics) => return Ok(diagnostics),
        };

        if !config.keycloak_enabled {
            info!("Keycloak is disabled");
            *self.admin.write().await = None;
            return Ok(vec![]);
        }

        let client = match KeycloakClient::new(&config.keycloak_url, config.credentials()) {
            Ok(client) => client,
            Err(e) => {
                return Ok(vec![Diagnostic::error("Invalid keycloak url")
                    .with_detail(e.to_string())
                    .with_attribute(KEYCLOAK_URL)])
            },
        };
        if let Err(e) = client.login().await {
            warn!(url = %config.keycloak_url, error = %e, "Keycloak login failed");
            return Ok(vec![Diagnostic::error("Could not log in to keycloak")
                .with_detail(e.to_string())]);
        }

        info!(url = %config.keycloak_url, client_id = %config.client_id, "Connected to keycloak");
        *self.admin.write().await = Some(Arc::new(client));
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.admin.write().await.take();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.resource_schema(resource_type)?;
        Ok(validation::validate(&schema, &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource_schema(resource_type)?;
        Ok(crate::plan::plan(&schema, prior_state.as_ref(), &proposed_state))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let (resource, admin) = self.target(resource_type).await?;
        let planned = ResourceData::from_value(planned_state)?;
        Ok(resource.create(admin.as_ref(), planned).await?.into_value())
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let (resource, admin) = self.target(resource_type).await?;
        let current = ResourceData::from_value(current_state)?;
        Ok(resource
            .read(admin.as_ref(), current)
            .await?
            .map(ResourceData::into_value)
            .unwrap_or(Value::Null))
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let (resource, admin) = self.target(resource_type).await?;
        let prior = ResourceData::from_value(prior_state)?;
        let planned = ResourceData::from_value(planned_state)?;
        Ok(resource.update(admin.as_ref(), prior, planned).await?.into_value())
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let (resource, admin) = self.target(resource_type).await?;
        let current = ResourceData::from_value(current_state)?;
        resource.delete(admin.as_ref(), current).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let (resource, admin) = self.target(resource_type).await?;
        let state = resource.import(admin.as_ref(), id).await?;
        Ok(vec![ImportedResource::new(resource_type, state.into_value())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        assert_error_contains, assert_no_errors, assert_plan_changes_attribute,
        assert_plan_creates, assert_plan_no_changes, assert_plan_replaces,
        assert_plan_updates_in_place, MockKeycloak, ProviderTester, TestError,
    };
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const REALM_ROLE: &str = "embracecloud_realm_role";

    fn connected() -> (Arc<MockKeycloak>, ProviderTester<EmbraceCloudProvider>) {
        let keycloak = Arc::new(MockKeycloak::new());
        let tester = ProviderTester::new(EmbraceCloudProvider::with_admin(keycloak.clone()));
        (keycloak, tester)
    }

    #[test]
    fn test_schema_lists_every_resource() {
        let tester = ProviderTester::new(EmbraceCloudProvider::new());
        assert_eq!(
            tester.resource_types(),
            vec![
                "embracecloud_client_role",
                "embracecloud_client_role_composite",
                "embracecloud_realm_role",
                "embracecloud_realm_role_composite",
                "embracecloud_service_account_details",
            ]
        );

        let schema = tester.schema();
        let secret = schema.provider.attribute(config::KEYCLOAK_CLIENT_SECRET).unwrap();
        assert!(secret.flags.sensitive);
    }

    #[tokio::test]
    async fn test_validate_provider_config() {
        let _env = config::ENV_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let provider = EmbraceCloudProvider::new();
        let diagnostics = assert_ok!(
            provider
                .validate_provider_config(json!({"keycloack_enabled": true}))
                .await
        );
        assert_error_contains(&diagnostics, "Missing keycloak_url");

        let diagnostics = assert_ok!(
            provider
                .validate_provider_config(json!({"keycloack_enabled": false}))
                .await
        );
        assert_no_errors(&diagnostics);
    }

    #[tokio::test]
    async fn test_disabled_provider_rejects_resource_operations() {
        let tester = ProviderTester::new(EmbraceCloudProvider::new());
        assert_ok!(tester.configure(json!({"keycloack_enabled": false})).await);

        let err = assert_err!(
            tester
                .create(REALM_ROLE, json!({"realm_id": "acme", "name": "reader"}))
                .await
        );
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_configure_reports_login_failure() {
        let tester = ProviderTester::new(EmbraceCloudProvider::new());
        let result = tester
            .configure(json!({
                "keycloack_enabled": true,
                "keycloak_url": "http://127.0.0.1:1",
                "keycloak_client_id": "terraform",
                "keycloak_client_secret": "s3cret"
            }))
            .await;

        match result {
            Err(TestError::Diagnostics(diagnostics)) => {
                assert_error_contains(&diagnostics, "Could not log in to keycloak")
            },
            other => panic!("expected login diagnostics, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_realm_role_lifecycle() {
        let (keycloak, tester) = connected();
        let config = json!({"realm_id": "acme", "name": "reader", "description": "Read access"});

        let plan = assert_ok!(tester.plan_create(REALM_ROLE, config.clone()).await);
        assert_plan_creates(&plan);

        let state = assert_ok!(tester.lifecycle_create(REALM_ROLE, config.clone()).await);
        assert_eq!(state["id"], "reader");
        assert_eq!(state["description"], "Read access");

        let plan = assert_ok!(tester.plan_update(REALM_ROLE, state.clone(), config).await);
        assert_plan_no_changes(&plan);

        let changed = json!({"realm_id": "acme", "name": "reader", "description": "Readers"});
        let plan = assert_ok!(tester.plan_update(REALM_ROLE, state.clone(), changed.clone()).await);
        assert_plan_updates_in_place(&plan);
        assert_plan_changes_attribute(&plan, "description");

        let state = assert_ok!(tester.lifecycle_update(REALM_ROLE, state, changed).await);
        assert_eq!(state["description"], "Readers");
        assert_eq!(
            keycloak.realm_role("acme", "reader").unwrap().description.as_deref(),
            Some("Readers")
        );

        let renamed = json!({"realm_id": "acme", "name": "viewer"});
        let plan = assert_ok!(tester.plan_update(REALM_ROLE, state.clone(), renamed).await);
        assert_plan_replaces(&plan);

        assert_ok!(tester.lifecycle_delete(REALM_ROLE, state.clone()).await);
        assert!(keycloak.realm_role("acme", "reader").is_none());
        assert_eq!(assert_ok!(tester.read(REALM_ROLE, state).await), Value::Null);
    }

    #[tokio::test]
    async fn test_empty_description_and_attributes_plan_no_changes() {
        let (_, tester) = connected();
        let config = json!({
            "realm_id": "acme",
            "name": "reader",
            "description": "",
            "attributes": {}
        });

        let state = assert_ok!(tester.lifecycle_create(REALM_ROLE, config.clone()).await);
        assert!(state["description"].is_null());
        assert!(state["attributes"].is_null());

        let plan = assert_ok!(tester.plan_update(REALM_ROLE, state, config).await);
        assert_plan_no_changes(&plan);
    }

    #[tokio::test]
    async fn test_import_wraps_state() {
        let (keycloak, tester) = connected();
        keycloak.add_realm_role("acme", "reader");

        let imported = assert_ok!(tester.import_resource(REALM_ROLE, "acme/reader").await);
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, REALM_ROLE);
        assert_eq!(imported[0].state["realm_id"], "acme");
        assert_eq!(imported[0].state["id"], "reader");
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let (_, tester) = connected();
        assert_ok!(
            tester
                .validate_resource_config(REALM_ROLE, json!({"realm_id": "acme", "name": "reader"}))
                .await
        );

        let err = assert_err!(
            tester
                .validate_resource_config(REALM_ROLE, json!({"realm_id": "acme", "nmae": "reader"}))
                .await
        );
        match err {
            TestError::Diagnostics(diagnostics) => {
                assert_error_contains(&diagnostics, "Unsupported attribute 'nmae'")
            },
            other => panic!("expected diagnostics, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (_, tester) = connected();
        let err = assert_err!(tester.read("embracecloud_group", json!({})).await);
        assert!(matches!(err, ProviderError::UnknownResource(_)));

        let err = assert_err!(tester.plan_create("embracecloud_group", json!({})).await);
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_stop_drops_admin_session() {
        let (_, tester) = connected();
        assert_ok!(tester.stop().await);

        let err = assert_err!(tester.import_resource(REALM_ROLE, "acme/reader").await);
        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}
