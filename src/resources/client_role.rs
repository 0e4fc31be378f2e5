use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::ProviderError;
use crate::keycloak::KeycloakAdmin;
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

use super::{
    find_client, gone, ignore_not_found, role_attributes, role_from_data, role_to_data,
    split_import_id, written, Context, Resource,
};

/// `embracecloud_client_role`: a role defined on a client.
///
/// Configuration names the client by its public client id. Every call resolves
/// it to keycloak's internal id first.
pub struct ClientRole;

const TYPE_NAME: &str = "embracecloud_client_role";

struct Target {
    realm: String,
    client_id: String,
    client_uuid: String,
}

impl Target {
    async fn resolve(admin: &dyn KeycloakAdmin, data: &ResourceData) -> Result<Self, ProviderError> {
        let realm = data.get_str("realm_id")?.to_string();
        let client_id = data.get_str("client_id")?.to_string();
        let client_uuid = find_client(admin, &realm, &client_id).await?;
        Ok(Self {
            realm,
            client_id,
            client_uuid,
        })
    }
}

#[async_trait]
impl Resource for ClientRole {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        role_attributes(
            Schema::v0()
                .with_description("A keycloak client role")
                .with_attribute(
                    "realm_id",
                    Attribute::required_string()
                        .with_force_new()
                        .with_description("Realm of the client"),
                )
                .with_attribute(
                    "client_id",
                    Attribute::required_string()
                        .with_force_new()
                        .with_description("Public client id of the client owning the role"),
                ),
        )
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn create(
        &self,
        admin: &dyn KeycloakAdmin,
        mut planned: ResourceData,
    ) -> Result<ResourceData, ProviderError> {
        let target = Target::resolve(admin, &planned).await?;
        let role = role_from_data(&planned)?;
        let name = role.name_or_default().to_string();

        let id = admin
            .create_client_role(&target.realm, &target.client_uuid, &role)
            .await
            .with_context(|| {
                format!(
                    "failed to create client role {} in client {} in realm {}",
                    name, target.client_id, target.realm
                )
            })?;
        info!(realm = %target.realm, client = %target.client_id, role = %name, "Created client role");

        planned.set_id(id);
        written(TYPE_NAME, self.read(admin, planned).await?)
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn read(
        &self,
        admin: &dyn KeycloakAdmin,
        mut current: ResourceData,
    ) -> Result<Option<ResourceData>, ProviderError> {
        let Some(target) = gone(Target::resolve(admin, &current).await)? else {
            return Ok(None);
        };
        let id = current.require_id(TYPE_NAME)?.to_string();

        let role = admin
            .get_client_role(&target.realm, &target.client_uuid, &id)
            .await
            .with_context(|| {
                format!(
                    "Could not find client role in client {} with name {} in realm {}",
                    target.client_id, id, target.realm
                )
            });
        let Some(role) = gone(role)? else {
            return Ok(None);
        };

        role_to_data(&mut current, &role);
        Ok(Some(current))
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn update(
        &self,
        admin: &dyn KeycloakAdmin,
        prior: ResourceData,
        mut planned: ResourceData,
    ) -> Result<ResourceData, ProviderError> {
        let target = Target::resolve(admin, &planned).await?;
        let id = prior.require_id(TYPE_NAME)?.to_string();
        let role = role_from_data(&planned)?;

        admin
            .update_client_role(&target.realm, &target.client_uuid, &id, &role)
            .await
            .with_context(|| {
                format!(
                    "failed to update client role {} for client {} in realm {}",
                    id, target.client_id, target.realm
                )
            })?;
        info!(realm = %target.realm, client = %target.client_id, role = %id, "Updated client role");

        planned.set_id(id);
        written(TYPE_NAME, self.read(admin, planned).await?)
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn delete(
        &self,
        admin: &dyn KeycloakAdmin,
        current: ResourceData,
    ) -> Result<(), ProviderError> {
        let Some(target) = gone(Target::resolve(admin, &current).await)? else {
            return Ok(());
        };
        let id = current.require_id(TYPE_NAME)?;

        ignore_not_found(
            admin
                .delete_client_role(&target.realm, &target.client_uuid, id)
                .await
                .with_context(|| {
                    format!(
                        "failed to delete client role {} for client {} in realm {}",
                        id, target.client_id, target.realm
                    )
                }),
        )?;
        info!(realm = %target.realm, client = %target.client_id, role = %id, "Deleted client role");
        Ok(())
    }

    #[instrument(skip(self, admin))]
    async fn import(&self, admin: &dyn KeycloakAdmin, id: &str) -> Result<ResourceData, ProviderError> {
        let parts = split_import_id(id, 3, 3, "{realm}/{client_id}/{role_name}")?;
        let (realm, client_id, name) = (parts[0], parts[1], parts[2]);

        let mut data = ResourceData::new();
        data.set("realm_id", realm);
        data.set("client_id", client_id);
        data.set_id(name);

        self.read(admin, data).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "client role {} not found in client {} in realm {}",
                name, client_id, realm
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockKeycloak;
    use serde_json::json;
    use tokio_test::assert_err;

    fn planned(value: serde_json::Value) -> ResourceData {
        ResourceData::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let keycloak = MockKeycloak::new();
        let uuid = keycloak.add_client("acme", "billing");

        let state = ClientRole
            .create(
                &keycloak,
                planned(json!({
                    "realm_id": "acme",
                    "client_id": "billing",
                    "name": "invoice-reader",
                    "attributes": {"tier": "gold"}
                })),
            )
            .await
            .unwrap();
        assert_eq!(state.id(), Some("invoice-reader"));
        assert_eq!(state.get("attributes").unwrap()["tier"], "gold");

        let state = ClientRole
            .update(
                &keycloak,
                state,
                planned(json!({
                    "realm_id": "acme",
                    "client_id": "billing",
                    "name": "invoice-reader",
                    "description": "Reads invoices",
                    "attributes": {"tier": "gold##silver"}
                })),
            )
            .await
            .unwrap();
        assert_eq!(state.get_opt_str("description"), Some("Reads invoices"));

        let remote = keycloak.client_role("acme", &uuid, "invoice-reader").unwrap();
        assert_eq!(remote.attributes.unwrap()["tier"], vec!["gold", "silver"]);
    }

    #[tokio::test]
    async fn test_create_unknown_client() {
        let keycloak = MockKeycloak::new();
        let err = ClientRole
            .create(
                &keycloak,
                planned(json!({"realm_id": "acme", "client_id": "billing", "name": "r"})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Client billing not found in realm acme");
    }

    #[tokio::test]
    async fn test_read_gone_when_client_or_role_missing() {
        let keycloak = MockKeycloak::new();
        let state = planned(json!({
            "realm_id": "acme",
            "client_id": "billing",
            "name": "invoice-reader",
            "id": "invoice-reader"
        }));
        assert!(ClientRole.read(&keycloak, state.clone()).await.unwrap().is_none());

        keycloak.add_client("acme", "billing");
        assert!(ClientRole.read(&keycloak, state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let keycloak = MockKeycloak::new();
        let uuid = keycloak.add_client("acme", "billing");
        keycloak.add_client_role("acme", &uuid, "invoice-reader");

        let state = ClientRole
            .import(&keycloak, "acme/billing/invoice-reader")
            .await
            .unwrap();
        ClientRole.delete(&keycloak, state).await.unwrap();
        assert!(keycloak.client_role("acme", &uuid, "invoice-reader").is_none());
    }

    #[tokio::test]
    async fn test_import_errors() {
        let keycloak = MockKeycloak::new();
        keycloak.add_client("acme", "billing");

        let err = assert_err!(ClientRole.import(&keycloak, "acme/billing").await);
        assert!(matches!(err, ProviderError::InvalidRequest(_)));

        let err = assert_err!(ClientRole.import(&keycloak, "acme/billing/missing").await);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_server_error_is_not_gone() {
        let keycloak = MockKeycloak::new();
        let uuid = keycloak.add_client("acme", "billing");
        keycloak.add_client_role("acme", &uuid, "invoice-reader");
        keycloak.fail_on("get_client_role", 503);

        let state = planned(json!({
            "realm_id": "acme",
            "client_id": "billing",
            "name": "invoice-reader",
            "id": "invoice-reader"
        }));
        let err = ClientRole.read(&keycloak, state).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
