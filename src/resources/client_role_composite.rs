use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::ProviderError;
use crate::keycloak::{KeycloakAdmin, RoleRepresentation};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

use super::composite::{composite_attributes, is_attached, set_composite, CompositeRef};
use super::{
    find_client, gone, ignore_not_found, role_id, split_import_id, written, Context, Resource,
};

/// `embracecloud_client_role_composite`: makes a realm or client role part of
/// a client role.
///
/// Composites are always attached through the parent's role id, whatever kind
/// of role the composite is.
pub struct ClientRoleComposite;

const TYPE_NAME: &str = "embracecloud_client_role_composite";

async fn parent_role(
    admin: &dyn KeycloakAdmin,
    data: &ResourceData,
) -> Result<RoleRepresentation, ProviderError> {
    let realm = data.get_str("realm_id")?;
    let client_id = data.get_str("client_id")?;
    let name = data.get_str("parent_role_name")?;

    let client_uuid = find_client(admin, realm, client_id).await?;
    admin
        .get_client_role(realm, &client_uuid, name)
        .await
        .with_context(|| {
            format!(
                "Could not find client role in client {} with name {} in realm {}",
                client_id, name, realm
            )
        })
}

#[async_trait]
impl Resource for ClientRoleComposite {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        composite_attributes(
            Schema::v0()
                .with_description("A composite (nested) role on a keycloak client role")
                .with_attribute(
                    "realm_id",
                    Attribute::required_string()
                        .with_force_new()
                        .with_description("Realm of both roles"),
                )
                .with_attribute(
                    "client_id",
                    Attribute::required_string()
                        .with_force_new()
                        .with_description("Public client id of the client owning the parent role"),
                ),
        )
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn create(
        &self,
        admin: &dyn KeycloakAdmin,
        mut planned: ResourceData,
    ) -> Result<ResourceData, ProviderError> {
        let composite = CompositeRef::from_data(&planned)?;
        let parent = parent_role(admin, &planned).await?;
        let role = composite.fetch(admin).await?;
        let parent_name = parent.name_or_default().to_string();

        admin
            .add_role_composite_by_id(&composite.realm, role_id(&parent)?, &[role])
            .await
            .with_context(|| {
                format!(
                    "Cannot add composite {} to client role {} in realm {}",
                    composite.role_name, parent_name, composite.realm
                )
            })?;
        info!(realm = %composite.realm, parent = %parent_name, composite = %composite.role_name, "Added client role composite");

        let id = planned.get_str("parent_role_name")?.to_string();
        planned.set_id(id);
        written(TYPE_NAME, self.read(admin, planned).await?)
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn read(
        &self,
        admin: &dyn KeycloakAdmin,
        current: ResourceData,
    ) -> Result<Option<ResourceData>, ProviderError> {
        let composite = CompositeRef::from_data(&current)?;
        let Some(parent) = gone(parent_role(admin, &current).await)? else {
            return Ok(None);
        };
        if !is_attached(admin, &parent, &composite).await? {
            return Ok(None);
        }
        Ok(Some(current))
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn delete(
        &self,
        admin: &dyn KeycloakAdmin,
        current: ResourceData,
    ) -> Result<(), ProviderError> {
        let composite = CompositeRef::from_data(&current)?;
        let Some(parent) = gone(parent_role(admin, &current).await)? else {
            return Ok(());
        };
        let Some(role) = gone(composite.fetch(admin).await)? else {
            return Ok(());
        };
        let parent_name = parent.name_or_default();

        ignore_not_found(
            admin
                .delete_role_composite_by_id(&composite.realm, role_id(&parent)?, &[role])
                .await
                .with_context(|| {
                    format!(
                        "Could not delete composite role {} from client role {} in realm {}",
                        composite.role_name, parent_name, composite.realm
                    )
                }),
        )?;
        info!(realm = %composite.realm, parent = %parent_name, composite = %composite.role_name, "Removed client role composite");
        Ok(())
    }

    #[instrument(skip(self, admin))]
    async fn import(&self, admin: &dyn KeycloakAdmin, id: &str) -> Result<ResourceData, ProviderError> {
        let parts = split_import_id(
            id,
            4,
            5,
            "{realm}/{client_id}/{parent}/{composite} or \
             {realm}/{client_id}/{parent}/{composite_client_id}/{composite}",
        )?;
        let (realm, client_id, parent, role) = (parts[0], parts[1], parts[2], parts[parts.len() - 1]);
        let composite_client_id = (parts.len() == 5).then(|| parts[3]);

        let mut data = ResourceData::new();
        data.set("realm_id", realm);
        data.set("client_id", client_id);
        data.set("parent_role_name", parent);
        set_composite(&mut data, composite_client_id, role);
        data.set_id(parent);

        self.read(admin, data).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "role {} is not a composite of client role {} in client {} in realm {}",
                role, parent, client_id, realm
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

    struct Seed {
        keycloak: MockKeycloak,
        billing: String,
    }

    fn seeded() -> Seed {
        let keycloak = MockKeycloak::new();
        let billing = keycloak.add_client("acme", "billing");
        let reports = keycloak.add_client("acme", "reports");
        keycloak.add_client_role("acme", &billing, "invoice-admin");
        keycloak.add_client_role("acme", &reports, "report-viewer");
        keycloak.add_realm_role("acme", "auditor");
        Seed { keycloak, billing }
    }

    fn planned(value: serde_json::Value) -> ResourceData {
        ResourceData::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_realm_role_composite_attaches_by_id() {
        let Seed { keycloak, billing } = seeded();
        let state = ClientRoleComposite
            .create(
                &keycloak,
                planned(json!({
                    "realm_id": "acme",
                    "client_id": "billing",
                    "parent_role_name": "invoice-admin",
                    "composite_role_name": "auditor"
                })),
            )
            .await
            .unwrap();

        assert_eq!(state.id(), Some("invoice-admin"));
        let calls = keycloak.calls();
        assert!(calls.contains(&"add_role_composite_by_id".to_string()));
        assert!(!calls.contains(&"add_realm_role_composite".to_string()));
        assert_eq!(
            keycloak.client_composite_names("acme", &billing, "invoice-admin"),
            vec!["auditor"]
        );
    }

    #[tokio::test]
    async fn test_client_role_composite_lifecycle() {
        let Seed { keycloak, billing } = seeded();
        let state = ClientRoleComposite
            .create(
                &keycloak,
                planned(json!({
                    "realm_id": "acme",
                    "client_id": "billing",
                    "parent_role_name": "invoice-admin",
                    "composite_client_id": "reports",
                    "composite_role_name": "report-viewer"
                })),
            )
            .await
            .unwrap();
        assert_eq!(
            keycloak.client_composite_names("acme", &billing, "invoice-admin"),
            vec!["report-viewer"]
        );

        ClientRoleComposite.delete(&keycloak, state.clone()).await.unwrap();
        assert!(keycloak
            .client_composite_names("acme", &billing, "invoice-admin")
            .is_empty());
        assert!(ClientRoleComposite.read(&keycloak, state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_missing_composite_client() {
        let Seed { keycloak, .. } = seeded();
        let err = ClientRoleComposite
            .create(
                &keycloak,
                planned(json!({
                    "realm_id": "acme",
                    "client_id": "billing",
                    "parent_role_name": "invoice-admin",
                    "composite_client_id": "payroll",
                    "composite_role_name": "report-viewer"
                })),
            )
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Client payroll not found in realm acme");
    }

    #[tokio::test]
    async fn test_read_gone_when_parent_client_missing() {
        let keycloak = MockKeycloak::new();
        let state = planned(json!({
            "realm_id": "acme",
            "client_id": "billing",
            "parent_role_name": "invoice-admin",
            "composite_role_name": "auditor",
            "id": "invoice-admin"
        }));
        assert!(ClientRoleComposite.read(&keycloak, state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import() {
        let Seed { keycloak, .. } = seeded();
        ClientRoleComposite
            .create(
                &keycloak,
                planned(json!({
                    "realm_id": "acme",
                    "client_id": "billing",
                    "parent_role_name": "invoice-admin",
                    "composite_client_id": "reports",
                    "composite_role_name": "report-viewer"
                })),
            )
            .await
            .unwrap();

        let state = ClientRoleComposite
            .import(&keycloak, "acme/billing/invoice-admin/reports/report-viewer")
            .await
            .unwrap();
        assert_eq!(state.get_opt_str("composite_client_id"), Some("reports"));
        assert_eq!(state.id(), Some("invoice-admin"));

        let err = assert_err!(
            ClientRoleComposite
                .import(&keycloak, "acme/billing/invoice-admin/auditor")
                .await
        );
        assert!(err.is_not_found());
        assert_err!(ClientRoleComposite.import(&keycloak, "acme/billing/invoice-admin").await);
    }
}
