use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::ProviderError;
use crate::keycloak::KeycloakAdmin;
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

use super::{
    gone, ignore_not_found, role_attributes, role_from_data, role_to_data, split_import_id,
    written, Context, Resource,
};

/// `embracecloud_realm_role`: a role defined on a realm.
///
/// The id is the role name, which is what keycloak returns on create.
pub struct RealmRole;

const TYPE_NAME: &str = "embracecloud_realm_role";

#[async_trait]
impl Resource for RealmRole {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        role_attributes(
            Schema::v0()
                .with_description("A keycloak realm role")
                .with_attribute(
                    "realm_id",
                    Attribute::required_string()
                        .with_force_new()
                        .with_description("Realm the role belongs to"),
                ),
        )
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn create(
        &self,
        admin: &dyn KeycloakAdmin,
        mut planned: ResourceData,
    ) -> Result<ResourceData, ProviderError> {
        let realm = planned.get_str("realm_id")?.to_string();
        let role = role_from_data(&planned)?;
        let name = role.name_or_default().to_string();

        let id = admin
            .create_realm_role(&realm, &role)
            .await
            .with_context(|| format!("could not create realm role {} in realm {}", name, realm))?;
        info!(%realm, role = %name, "Created realm role");

        planned.set_id(id);
        written(TYPE_NAME, self.read(admin, planned).await?)
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn read(
        &self,
        admin: &dyn KeycloakAdmin,
        mut current: ResourceData,
    ) -> Result<Option<ResourceData>, ProviderError> {
        let realm = current.get_str("realm_id")?.to_string();
        let id = current.require_id(TYPE_NAME)?.to_string();

        let role = admin
            .get_realm_role(&realm, &id)
            .await
            .with_context(|| format!("failed to get realm role {} in realm {}", id, realm));
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
        let realm = planned.get_str("realm_id")?.to_string();
        let id = prior.require_id(TYPE_NAME)?.to_string();
        let role = role_from_data(&planned)?;

        admin
            .update_realm_role(&realm, &id, &role)
            .await
            .with_context(|| format!("could not update realm role {} in realm {}", id, realm))?;
        info!(%realm, role = %id, "Updated realm role");

        planned.set_id(id);
        written(TYPE_NAME, self.read(admin, planned).await?)
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn delete(
        &self,
        admin: &dyn KeycloakAdmin,
        current: ResourceData,
    ) -> Result<(), ProviderError> {
        let realm = current.get_str("realm_id")?;
        let id = current.require_id(TYPE_NAME)?;

        ignore_not_found(
            admin
                .delete_realm_role(realm, id)
                .await
                .with_context(|| format!("could not delete realm role {} in realm {}", id, realm)),
        )?;
        info!(%realm, role = %id, "Deleted realm role");
        Ok(())
    }

    #[instrument(skip(self, admin))]
    async fn import(&self, admin: &dyn KeycloakAdmin, id: &str) -> Result<ResourceData, ProviderError> {
        let parts = split_import_id(id, 2, 2, "{realm}/{role_name}")?;
        let (realm, name) = (parts[0], parts[1]);

        let mut data = ResourceData::new();
        data.set("realm_id", realm);
        data.set_id(name);

        self.read(admin, data).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("realm role {} not found in realm {}", name, realm))
        })
    }
}
