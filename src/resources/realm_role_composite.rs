use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::ProviderError;
use crate::keycloak::{KeycloakAdmin, RoleRepresentation};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

use super::composite::{composite_attributes, is_attached, set_composite, CompositeRef};
use super::{gone, ignore_not_found, role_id, split_import_id, written, Context, Resource};

/// `embracecloud_realm_role_composite`: makes a realm or client role part of a
/// realm role.
///
/// Every attribute forces replacement, so there is no update. The id is the
/// parent role name.
pub struct RealmRoleComposite;

const TYPE_NAME: &str = "embracecloud_realm_role_composite";

async fn parent_role(
    admin: &dyn KeycloakAdmin,
    realm: &str,
    name: &str,
) -> Result<RoleRepresentation, ProviderError> {
    admin
        .get_realm_role(realm, name)
        .await
        .with_context(|| format!("Could not find realm role {} in realm {}", name, realm))
}

#[async_trait]
impl Resource for RealmRoleComposite {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        composite_attributes(
            Schema::v0()
                .with_description("A composite (nested) role on a keycloak realm role")
                .with_attribute(
                    "realm_id",
                    Attribute::required_string()
                        .with_force_new()
                        .with_description("Realm of both roles"),
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
        let realm = composite.realm.as_str();
        let parent_name = planned.get_str("parent_role_name")?.to_string();

        let parent = parent_role(admin, realm, &parent_name).await?;
        let role = composite.fetch_with_client(admin).await?;

        match &composite.client_id {
            Some(client_id) => admin
                .add_role_composite_by_id(realm, role_id(&parent)?, &[role])
                .await
                .with_context(|| {
                    format!(
                        "Cannot add composite client role {} from client {} in realm {}",
                        composite.role_name, client_id, realm
                    )
                })?,
            None => admin
                .add_realm_role_composite(realm, &parent_name, &[role])
                .await
                .with_context(|| {
                    format!(
                        "Cannot add composite {} to realmrole {} in realm {}",
                        composite.role_name, parent_name, realm
                    )
                })?,
        }
        info!(%realm, parent = %parent_name, composite = %composite.role_name, "Added realm role composite");

        planned.set_id(parent_name);
        written(TYPE_NAME, self.read(admin, planned).await?)
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn read(
        &self,
        admin: &dyn KeycloakAdmin,
        current: ResourceData,
    ) -> Result<Option<ResourceData>, ProviderError> {
        let composite = CompositeRef::from_data(&current)?;
        let parent_name = current.get_str("parent_role_name")?;

        let Some(parent) = gone(parent_role(admin, &composite.realm, parent_name).await)? else {
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
        let realm = composite.realm.as_str();
        let parent_name = current.get_str("parent_role_name")?;

        let Some(parent) = gone(parent_role(admin, realm, parent_name).await)? else {
            return Ok(());
        };
        let Some(role) = gone(composite.fetch(admin).await)? else {
            return Ok(());
        };

        let removed = match &composite.client_id {
            Some(client_id) => admin
                .delete_role_composite_by_id(realm, role_id(&parent)?, &[role])
                .await
                .with_context(|| {
                    format!(
                        "Cannot delete composite client role {} from client {} in realm {}",
                        composite.role_name, client_id, realm
                    )
                }),
            None => admin
                .delete_realm_role_composite(realm, parent_name, &[role])
                .await
                .with_context(|| {
                    format!(
                        "Could not delete composite role {} from realmrole {} in realm {}",
                        composite.role_name, parent_name, realm
                    )
                }),
        };
        ignore_not_found(removed)?;
        info!(%realm, parent = %parent_name, composite = %composite.role_name, "Removed realm role composite");
        Ok(())
    }

    #[instrument(skip(self, admin))]
    async fn import(&self, admin: &dyn KeycloakAdmin, id: &str) -> Result<ResourceData, ProviderError> {
        let parts = split_import_id(
            id,
            3,
            4,
            "{realm}/{parent}/{composite} or {realm}/{parent}/{composite_client_id}/{composite}",
        )?;
        let (realm, parent, role) = (parts[0], parts[1], parts[parts.len() - 1]);
        let client_id = (parts.len() == 4).then(|| parts[2]);

        let mut data = ResourceData::new();
        data.set("realm_id", realm);
        data.set("parent_role_name", parent);
        set_composite(&mut data, client_id, role);
        data.set_id(parent);

        self.read(admin, data).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "role {} is not a composite of realm role {} in realm {}",
                role, parent, realm
            ))
        })
    }
}
