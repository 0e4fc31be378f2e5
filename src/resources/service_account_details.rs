use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::ProviderError;
use crate::keycloak::{KeycloakAdmin, UserRepresentation};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

use super::{find_client, gone, ignore_not_found, split_import_id, written, Context, Resource};

/// `embracecloud_service_account_details`: the display name of a client's
/// service-account user.
///
/// The user itself belongs to the client, so delete only blanks the names.
/// The id is the user id.
pub struct ServiceAccountDetails;

const TYPE_NAME: &str = "embracecloud_service_account_details";

async fn service_account(
    admin: &dyn KeycloakAdmin,
    realm: &str,
    client_id: &str,
) -> Result<UserRepresentation, ProviderError> {
    let client_uuid = find_client(admin, realm, client_id).await?;
    admin
        .get_client_service_account(realm, &client_uuid)
        .await
        .with_context(|| {
            format!(
                "could not get the service account of client {} in realm {}",
                client_id, realm
            )
        })
}

async fn save_names(
    admin: &dyn KeycloakAdmin,
    realm: &str,
    mut user: UserRepresentation,
    first_name: &str,
    last_name: &str,
) -> Result<UserRepresentation, ProviderError> {
    user.first_name = Some(first_name.to_string());
    user.last_name = Some(last_name.to_string());
    admin
        .update_user(realm, &user)
        .await
        .with_context(|| {
            format!(
                "could not update service account user {} in realm {}",
                user.username.as_deref().unwrap_or_default(),
                realm
            )
        })?;
    Ok(user)
}

fn user_id(user: &UserRepresentation) -> Result<String, ProviderError> {
    user.id
        .clone()
        .ok_or_else(|| ProviderError::Sdk("service account user has no id".to_string()))
}

#[async_trait]
impl Resource for ServiceAccountDetails {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Names shown for a keycloak client's service-account user")
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
                    .with_description("Public client id owning the service account"),
            )
            .with_attribute("first_name", Attribute::required_string().with_force_new())
            .with_attribute("last_name", Attribute::required_string().with_force_new())
            .with_attribute(
                "username",
                Attribute::computed_string().with_description("Service-account login name"),
            )
            .with_attribute("id", Attribute::computed_string())
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn create(
        &self,
        admin: &dyn KeycloakAdmin,
        mut planned: ResourceData,
    ) -> Result<ResourceData, ProviderError> {
        let realm = planned.get_str("realm_id")?.to_string();
        let client_id = planned.get_str("client_id")?.to_string();
        let first_name = planned.get_str("first_name")?.to_string();
        let last_name = planned.get_str("last_name")?.to_string();

        let user = service_account(admin, &realm, &client_id).await?;
        let user = save_names(admin, &realm, user, &first_name, &last_name).await?;
        info!(%realm, client = %client_id, "Set service account names");

        planned.set_opt_str("username", user.username.as_deref());
        planned.set_id(user_id(&user)?);
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

        let user = admin
            .get_user(&realm, &id)
            .await
            .with_context(|| format!("could not get user {} in realm {}", id, realm));
        let Some(user) = gone(user)? else {
            return Ok(None);
        };

        current.set_opt_str("first_name", user.first_name.as_deref());
        current.set_opt_str("last_name", user.last_name.as_deref());
        current.set_opt_str("username", user.username.as_deref());
        Ok(Some(current))
    }

    #[instrument(skip_all, fields(resource = TYPE_NAME))]
    async fn delete(
        &self,
        admin: &dyn KeycloakAdmin,
        current: ResourceData,
    ) -> Result<(), ProviderError> {
        let realm = current.get_str("realm_id")?;
        let id = current.require_id(TYPE_NAME)?;

        let user = admin
            .get_user(realm, id)
            .await
            .with_context(|| format!("could not get user {} in realm {}", id, realm));
        let Some(user) = gone(user)? else {
            return Ok(());
        };

        ignore_not_found(save_names(admin, realm, user, "", "").await.map(|_| ()))?;
        info!(%realm, user = %id, "Cleared service account names");
        Ok(())
    }

    #[instrument(skip(self, admin))]
    async fn import(&self, admin: &dyn KeycloakAdmin, id: &str) -> Result<ResourceData, ProviderError> {
        let parts = split_import_id(id, 2, 2, "{realm}/{client_id}")?;
        let (realm, client_id) = (parts[0], parts[1]);

        let user = service_account(admin, realm, client_id).await?;
        let mut data = ResourceData::new();
        data.set("realm_id", realm);
        data.set("client_id", client_id);
        data.set_id(user_id(&user)?);

        self.read(admin, data).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "service account of client {} not found in realm {}",
                client_id, realm
            ))
        })
    }
}
