//! Pieces shared by the realm and client composite-role resources.

use crate::error::ProviderError;
use crate::keycloak::{KeycloakAdmin, RoleRepresentation};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

use super::{find_client, gone, role_id, Context};

/// The role being attached to a parent role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompositeRef {
    pub realm: String,
    /// Set when the composite is a client role.
    pub client_id: Option<String>,
    pub role_name: String,
}

impl CompositeRef {
    pub fn from_data(data: &ResourceData) -> Result<Self, ProviderError> {
        Ok(Self {
            realm: data.get_str("realm_id")?.to_string(),
            client_id: data.get_opt_str("composite_client_id").map(str::to_string),
            role_name: data.get_str("composite_role_name")?.to_string(),
        })
    }

    /// Fetch the composite role from keycloak.
    pub async fn fetch(&self, admin: &dyn KeycloakAdmin) -> Result<RoleRepresentation, ProviderError> {
        match &self.client_id {
            Some(client_id) => {
                let client_uuid = find_client(admin, &self.realm, client_id).await?;
                self.fetch_client_role(admin, client_id, &client_uuid).await
            },
            None => admin
                .get_realm_role(&self.realm, &self.role_name)
                .await
                .with_context(|| {
                    format!(
                        "Could not find realm role {} in realm {}",
                        self.role_name, self.realm
                    )
                }),
        }
    }

    /// Like [`CompositeRef::fetch`], but a client composite's client is also
    /// loaded by internal id before its role is looked up.
    pub async fn fetch_with_client(
        &self,
        admin: &dyn KeycloakAdmin,
    ) -> Result<RoleRepresentation, ProviderError> {
        let Some(client_id) = &self.client_id else {
            return self.fetch(admin).await;
        };
        let client_uuid = find_client(admin, &self.realm, client_id).await?;
        let client = admin
            .get_client(&self.realm, &client_uuid)
            .await
            .with_context(|| format!("cannot find client {} in realm {}", client_id, self.realm))?;
        let client_uuid = client.id.unwrap_or(client_uuid);
        self.fetch_client_role(admin, client_id, &client_uuid).await
    }

    async fn fetch_client_role(
        &self,
        admin: &dyn KeycloakAdmin,
        client_id: &str,
        client_uuid: &str,
    ) -> Result<RoleRepresentation, ProviderError> {
        admin
            .get_client_role(&self.realm, client_uuid, &self.role_name)
            .await
            .with_context(|| {
                format!(
                    "Could not find client role in client {} with name {} in realm {}",
                    client_id, self.role_name, self.realm
                )
            })
    }
}

/// Schema attributes naming the composite role.
pub(crate) fn composite_attributes(schema: Schema) -> Schema {
    schema
        .with_attribute(
            "parent_role_name",
            Attribute::required_string()
                .with_force_new()
                .with_description("Role that receives the composite"),
        )
        .with_attribute(
            "composite_role_name",
            Attribute::required_string()
                .with_force_new()
                .with_description("Role added to the parent"),
        )
        .with_attribute(
            "composite_client_id",
            Attribute::optional_string()
                .with_force_new()
                .with_description("Client owning the composite role; omit for a realm role"),
        )
        .with_attribute("id", Attribute::computed_string())
}

/// Whether `composite` is still attached to `parent`.
///
/// A missing composite role counts as detached.
pub(crate) async fn is_attached(
    admin: &dyn KeycloakAdmin,
    parent: &RoleRepresentation,
    composite: &CompositeRef,
) -> Result<bool, ProviderError> {
    let Some(role) = gone(composite.fetch(admin).await)? else {
        return Ok(false);
    };
    let wanted = role_id(&role)?;

    let attached = admin
        .get_role_composites_by_id(&composite.realm, role_id(parent)?)
        .await
        .with_context(|| {
            format!(
                "could not list composites of role {} in realm {}",
                parent.name_or_default(),
                composite.realm
            )
        })?;

    Ok(attached.iter().any(|r| r.id.as_deref() == Some(wanted)))
}

/// Fill in the composite attributes of an imported state.
pub(crate) fn set_composite(data: &mut ResourceData, composite_client_id: Option<&str>, role: &str) {
    data.set_opt_str("composite_client_id", composite_client_id);
    data.set("composite_role_name", role);
}
