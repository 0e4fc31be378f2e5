//! Managed resource types.
//!
//! Each resource declares a [`Schema`] and lifecycle callbacks that act on
//! keycloak through a [`KeycloakAdmin`]. The provider looks resources up by
//! type name in a [`ResourceRegistry`].

mod client_role;
mod client_role_composite;
mod composite;
mod realm_role;
mod realm_role_composite;
mod service_account_details;

pub use client_role::ClientRole;
pub use client_role_composite::ClientRoleComposite;
pub use realm_role::RealmRole;
pub use realm_role_composite::RealmRoleComposite;
pub use service_account_details::ServiceAccountDetails;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ProviderError;
use crate::keycloak::{KeycloakAdmin, RoleRepresentation};
use crate::schema::{Attribute, Schema};
use crate::state::{join_attributes, split_attributes, ResourceData};

/// Lifecycle callbacks for one resource type.
///
/// `read` returns `None` when the remote object no longer exists, so the host
/// can drop it from state.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name used in configuration, e.g. `embracecloud_realm_role`.
    fn type_name(&self) -> &'static str;

    /// Schema of the resource.
    fn schema(&self) -> Schema;

    /// Create the remote object and return the state read back from it.
    async fn create(
        &self,
        admin: &dyn KeycloakAdmin,
        planned: ResourceData,
    ) -> Result<ResourceData, ProviderError>;

    /// Refresh state from keycloak.
    async fn read(
        &self,
        admin: &dyn KeycloakAdmin,
        current: ResourceData,
    ) -> Result<Option<ResourceData>, ProviderError>;

    /// Apply in-place changes. Resources whose attributes all force
    /// replacement keep this default.
    async fn update(
        &self,
        admin: &dyn KeycloakAdmin,
        prior: ResourceData,
        planned: ResourceData,
    ) -> Result<ResourceData, ProviderError> {
        let _ = (admin, prior, planned);
        Err(ProviderError::Unimplemented(format!(
            "{} does not support in-place updates",
            self.type_name()
        )))
    }

    /// Delete the remote object.
    async fn delete(
        &self,
        admin: &dyn KeycloakAdmin,
        current: ResourceData,
    ) -> Result<(), ProviderError>;

    /// Build state for an existing object from its import id.
    async fn import(&self, admin: &dyn KeycloakAdmin, id: &str)
        -> Result<ResourceData, ProviderError>;
}

/// Resources by type name.
pub struct ResourceRegistry {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
}

impl ResourceRegistry {
    /// A registry holding every resource this provider manages.
    pub fn new() -> Self {
        let mut registry = Self {
            resources: BTreeMap::new(),
        };
        registry.register(Arc::new(RealmRole));
        registry.register(Arc::new(RealmRoleComposite));
        registry.register(Arc::new(ClientRole));
        registry.register(Arc::new(ClientRoleComposite));
        registry.register(Arc::new(ServiceAccountDetails));
        registry
    }

    fn register(&mut self, resource: Arc<dyn Resource>) {
        self.resources.insert(resource.type_name(), resource);
    }

    /// Look up a resource by type name.
    pub fn get(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    /// Type names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    /// Schemas by type name.
    pub fn schemas(&self) -> BTreeMap<String, Schema> {
        self.resources
            .iter()
            .map(|(name, resource)| (name.to_string(), resource.schema()))
            .collect()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach a human-readable description of what was being attempted.
pub(crate) trait Context<T> {
    fn with_context<C: Display>(self, context: impl FnOnce() -> C) -> Result<T, ProviderError>;
}

impl<T, E: Into<ProviderError>> Context<T> for Result<T, E> {
    fn with_context<C: Display>(self, context: impl FnOnce() -> C) -> Result<T, ProviderError> {
        self.map_err(|err| err.into().context(context()))
    }
}

/// Map a not-found failure to `None`.
pub(crate) fn gone<T>(result: Result<T, ProviderError>) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => {
            debug!(error = %err, "Remote object is gone");
            Ok(None)
        },
        Err(err) => Err(err),
    }
}

/// Treat deleting an already-missing object as success.
pub(crate) fn ignore_not_found(result: Result<(), ProviderError>) -> Result<(), ProviderError> {
    gone(result).map(|_| ())
}

/// State read back right after a write. The object must exist.
pub(crate) fn written(
    resource_type: &str,
    state: Option<ResourceData>,
) -> Result<ResourceData, ProviderError> {
    state.ok_or_else(|| {
        ProviderError::Sdk(format!(
            "{} was not found right after it was written",
            resource_type
        ))
    })
}

/// Resolve a public client id to keycloak's internal client id.
pub(crate) async fn find_client(
    admin: &dyn KeycloakAdmin,
    realm: &str,
    client_id: &str,
) -> Result<String, ProviderError> {
    let mut clients = admin
        .get_clients(realm, client_id)
        .await
        .with_context(|| format!("cannot find client {} in realm {}", client_id, realm))?;

    match clients.len() {
        0 => Err(ProviderError::NotFound(format!(
            "Client {} not found in realm {}",
            client_id, realm
        ))),
        1 => clients.remove(0).id.ok_or_else(|| {
            ProviderError::Sdk(format!(
                "client {} in realm {} has no id",
                client_id, realm
            ))
        }),
        _ => Err(ProviderError::Sdk("multiple clients found".to_string())),
    }
}

/// Split an import id on `/` into `min..=max` non-empty parts.
pub(crate) fn split_import_id<'a>(
    id: &'a str,
    min: usize,
    max: usize,
    expected: &str,
) -> Result<Vec<&'a str>, ProviderError> {
    let parts: Vec<&str> = id.split('/').collect();
    if parts.len() < min || parts.len() > max || parts.iter().any(|p| p.is_empty()) {
        return Err(ProviderError::InvalidRequest(format!(
            "invalid import id '{}', expected {}",
            id, expected
        )));
    }
    Ok(parts)
}

/// The role id keycloak needs for roles-by-id calls.
pub(crate) fn role_id(role: &RoleRepresentation) -> Result<&str, ProviderError> {
    role.id.as_deref().ok_or_else(|| {
        ProviderError::Sdk(format!("role {} has no id", role.name_or_default()))
    })
}

/// Attributes shared by realm and client roles.
pub(crate) fn role_attributes(schema: Schema) -> Schema {
    schema
        .with_attribute(
            "name",
            Attribute::required_string()
                .with_force_new()
                .with_description("Role name"),
        )
        .with_attribute(
            "description",
            Attribute::optional_string().with_description("Role description"),
        )
        .with_attribute(
            "attributes",
            Attribute::optional_string_map()
                .with_description("Custom attributes; join multiple values with ##"),
        )
        .with_attribute("id", Attribute::computed_string())
}

/// The role representation sent to keycloak for a planned state.
///
/// Description and attributes are always sent so removing them from
/// configuration clears them remotely.
pub(crate) fn role_from_data(data: &ResourceData) -> Result<RoleRepresentation, ProviderError> {
    Ok(RoleRepresentation {
        id: None,
        name: Some(data.get_str("name")?.to_string()),
        description: Some(data.get_opt_str("description").unwrap_or_default().to_string()),
        attributes: Some(split_attributes(&data.get_string_map("attributes"))),
        ..Default::default()
    })
}

/// Copy the keycloak-owned role fields into state.
pub(crate) fn role_to_data(data: &mut ResourceData, role: &RoleRepresentation) {
    data.set("name", role.name_or_default());
    data.set_opt_str("description", role.description.as_deref());
    data.set_string_map(
        "attributes",
        role.attributes
            .as_ref()
            .map(join_attributes)
            .unwrap_or_default(),
    );
}
