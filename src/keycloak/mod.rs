//! Keycloak admin API access.
//!
//! [`KeycloakAdmin`] is the seam between resource callbacks and the server:
//! [`KeycloakClient`] implements it over HTTP, and
//! [`crate::testing::MockKeycloak`] implements it in memory.

mod client;
mod error;
mod types;

pub use client::{ClientCredentials, KeycloakClient, LOGIN_REALM};
pub use error::KeycloakError;
pub use types::{AccessToken, ClientRepresentation, RoleRepresentation, UserRepresentation};

use async_trait::async_trait;

/// Admin operations the resources need.
///
/// Role ids returned by the create calls are whatever keycloak puts at the end
/// of the `Location` header, which for roles is the role name.
#[async_trait]
pub trait KeycloakAdmin: Send + Sync {
    /// List clients whose public `clientId` equals `client_id`.
    async fn get_clients(
        &self,
        realm: &str,
        client_id: &str,
    ) -> Result<Vec<ClientRepresentation>, KeycloakError>;

    /// Fetch a client by internal id.
    async fn get_client(&self, realm: &str, id: &str)
        -> Result<ClientRepresentation, KeycloakError>;

    /// Create a realm role and return its id.
    async fn create_realm_role(
        &self,
        realm: &str,
        role: &RoleRepresentation,
    ) -> Result<String, KeycloakError>;

    /// Fetch a realm role by name.
    async fn get_realm_role(&self, realm: &str, name: &str)
        -> Result<RoleRepresentation, KeycloakError>;

    /// Replace a realm role's representation.
    async fn update_realm_role(
        &self,
        realm: &str,
        name: &str,
        role: &RoleRepresentation,
    ) -> Result<(), KeycloakError>;

    /// Delete a realm role by name.
    async fn delete_realm_role(&self, realm: &str, name: &str) -> Result<(), KeycloakError>;

    /// Create a role on a client (by internal client id) and return its id.
    async fn create_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        role: &RoleRepresentation,
    ) -> Result<String, KeycloakError>;

    /// Fetch a client role by name.
    async fn get_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<RoleRepresentation, KeycloakError>;

    /// Replace a client role's representation.
    async fn update_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
        role: &RoleRepresentation,
    ) -> Result<(), KeycloakError>;

    /// Delete a client role by name.
    async fn delete_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<(), KeycloakError>;

    /// Add composites to the realm role called `role_name`.
    async fn add_realm_role_composite(
        &self,
        realm: &str,
        role_name: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError>;

    /// Remove composites from the realm role called `role_name`.
    async fn delete_realm_role_composite(
        &self,
        realm: &str,
        role_name: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError>;

    /// Add composites to any role, addressed by role id.
    async fn add_role_composite_by_id(
        &self,
        realm: &str,
        role_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError>;

    /// Remove composites from any role, addressed by role id.
    async fn delete_role_composite_by_id(
        &self,
        realm: &str,
        role_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError>;

    /// List the composites of a role, addressed by role id.
    async fn get_role_composites_by_id(
        &self,
        realm: &str,
        role_id: &str,
    ) -> Result<Vec<RoleRepresentation>, KeycloakError>;

    /// Fetch the service-account user of a client.
    async fn get_client_service_account(
        &self,
        realm: &str,
        client_uuid: &str,
    ) -> Result<UserRepresentation, KeycloakError>;

    /// Fetch a user by id.
    async fn get_user(&self, realm: &str, id: &str) -> Result<UserRepresentation, KeycloakError>;

    /// Replace a user's representation. The user must carry its id.
    async fn update_user(&self, realm: &str, user: &UserRepresentation)
        -> Result<(), KeycloakError>;
}
