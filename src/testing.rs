//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a `ProviderService` without a gRPC server, and
//! [`MockKeycloak`] is an in-memory [`KeycloakAdmin`] to run it against.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use embracecloud_provider::testing::{MockKeycloak, ProviderTester};
//! use embracecloud_provider::EmbraceCloudProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_role() {
//!     let keycloak = Arc::new(MockKeycloak::new());
//!     let tester = ProviderTester::new(EmbraceCloudProvider::with_admin(keycloak.clone()));
//!
//!     let state = tester
//!         .lifecycle_create("embracecloud_realm_role", json!({"realm_id": "acme", "name": "reader"}))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(state["id"], "reader");
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::keycloak::{
    ClientRepresentation, KeycloakAdmin, KeycloakError, RoleRepresentation, UserRepresentation,
};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
///
/// Wraps a `ProviderService` and exposes its operations with plain JSON
/// values, plus lifecycle helpers that chain plan, apply and read.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    ///
    /// Returns `Err` with the error diagnostics if there are any.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    ///
    /// Returns `Err` with the error diagnostics if there are any.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource. Null means it is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates the resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates in place.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan changes the attribute at `path`.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error whose summary contains `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

// =========================================================================
// In-memory Keycloak
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Container {
    Realm,
    Client(String),
}

#[derive(Debug, Clone)]
struct StoredRole {
    realm: String,
    container: Container,
    role: RoleRepresentation,
    composites: Vec<String>,
}

#[derive(Debug, Default)]
struct MockState {
    clients: Vec<(String, ClientRepresentation)>,
    roles: Vec<StoredRole>,
    users: Vec<(String, UserRepresentation)>,
    service_accounts: BTreeMap<(String, String), String>,
    failures: BTreeMap<String, u16>,
    calls: Vec<String>,
    next_id: u64,
}

impl MockState {
    fn new_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", kind, self.next_id)
    }

    fn has_client(&self, realm: &str, uuid: &str) -> bool {
        self.clients
            .iter()
            .any(|(r, c)| r == realm && c.id.as_deref() == Some(uuid))
    }

    fn role_index(&self, realm: &str, container: &Container, name: &str) -> Option<usize> {
        self.roles.iter().position(|stored| {
            stored.realm == realm
                && &stored.container == container
                && stored.role.name.as_deref() == Some(name)
        })
    }

    fn role_index_by_id(&self, realm: &str, id: &str) -> Option<usize> {
        self.roles
            .iter()
            .position(|stored| stored.realm == realm && stored.role.id.as_deref() == Some(id))
    }

    fn view(&self, index: usize) -> RoleRepresentation {
        let stored = &self.roles[index];
        RoleRepresentation {
            composite: Some(!stored.composites.is_empty()),
            ..stored.role.clone()
        }
    }

    fn insert_role(
        &mut self,
        realm: &str,
        container: Container,
        role: &RoleRepresentation,
    ) -> Result<String, KeycloakError> {
        let Some(name) = role.name.clone() else {
            return Err(http(400, "role name is required"));
        };
        if self.role_index(realm, &container, &name).is_some() {
            return Err(http(409, &format!("Role with name {} already exists", name)));
        }
        let id = self.new_id("role");
        let (client_role, container_id) = match &container {
            Container::Realm => (false, realm.to_string()),
            Container::Client(uuid) => (true, uuid.clone()),
        };
        self.roles.push(StoredRole {
            realm: realm.to_string(),
            container,
            role: RoleRepresentation {
                id: Some(id),
                name: Some(name.clone()),
                description: role.description.clone(),
                composite: Some(false),
                client_role: Some(client_role),
                container_id: Some(container_id),
                attributes: Some(role.attributes.clone().unwrap_or_default()),
            },
            composites: Vec::new(),
        });
        Ok(name)
    }

    fn replace_role(
        &mut self,
        realm: &str,
        container: Container,
        name: &str,
        role: &RoleRepresentation,
    ) -> Result<(), KeycloakError> {
        let index = self
            .role_index(realm, &container, name)
            .ok_or_else(|| http(404, "Could not find role"))?;
        let stored = &mut self.roles[index].role;
        stored.description = role.description.clone();
        stored.attributes = Some(role.attributes.clone().unwrap_or_default());
        Ok(())
    }

    fn remove_role(&mut self, index: usize) {
        let removed = self.roles.remove(index);
        if let Some(id) = removed.role.id {
            for stored in &mut self.roles {
                stored.composites.retain(|c| c != &id);
            }
        }
    }

    fn resolve_roles(
        &self,
        realm: &str,
        roles: &[RoleRepresentation],
    ) -> Result<Vec<String>, KeycloakError> {
        roles
            .iter()
            .map(|role| {
                let index = match (&role.id, &role.name) {
                    (Some(id), _) => self.role_index_by_id(realm, id),
                    (None, Some(name)) => self.role_index(realm, &Container::Realm, name),
                    (None, None) => None,
                };
                index
                    .and_then(|i| self.roles[i].role.id.clone())
                    .ok_or_else(|| http(404, "Could not find composite role"))
            })
            .collect()
    }

    fn add_composites(
        &mut self,
        realm: &str,
        parent: Option<usize>,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        let parent = parent.ok_or_else(|| http(404, "Could not find role"))?;
        for id in self.resolve_roles(realm, roles)? {
            if !self.roles[parent].composites.contains(&id) {
                self.roles[parent].composites.push(id);
            }
        }
        Ok(())
    }

    fn remove_composites(
        &mut self,
        realm: &str,
        parent: Option<usize>,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        let parent = parent.ok_or_else(|| http(404, "Could not find role"))?;
        let ids = self.resolve_roles(realm, roles)?;
        self.roles[parent].composites.retain(|c| !ids.contains(c));
        Ok(())
    }

    fn composite_names(&self, realm: &str, parent: Option<usize>) -> Vec<String> {
        let Some(parent) = parent else {
            return Vec::new();
        };
        self.roles[parent]
            .composites
            .iter()
            .filter_map(|id| self.role_index_by_id(realm, id))
            .filter_map(|i| self.roles[i].role.name.clone())
            .collect()
    }

    fn user_index(&self, realm: &str, id: &str) -> Option<usize> {
        self.users
            .iter()
            .position(|(r, u)| r == realm && u.id.as_deref() == Some(id))
    }
}

fn http(status: u16, message: &str) -> KeycloakError {
    KeycloakError::HttpFailure {
        status,
        body: serde_json::json!({ "error": message }).to_string(),
    }
}

/// An in-memory [`KeycloakAdmin`].
///
/// Seed it with clients, roles and service accounts, run resources against
/// it, then inspect what they left behind. Every admin call is recorded by
/// name, and [`MockKeycloak::fail_on`] makes a call fail with a chosen HTTP
/// status.
#[derive(Debug, Default)]
pub struct MockKeycloak {
    state: Mutex<MockState>,
}

impl MockKeycloak {
    /// An empty server.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, op: &str) -> Result<MutexGuard<'_, MockState>, KeycloakError> {
        let mut state = self.lock();
        state.calls.push(op.to_string());
        if let Some(status) = state.failures.get(op).copied() {
            return Err(http(status, &format!("injected failure for {}", op)));
        }
        Ok(state)
    }

    /// Register a client and return its internal id.
    pub fn add_client(&self, realm: &str, client_id: &str) -> String {
        let mut state = self.lock();
        let id = state.new_id("client");
        state.clients.push((
            realm.to_string(),
            ClientRepresentation {
                id: Some(id.clone()),
                client_id: Some(client_id.to_string()),
                name: None,
                enabled: Some(true),
            },
        ));
        id
    }

    /// Create a realm role and return its id.
    pub fn add_realm_role(&self, realm: &str, name: &str) -> String {
        self.seed_role(realm, Container::Realm, name)
    }

    /// Create a client role and return its id.
    pub fn add_client_role(&self, realm: &str, client_uuid: &str, name: &str) -> String {
        self.seed_role(realm, Container::Client(client_uuid.to_string()), name)
    }

    fn seed_role(&self, realm: &str, container: Container, name: &str) -> String {
        let mut state = self.lock();
        let role = RoleRepresentation {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let _ = state.insert_role(realm, container.clone(), &role);
        state
            .role_index(realm, &container, name)
            .and_then(|i| state.roles[i].role.id.clone())
            .unwrap_or_default()
    }

    /// Give a client a service-account user and return the user id.
    pub fn add_service_account(&self, realm: &str, client_uuid: &str, username: &str) -> String {
        let mut state = self.lock();
        let id = state.new_id("user");
        state.users.push((
            realm.to_string(),
            UserRepresentation {
                id: Some(id.clone()),
                username: Some(username.to_string()),
                enabled: Some(true),
                service_account_client_id: Some(client_uuid.to_string()),
                ..Default::default()
            },
        ));
        state
            .service_accounts
            .insert((realm.to_string(), client_uuid.to_string()), id.clone());
        id
    }

    /// Make every later call to `op` fail with `status`.
    pub fn fail_on(&self, op: &str, status: u16) {
        self.lock().failures.insert(op.to_string(), status);
    }

    /// Names of the admin calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// A realm role as keycloak would return it.
    pub fn realm_role(&self, realm: &str, name: &str) -> Option<RoleRepresentation> {
        let state = self.lock();
        state
            .role_index(realm, &Container::Realm, name)
            .map(|i| state.view(i))
    }

    /// A client role as keycloak would return it.
    pub fn client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Option<RoleRepresentation> {
        let state = self.lock();
        state
            .role_index(realm, &Container::Client(client_uuid.to_string()), name)
            .map(|i| state.view(i))
    }

    /// Names of the composites of a realm role.
    pub fn realm_composite_names(&self, realm: &str, role_name: &str) -> Vec<String> {
        let state = self.lock();
        state.composite_names(realm, state.role_index(realm, &Container::Realm, role_name))
    }

    /// Names of the composites of a client role.
    pub fn client_composite_names(
        &self,
        realm: &str,
        client_uuid: &str,
        role_name: &str,
    ) -> Vec<String> {
        let state = self.lock();
        let parent = state.role_index(realm, &Container::Client(client_uuid.to_string()), role_name);
        state.composite_names(realm, parent)
    }

    /// A user by id.
    pub fn user(&self, realm: &str, id: &str) -> Option<UserRepresentation> {
        let state = self.lock();
        state.user_index(realm, id).map(|i| state.users[i].1.clone())
    }
}

#[async_trait]
impl KeycloakAdmin for MockKeycloak {
    async fn get_clients(
        &self,
        realm: &str,
        client_id: &str,
    ) -> Result<Vec<ClientRepresentation>, KeycloakError> {
        let state = self.begin("get_clients")?;
        Ok(state
            .clients
            .iter()
            .filter(|(r, c)| r == realm && c.client_id.as_deref() == Some(client_id))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn get_client(
        &self,
        realm: &str,
        id: &str,
    ) -> Result<ClientRepresentation, KeycloakError> {
        let state = self.begin("get_client")?;
        state
            .clients
            .iter()
            .find(|(r, c)| r == realm && c.id.as_deref() == Some(id))
            .map(|(_, c)| c.clone())
            .ok_or_else(|| http(404, "Could not find client"))
    }

    async fn create_realm_role(
        &self,
        realm: &str,
        role: &RoleRepresentation,
    ) -> Result<String, KeycloakError> {
        self.begin("create_realm_role")?
            .insert_role(realm, Container::Realm, role)
    }

    async fn get_realm_role(
        &self,
        realm: &str,
        name: &str,
    ) -> Result<RoleRepresentation, KeycloakError> {
        let state = self.begin("get_realm_role")?;
        state
            .role_index(realm, &Container::Realm, name)
            .map(|i| state.view(i))
            .ok_or_else(|| http(404, "Could not find role"))
    }

    async fn update_realm_role(
        &self,
        realm: &str,
        name: &str,
        role: &RoleRepresentation,
    ) -> Result<(), KeycloakError> {
        self.begin("update_realm_role")?
            .replace_role(realm, Container::Realm, name, role)
    }

    async fn delete_realm_role(&self, realm: &str, name: &str) -> Result<(), KeycloakError> {
        let mut state = self.begin("delete_realm_role")?;
        let index = state
            .role_index(realm, &Container::Realm, name)
            .ok_or_else(|| http(404, "Could not find role"))?;
        state.remove_role(index);
        Ok(())
    }

    async fn create_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        role: &RoleRepresentation,
    ) -> Result<String, KeycloakError> {
        let mut state = self.begin("create_client_role")?;
        if !state.has_client(realm, client_uuid) {
            return Err(http(404, "Could not find client"));
        }
        state.insert_role(realm, Container::Client(client_uuid.to_string()), role)
    }

    async fn get_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<RoleRepresentation, KeycloakError> {
        let state = self.begin("get_client_role")?;
        state
            .role_index(realm, &Container::Client(client_uuid.to_string()), name)
            .map(|i| state.view(i))
            .ok_or_else(|| http(404, "Could not find role"))
    }

    async fn update_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
        role: &RoleRepresentation,
    ) -> Result<(), KeycloakError> {
        self.begin("update_client_role")?.replace_role(
            realm,
            Container::Client(client_uuid.to_string()),
            name,
            role,
        )
    }

    async fn delete_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<(), KeycloakError> {
        let mut state = self.begin("delete_client_role")?;
        let index = state
            .role_index(realm, &Container::Client(client_uuid.to_string()), name)
            .ok_or_else(|| http(404, "Could not find role"))?;
        state.remove_role(index);
        Ok(())
    }

    async fn add_realm_role_composite(
        &self,
        realm: &str,
        role_name: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        let mut state = self.begin("add_realm_role_composite")?;
        let parent = state.role_index(realm, &Container::Realm, role_name);
        state.add_composites(realm, parent, roles)
    }

    async fn delete_realm_role_composite(
        &self,
        realm: &str,
        role_name: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        let mut state = self.begin("delete_realm_role_composite")?;
        let parent = state.role_index(realm, &Container::Realm, role_name);
        state.remove_composites(realm, parent, roles)
    }

    async fn add_role_composite_by_id(
        &self,
        realm: &str,
        role_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        let mut state = self.begin("add_role_composite_by_id")?;
        let parent = state.role_index_by_id(realm, role_id);
        state.add_composites(realm, parent, roles)
    }

    async fn delete_role_composite_by_id(
        &self,
        realm: &str,
        role_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        let mut state = self.begin("delete_role_composite_by_id")?;
        let parent = state.role_index_by_id(realm, role_id);
        state.remove_composites(realm, parent, roles)
    }

    async fn get_role_composites_by_id(
        &self,
        realm: &str,
        role_id: &str,
    ) -> Result<Vec<RoleRepresentation>, KeycloakError> {
        let state = self.begin("get_role_composites_by_id")?;
        let parent = state
            .role_index_by_id(realm, role_id)
            .ok_or_else(|| http(404, "Could not find role"))?;
        Ok(state.roles[parent]
            .composites
            .iter()
            .filter_map(|id| state.role_index_by_id(realm, id))
            .map(|i| state.view(i))
            .collect())
    }

    async fn get_client_service_account(
        &self,
        realm: &str,
        client_uuid: &str,
    ) -> Result<UserRepresentation, KeycloakError> {
        let state = self.begin("get_client_service_account")?;
        if !state.has_client(realm, client_uuid) {
            return Err(http(404, "Could not find client"));
        }
        state
            .service_accounts
            .get(&(realm.to_string(), client_uuid.to_string()))
            .and_then(|id| state.user_index(realm, id))
            .map(|i| state.users[i].1.clone())
            .ok_or_else(|| http(400, "Service account not enabled for the client"))
    }

    async fn get_user(&self, realm: &str, id: &str) -> Result<UserRepresentation, KeycloakError> {
        let state = self.begin("get_user")?;
        state
            .user_index(realm, id)
            .map(|i| state.users[i].1.clone())
            .ok_or_else(|| http(404, "User not found"))
    }

    async fn update_user(
        &self,
        realm: &str,
        user: &UserRepresentation,
    ) -> Result<(), KeycloakError> {
        let mut state = self.begin("update_user")?;
        let index = user
            .id
            .as_deref()
            .and_then(|id| state.user_index(realm, id))
            .ok_or_else(|| http(404, "User not found"))?;
        state.users[index].1 = user.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributeChange;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_mock_role_crud() {
        let keycloak = MockKeycloak::new();
        let role = RoleRepresentation {
            name: Some("reader".to_string()),
            description: Some("Read access".to_string()),
            ..Default::default()
        };

        let id = assert_ok!(keycloak.create_realm_role("acme", &role).await);
        assert_eq!(id, "reader");
        let err = assert_err!(keycloak.create_realm_role("acme", &role).await);
        assert_eq!(err.status(), Some(409));

        let stored = assert_ok!(keycloak.get_realm_role("acme", "reader").await);
        assert_eq!(stored.client_role, Some(false));
        assert_eq!(stored.container_id.as_deref(), Some("acme"));
        assert!(stored.id.is_some());

        assert_ok!(keycloak.delete_realm_role("acme", "reader").await);
        let err = assert_err!(keycloak.get_realm_role("acme", "reader").await);
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_mock_realms_are_isolated() {
        let keycloak = MockKeycloak::new();
        keycloak.add_realm_role("acme", "reader");
        keycloak.add_client("acme", "billing");

        assert!(keycloak.realm_role("other", "reader").is_none());
        let clients = assert_ok!(keycloak.get_clients("other", "billing").await);
        assert!(clients.is_empty());
    }

    #[tokio::test]
    async fn test_mock_deleting_role_detaches_it() {
        let keycloak = MockKeycloak::new();
        keycloak.add_realm_role("acme", "admin");
        keycloak.add_realm_role("acme", "auditor");
        let auditor = keycloak.realm_role("acme", "auditor").unwrap();

        assert_ok!(
            keycloak
                .add_realm_role_composite("acme", "admin", &[auditor])
                .await
        );
        assert_eq!(keycloak.realm_role("acme", "admin").unwrap().composite, Some(true));

        assert_ok!(keycloak.delete_realm_role("acme", "auditor").await);
        assert!(keycloak.realm_composite_names("acme", "admin").is_empty());
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let keycloak = MockKeycloak::new();
        keycloak.fail_on("get_user", 502);

        let err = assert_err!(keycloak.get_user("acme", "u").await);
        assert_eq!(err.status(), Some(502));
        assert_eq!(keycloak.calls(), vec!["get_user"]);
    }

    #[test]
    fn test_check_diagnostics_ignores_warnings() {
        assert!(check_diagnostics(vec![Diagnostic::warning("deprecated")]).is_ok());

        let err = check_diagnostics(vec![Diagnostic::error("Missing keycloak_url")]).unwrap_err();
        let printed = err.to_string();
        assert!(printed.contains("1 diagnostic(s)"));
        assert!(printed.contains("Missing keycloak_url"));
    }

    #[test]
    fn test_plan_assertions() {
        let plan = PlanResult::with_changes(
            json!({"name": "reader"}),
            vec![AttributeChange::added("name", json!("reader"))],
            false,
        );
        assert_plan_creates(&plan);
        assert_plan_updates_in_place(&plan);
        assert_plan_changes_attribute(&plan, "name");

        let replace = PlanResult::with_changes(json!({}), vec![], true);
        assert_plan_replaces(&replace);
        assert_plan_no_changes(&replace);
    }

    #[test]
    #[should_panic(expected = "Expected an error containing")]
    fn test_assert_error_contains_panics() {
        assert_error_contains(&[Diagnostic::warning("Missing keycloak_url")], "Missing");
    }

    #[test]
    fn test_diagnostic_assertions() {
        assert_no_errors(&[Diagnostic::warning("w")]);
        assert_error_contains(&[Diagnostic::error("Missing keycloak_url")], "keycloak_url");
    }
}
