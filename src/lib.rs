//! EmbraceCloud provider for Hemmer.
//!
//! Manages Keycloak objects as infrastructure-as-code resources:
//!
//! - `embracecloud_realm_role`: realm roles
//! - `embracecloud_realm_role_composite`: composites of a realm role
//! - `embracecloud_client_role`: client roles
//! - `embracecloud_client_role_composite`: composites of a client role
//! - `embracecloud_service_account_details`: names of a client's
//!   service-account user
//!
//! The binary runs [`EmbraceCloudProvider`] behind the gRPC provider protocol
//! with [`serve`]. Resource callbacks talk to keycloak through the
//! [`keycloak::KeycloakAdmin`] trait, implemented over HTTP by
//! [`keycloak::KeycloakClient`] and in memory by [`testing::MockKeycloak`].
//!
//! # Handshake Protocol
//!
//! Once listening, the provider prints one line to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`. Logs go to stderr.
//!
//! # Provider Configuration
//!
//! | attribute | environment default |
//! |---|---|
//! | `keycloack_enabled` | `EMBRACECLOUD_KEYCLOACK_ENABLED` (false) |
//! | `keycloak_url` | `EMBRACECLOUD_KEYCLOACK_URL` |
//! | `keycloak_client_id` | `EMBRACECLOUD_KEYCLOACK_CLIENT_ID` |
//! | `keycloak_client_secret` | `EMBRACECLOUD_KEYCLOACK_CLIENT_SECRET` |
//!
//! When keycloak is disabled every resource operation fails with a
//! configuration error.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod keycloak;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod state;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use error::ProviderError;
pub use logging::{init_logging, try_init_logging};
pub use provider::EmbraceCloudProvider;
pub use schema::ProviderSchema;
pub use server::{serve, serve_on, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};
