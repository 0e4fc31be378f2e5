//! Errors raised by the Keycloak admin client.

use thiserror::Error;

/// Failures talking to the Keycloak admin REST API.
#[derive(Debug, Error)]
pub enum KeycloakError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("request to keycloak failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Keycloak answered with a non-success status.
    #[error("keycloak returned HTTP {status}: {body}")]
    HttpFailure {
        /// HTTP status code.
        status: u16,
        /// Response body, usually a JSON error document.
        body: String,
    },

    /// The response body did not match the expected representation.
    #[error("could not decode keycloak response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A create call succeeded but carried no `Location` header.
    #[error("keycloak response is missing the Location header")]
    MissingLocation,

    /// The configured server url cannot be used as a base url.
    #[error("invalid keycloak url: {0}")]
    InvalidUrl(String),
}

impl KeycloakError {
    /// HTTP status of the failure, if keycloak answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}
