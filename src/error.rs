//! Error types for the provider.

use thiserror::Error;

use crate::keycloak::KeycloakError;

/// Errors surfaced by provider and resource operations.
///
/// Every variant reaches the host as an error diagnostic; the gRPC layer never
/// fails a call with a status.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The resource configuration or state is invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal provider error occurred.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// The provider is not configured, or configured incorrectly.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is not served by this provider.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A state document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Keycloak refused a create because the object already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Keycloak rejected the credentials or the token lacks the needed roles.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Keycloak is unreachable or answered with a server error.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The operation is not supported by this resource type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// The request from the host is malformed (e.g. a bad import id).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// The bare message, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Sdk(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::AlreadyExists(msg)
            | Self::PermissionDenied(msg)
            | Self::Unavailable(msg)
            | Self::Unimplemented(msg)
            | Self::InvalidRequest(msg) => msg,
            Self::Serialization(_) => "serialization error (see Debug output)",
            Self::Transport(_) => "transport error (see Debug output)",
        }
    }

    /// Whether this error means the remote object is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Wrap the message with context, keeping the variant.
    ///
    /// Resource callbacks use this to say which realm/client/role an admin
    /// call was about.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        let wrap = |msg: String| format!("{} error -> {}", context, msg);
        match self {
            Self::NotFound(msg) => Self::NotFound(wrap(msg)),
            Self::Validation(msg) => Self::Validation(wrap(msg)),
            Self::Sdk(msg) => Self::Sdk(wrap(msg)),
            Self::Configuration(msg) => Self::Configuration(wrap(msg)),
            Self::UnknownResource(msg) => Self::UnknownResource(wrap(msg)),
            Self::AlreadyExists(msg) => Self::AlreadyExists(wrap(msg)),
            Self::PermissionDenied(msg) => Self::PermissionDenied(wrap(msg)),
            Self::Unavailable(msg) => Self::Unavailable(wrap(msg)),
            Self::Unimplemented(msg) => Self::Unimplemented(wrap(msg)),
            Self::InvalidRequest(msg) => Self::InvalidRequest(wrap(msg)),
            Self::Serialization(err) => Self::Sdk(wrap(err.to_string())),
            Self::Transport(err) => Self::Unavailable(wrap(err.to_string())),
        }
    }
}

impl From<KeycloakError> for ProviderError {
    fn from(err: KeycloakError) -> Self {
        match err {
            KeycloakError::HttpFailure { status: 404, .. } => Self::NotFound(err.to_string()),
            KeycloakError::HttpFailure {
                status: 401 | 403, ..
            } => Self::PermissionDenied(err.to_string()),
            KeycloakError::HttpFailure { status: 409, .. } => Self::AlreadyExists(err.to_string()),
            KeycloakError::HttpFailure { status, .. } if status >= 500 => {
                Self::Unavailable(err.to_string())
            },
            KeycloakError::Request(_) => Self::Unavailable(err.to_string()),
            _ => Self::Sdk(err.to_string()),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Sdk(msg) => tonic::Status::internal(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            },
            ProviderError::AlreadyExists(msg) => tonic::Status::already_exists(msg),
            ProviderError::PermissionDenied(msg) => tonic::Status::permission_denied(msg),
            ProviderError::Unavailable(msg) => tonic::Status::unavailable(msg),
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
            ProviderError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
        }
    }
}
