//! Key Vault error types

use kvinject_backends::BackendError;

use crate::backend::BACKEND_NAME;

/// Key Vault client errors. Secret payloads are never included.
#[derive(Debug, thiserror::Error)]
pub enum KeyVaultError {
    /// The vault URL could not be parsed or uses a disallowed scheme
    #[error("invalid vault URL '{url}': {reason}")]
    InvalidVaultUrl {
        /// Offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// A secret identifier returned by the service was malformed
    #[error("invalid secret identifier '{0}'")]
    InvalidSecretId(String),

    /// Transport failure
    #[error("network error communicating with Key Vault")]
    Network(#[source] reqwest::Error),

    /// 401 / 403
    #[error("Key Vault authentication failed (check access policy or RBAC role): {0}")]
    Unauthorized(String),

    /// 404
    #[error("Key Vault resource not found: {0}")]
    NotFound(String),

    /// 429
    #[error("Key Vault rate limit exceeded")]
    RateLimited,

    /// 5xx
    #[error("Key Vault server error: status {0}")]
    ServerError(u16),

    /// Any other non-success status
    #[error("unexpected Key Vault response: status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Service supplied message, if any
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("failed to decode Key Vault response: {0}")]
    Decode(String),

    /// Token acquisition failed
    #[error("failed to acquire Azure access token: {0}")]
    Credential(String),
}

impl From<KeyVaultError> for BackendError {
    fn from(err: KeyVaultError) -> Self {
        match err {
            KeyVaultError::NotFound(message) => Self::NotFound { message },
            other => Self::provider(BACKEND_NAME, other),
        }
    }
}
