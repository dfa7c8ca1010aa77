//! Secret backends for kvinject
//!
//! Provides a unified interface for fetching secrets from remote secret
//! stores. A backend answers two questions for the injection tool: "what are
//! all the secrets under this path" and "what is the value of this one
//! secret". Values are handed back as JSON so that every backend can be
//! consumed by the same placeholder substitution code.
//!
//! ```ignore
//! use kvinject_backends::{Annotations, Backend};
//!
//! backend.login().await?;
//! let secrets = backend.get_secrets("my-vault", None, &Annotations::new()).await?;
//! for (name, value) in &secrets {
//!     println!("{name} = {value}");
//! }
//! ```
//!
//! Provider implementations live in separate crates:
//! - kvinject-azure: `AzureKeyVault`

mod registry;
mod types;

pub use registry::BackendRegistry;
pub use types::SecureSecret;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Secret name -> resolved value, as returned by [`Backend::get_secrets`].
pub type SecretMap = HashMap<String, serde_json::Value>;

/// Caller supplied metadata (for example manifest annotations).
///
/// Backends may use these to refine a lookup; backends that have no use for
/// them ignore the map.
pub type Annotations = HashMap<String, String>;

/// Error types for secret backends
#[derive(Debug, Error)]
pub enum BackendError {
    /// Secret not found
    #[error("Secret not found: {message}")]
    NotFound {
        /// Provider message describing what was missing
        message: String,
    },

    /// The call did not finish within its deadline
    #[error("Backend call timed out after {}s", .after.as_secs())]
    Timeout {
        /// The deadline that was exceeded
        after: Duration,
    },

    /// No backend registered under the requested name
    #[error("Unsupported secret backend: {backend}")]
    UnsupportedBackend {
        /// The backend type that was requested
        backend: String,
    },

    /// Any other failure reported by a provider (transport, auth, decoding)
    #[error("{backend} backend error: {source}")]
    Provider {
        /// Backend that produced the error
        backend: &'static str,
        /// Underlying provider error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BackendError {
    /// Wrap a provider specific error
    #[must_use]
    pub fn provider(
        backend: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Provider {
            backend,
            source: source.into(),
        }
    }

    /// Whether this error means the secret does not exist
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A remote secret store.
///
/// Implementors must provide:
/// - [`get_secrets`](Backend::get_secrets) - every secret under a path
/// - [`get_individual_secret`](Backend::get_individual_secret) - one named secret
/// - [`backend_name`](Backend::backend_name) - identifier used for registry lookup
///
/// `version` is an optional pinned version; `None` means the current value.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Authenticate against the store.
    ///
    /// Backends whose SDK authenticates lazily keep the default no-op.
    async fn login(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Fetch all secrets stored under `path`.
    async fn get_secrets(
        &self,
        path: &str,
        version: Option<&str>,
        annotations: &Annotations,
    ) -> Result<SecretMap, BackendError>;

    /// Fetch a single secret stored under `path`.
    async fn get_individual_secret(
        &self,
        path: &str,
        secret: &str,
        version: Option<&str>,
        annotations: &Annotations,
    ) -> Result<serde_json::Value, BackendError>;

    /// Get the backend name.
    ///
    /// Examples: `"azurekeyvault"`
    fn backend_name(&self) -> &'static str;
}
