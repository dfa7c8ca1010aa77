//! Key Vault client seam
//!
//! [`SecretsClient`] is the only surface the backend uses to talk to Key
//! Vault: a lazy stream of listing pages and a get-by-name call. The REST
//! client implements it for production; tests substitute their own.

use async_trait::async_trait;
use futures::stream::BoxStream;
use kvinject_backends::SecureSecret;
use std::sync::Arc;

use crate::KeyVaultError;
use crate::credential::TokenCredential;

/// Default Key Vault data-plane API version.
pub const DEFAULT_API_VERSION: &str = "7.4";

/// Identifier of a secret version: `https://<vault>/<collection>/<name>[/<version>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretId {
    vault_url: String,
    name: String,
    version: Option<String>,
}

impl SecretId {
    /// Parse an identifier as returned by the service.
    ///
    /// # Errors
    ///
    /// Returns `KeyVaultError::InvalidSecretId` if the identifier is not a URL
    /// or has no name segment.
    pub fn parse(id: &str) -> Result<Self, KeyVaultError> {
        let url =
            reqwest::Url::parse(id).map_err(|_| KeyVaultError::InvalidSecretId(id.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| KeyVaultError::InvalidSecretId(id.to_string()))?;
        let vault_url = match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };

        let mut segments = url
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|segment| !segment.is_empty());
        // First segment is the collection (`secrets`, `keys`, ...)
        let _collection = segments.next();
        let name = segments
            .next()
            .ok_or_else(|| KeyVaultError::InvalidSecretId(id.to_string()))?
            .to_string();
        let version = segments.next().map(str::to_string);

        Ok(Self {
            vault_url,
            name,
            version,
        })
    }

    /// Vault endpoint the secret belongs to
    #[must_use]
    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    /// Secret name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Secret version, absent for identifiers that name the secret itself
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl std::fmt::Display for SecretId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/secrets/{}/{version}", self.vault_url, self.name),
            None => write!(f, "{}/secrets/{}", self.vault_url, self.name),
        }
    }
}

/// Listing entry: metadata about a secret, without its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretProperties {
    /// Secret identifier
    pub id: SecretId,
    /// Whether the secret can be read
    pub enabled: bool,
}

/// A secret value as returned by a get call.
#[derive(Debug, Clone)]
pub struct Secret {
    /// Identifier of the version that was returned
    pub id: SecretId,
    /// Secret payload
    pub value: SecureSecret,
    /// Enabled flag of the returned version, when the service reports it
    pub enabled: Option<bool>,
    /// Content type set by the writer, if any
    pub content_type: Option<String>,
}

/// Lazy, finite stream of listing pages. Each call to
/// [`SecretsClient::list_secret_properties`] starts a fresh listing.
pub type PageStream<'a> = BoxStream<'a, Result<Vec<SecretProperties>, KeyVaultError>>;

/// Options passed to a client constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// `api-version` query parameter
    pub api_version: String,
    /// `User-Agent` header
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            user_agent: format!("kvinject/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// The two Key Vault operations the backend relies on.
#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// List secret properties page by page.
    fn list_secret_properties(&self) -> PageStream<'_>;

    /// Get a secret by name. `None` fetches the current version.
    async fn get_secret(&self, name: &str, version: Option<&str>) -> Result<Secret, KeyVaultError>;
}

/// Client constructor injected into the backend: `(vault_url, credential, options)`.
pub type ClientBuilder = Arc<
    dyn Fn(
            &str,
            Arc<dyn TokenCredential>,
            Option<&ClientOptions>,
        ) -> Result<Box<dyn SecretsClient>, KeyVaultError>
        + Send
        + Sync,
>;
