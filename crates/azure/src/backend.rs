//! Azure Key Vault backend

use async_trait::async_trait;
use futures::TryStreamExt;
use kvinject_backends::{Annotations, Backend, BackendError, SecretMap};
use std::sync::Arc;
use std::time::Duration;

use crate::KeyVaultError;
use crate::client::{ClientBuilder, ClientOptions, SecretsClient};
use crate::cloud::resolve_vault_url;
use crate::config::{AzureKeyVaultConfig, DEFAULT_TIMEOUT_SECS};
use crate::credential::TokenCredential;
use crate::rest::KeyVaultClient;

/// Name under which the backend registers.
pub const BACKEND_NAME: &str = "azurekeyvault";

/// Fetches secrets from Azure Key Vault
///
/// The vault path is the vault name; its endpoint is derived from the cloud
/// selected by `AVP_AZ_CLOUD_NAME` at call time. A fresh client is built for
/// every call through the injected constructor, and authentication happens
/// inside that client, so [`Backend::login`] does nothing.
pub struct AzureKeyVault {
    credential: Arc<dyn TokenCredential>,
    client_builder: ClientBuilder,
    client_options: Option<ClientOptions>,
    timeout: Duration,
}

impl std::fmt::Debug for AzureKeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureKeyVault")
            .field("credential", &self.credential)
            .field("client_options", &self.client_options)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AzureKeyVault {
    /// Create a backend from a credential and a client constructor
    pub fn new<F, C>(credential: Arc<dyn TokenCredential>, client_builder: F) -> Self
    where
        F: Fn(&str, Arc<dyn TokenCredential>, Option<&ClientOptions>) -> Result<C, KeyVaultError>
            + Send
            + Sync
            + 'static,
        C: SecretsClient + 'static,
    {
        let client_builder: ClientBuilder = Arc::new(
            move |vault_url: &str,
                  credential: Arc<dyn TokenCredential>,
                  options: Option<&ClientOptions>|
                  -> Result<Box<dyn SecretsClient>, KeyVaultError> {
                let client = client_builder(vault_url, credential, options)?;
                Ok(Box::new(client) as Box<dyn SecretsClient>)
            },
        );
        Self::with_client_builder(credential, client_builder)
    }

    /// Create a backend from an already type-erased client constructor
    #[must_use]
    pub fn with_client_builder(
        credential: Arc<dyn TokenCredential>,
        client_builder: ClientBuilder,
    ) -> Self {
        Self {
            credential,
            client_builder,
            client_options: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create a backend talking to the Key Vault REST API
    #[must_use]
    pub fn with_default_client(credential: Arc<dyn TokenCredential>) -> Self {
        Self::with_client_builder(credential, KeyVaultClient::builder())
    }

    /// Create a REST-backed backend from configuration
    #[must_use]
    pub fn from_config(credential: Arc<dyn TokenCredential>, config: &AzureKeyVaultConfig) -> Self {
        let mut backend = Self::with_default_client(credential).with_timeout(config.timeout());
        backend.client_options = Some(config.client_options());
        backend
    }

    /// Override the per-call deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Per-call deadline
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn client(&self, vault_url: &str) -> Result<Box<dyn SecretsClient>, KeyVaultError> {
        (self.client_builder)(
            vault_url,
            Arc::clone(&self.credential),
            self.client_options.as_ref(),
        )
    }

    /// Run `fut` under the backend deadline.
    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, KeyVaultError>> + Send,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(BackendError::from),
            Err(_) => Err(BackendError::Timeout {
                after: self.timeout,
            }),
        }
    }

    async fn collect_secrets(
        &self,
        vault_url: &str,
        version: Option<&str>,
    ) -> Result<SecretMap, KeyVaultError> {
        let client = self.client(vault_url)?;
        let mut data = SecretMap::new();

        let mut pages = client.list_secret_properties();
        while let Some(page) = pages.try_next().await? {
            for properties in page {
                if !properties.enabled {
                    continue;
                }
                let name = properties.id.name();
                log_optional_version("Azure Key Vault getting secret", version, name, vault_url);

                if version.is_none() || properties.id.version() == version {
                    // Matching entries are read at the current version
                    let secret = client.get_secret(name, None).await?;
                    tracing::debug!(id = %secret.id, "Azure Key Vault got secret");
                    data.insert(name.to_string(), secret.value.to_json());
                    continue;
                }

                match client.get_secret(name, version).await {
                    Ok(secret) if secret.enabled != Some(false) => {
                        tracing::debug!(id = %secret.id, "Azure Key Vault got versioned secret");
                        data.insert(name.to_string(), secret.value.to_json());
                    }
                    Ok(secret) => {
                        tracing::debug!(
                            id = %secret.id,
                            "Azure Key Vault versioned secret is disabled"
                        );
                    }
                    Err(err) => {
                        tracing::debug!(
                            secret = name,
                            version,
                            error = %err,
                            "Azure Key Vault get versioned secret not found"
                        );
                    }
                }
            }
        }

        Ok(data)
    }
}

fn log_optional_version(message: &str, version: Option<&str>, name: &str, vault_url: &str) {
    match version {
        Some(version) => tracing::debug!(secret = name, vault_url, version, "{message}"),
        None => tracing::debug!(secret = name, vault_url, "{message}"),
    }
}

#[async_trait]
impl Backend for AzureKeyVault {
    async fn login(&self) -> Result<(), BackendError> {
        tracing::trace!("Azure Key Vault authenticates when the client is built, nothing to do");
        Ok(())
    }

    async fn get_secrets(
        &self,
        path: &str,
        version: Option<&str>,
        _annotations: &Annotations,
    ) -> Result<SecretMap, BackendError> {
        let version = version.filter(|v| !v.is_empty());
        let vault_url = resolve_vault_url(path);

        match version {
            Some(version) => tracing::debug!(
                vault_url = %vault_url,
                version,
                "Azure Key Vault list all secrets from vault"
            ),
            None => tracing::debug!(
                vault_url = %vault_url,
                "Azure Key Vault list all secrets from vault"
            ),
        }

        self.with_deadline(self.collect_secrets(&vault_url, version))
            .await
    }

    async fn get_individual_secret(
        &self,
        path: &str,
        secret: &str,
        version: Option<&str>,
        _annotations: &Annotations,
    ) -> Result<serde_json::Value, BackendError> {
        let version = version.filter(|v| !v.is_empty());
        let vault_url = resolve_vault_url(path);
        log_optional_version(
            "Azure Key Vault getting individual secret",
            version,
            secret,
            &vault_url,
        );

        let fetched = self
            .with_deadline(async {
                let client = self.client(&vault_url)?;
                client.get_secret(secret, version).await
            })
            .await?;

        tracing::debug!(id = %fetched.id, "Azure Key Vault got individual secret");
        Ok(fetched.value.to_json())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticTokenCredential;

    fn credential() -> Arc<dyn TokenCredential> {
        Arc::new(StaticTokenCredential::new("token"))
    }

    #[test]
    fn test_default_timeout() {
        let backend = AzureKeyVault::with_default_client(credential());
        assert_eq!(backend.timeout(), Duration::from_secs(10));
        assert_eq!(backend.backend_name(), "azurekeyvault");
    }

    #[test]
    fn test_from_config() {
        let config = AzureKeyVaultConfig {
            timeout_secs: 3,
            api_version: "7.5".to_string(),
        };
        let backend = AzureKeyVault::from_config(credential(), &config);
        assert_eq!(backend.timeout(), Duration::from_secs(3));
        assert_eq!(
            backend.client_options.as_ref().map(|o| o.api_version.as_str()),
            Some("7.5")
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let backend = AzureKeyVault::with_default_client(credential());
        let debug = format!("{backend:?}");
        assert!(debug.contains("AzureKeyVault"));
        assert!(!debug.contains("\"token\""));
    }

    #[tokio::test]
    async fn test_login_is_noop() {
        let backend = AzureKeyVault::with_default_client(credential());
        assert!(backend.login().await.is_ok());
    }

    #[tokio::test]
    async fn test_default_client_rejects_malformed_path() {
        // The vault path is not validated up front; the client constructor
        // reports it.
        let backend = AzureKeyVault::with_default_client(credential());
        let err = backend
            .get_individual_secret("bad host", "name", None, &Annotations::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Provider { .. }));
    }
}
