//! Azure credentials for Key Vault access
//!
//! A credential is an opaque object handed to the client constructor; the
//! client asks it for a bearer token once and reuses that token for every
//! request it makes.

use async_trait::async_trait;
use kvinject_backends::SecureSecret;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;

use crate::KeyVaultError;
use crate::cloud::CloudName;

/// Directory (tenant) id.
pub const TENANT_ID_ENV: &str = "AZURE_TENANT_ID";
/// Service principal application id.
pub const CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";
/// Service principal secret.
pub const CLIENT_SECRET_ENV: &str = "AZURE_CLIENT_SECRET";
/// Optional override of the Entra ID authority host.
pub const AUTHORITY_HOST_ENV: &str = "AZURE_AUTHORITY_HOST";
/// Projected service account token used for workload identity.
pub const FEDERATED_TOKEN_FILE_ENV: &str = "AZURE_FEDERATED_TOKEN_FILE";

const JWT_BEARER_ASSERTION: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// A bearer token and its expiry (unix seconds) when known.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Bearer token
    pub token: SecureSecret,
    /// Expiry as unix timestamp
    pub expires_on: Option<u64>,
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync + std::fmt::Debug {
    /// Acquire a token for `scope` (e.g. `https://vault.azure.net/.default`).
    async fn get_token(&self, scope: &str) -> Result<AccessToken, KeyVaultError>;
}

/// A token acquired out of band.
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: SecureSecret,
}

impl StaticTokenCredential {
    /// Wrap an existing bearer token
    #[must_use]
    pub fn new(token: impl Into<SecureSecret>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, KeyVaultError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_on: None,
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn default_authority_host() -> String {
    match std::env::var(AUTHORITY_HOST_ENV) {
        Ok(host) if !host.is_empty() => host.trim_end_matches('/').to_string(),
        _ => CloudName::from_env().authority_host().to_string(),
    }
}

fn token_endpoint(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{tenant_id}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/')
    )
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// POST a client-credentials form to the Entra ID token endpoint.
async fn request_token(
    http: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<AccessToken, KeyVaultError> {
    let resp = http
        .post(token_url)
        .form(form)
        .send()
        .await
        .map_err(|e| KeyVaultError::Credential(format!("token request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let message = match resp.json::<TokenErrorResponse>().await {
            Ok(body) => body.error_description.unwrap_or(body.error),
            Err(_) => "no error details".to_string(),
        };
        return Err(KeyVaultError::Credential(format!(
            "token endpoint returned {}: {message}",
            status.as_u16()
        )));
    }

    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| KeyVaultError::Credential(format!("invalid token response: {e}")))?;

    Ok(AccessToken {
        token: SecureSecret::new(body.access_token),
        expires_on: body.expires_in.map(|secs| unix_now() + secs),
    })
}

/// Service principal credential using the OAuth2 client-credentials grant.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: SecureSecret,
    authority_host: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("authority_host", &self.authority_host)
            .finish_non_exhaustive()
    }
}

impl ClientSecretCredential {
    /// Create a credential for the cloud selected by the environment
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<SecureSecret>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority_host: CloudName::from_env().authority_host().to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Override the authority host (sovereign clouds, tests)
    #[must_use]
    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
    ///
    /// Returns `None` unless all three are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let tenant_id = std::env::var(TENANT_ID_ENV).ok()?;
        let client_id = std::env::var(CLIENT_ID_ENV).ok()?;
        let client_secret = std::env::var(CLIENT_SECRET_ENV).ok()?;

        Some(
            Self::new(tenant_id, client_id, client_secret)
                .with_authority_host(default_authority_host()),
        )
    }

    fn token_url(&self) -> String {
        token_endpoint(&self.authority_host, &self.tenant_id)
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, KeyVaultError> {
        tracing::debug!(
            tenant_id = %self.tenant_id,
            client_id = %self.client_id,
            scope,
            "Requesting Azure access token with client secret"
        );

        request_token(
            &self.http,
            &self.token_url(),
            &[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose()),
                ("scope", scope),
            ],
        )
        .await
    }
}

/// Workload identity federation, as injected into pods by the AKS webhook.
///
/// The service account token in `AZURE_FEDERATED_TOKEN_FILE` is exchanged for
/// an access token. The file is re-read on every request since the kubelet
/// rotates it.
pub struct WorkloadIdentityCredential {
    tenant_id: String,
    client_id: String,
    token_file: PathBuf,
    authority_host: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for WorkloadIdentityCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadIdentityCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("token_file", &self.token_file)
            .field("authority_host", &self.authority_host)
            .finish_non_exhaustive()
    }
}

impl WorkloadIdentityCredential {
    /// Create a credential for the cloud selected by the environment
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            token_file: token_file.into(),
            authority_host: CloudName::from_env().authority_host().to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Override the authority host (sovereign clouds, tests)
    #[must_use]
    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_FEDERATED_TOKEN_FILE`.
    ///
    /// Returns `None` unless all three are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let tenant_id = std::env::var(TENANT_ID_ENV).ok()?;
        let client_id = std::env::var(CLIENT_ID_ENV).ok()?;
        let token_file = std::env::var_os(FEDERATED_TOKEN_FILE_ENV)?;

        Some(
            Self::new(tenant_id, client_id, token_file)
                .with_authority_host(default_authority_host()),
        )
    }

    async fn read_assertion(&self) -> Result<SecureSecret, KeyVaultError> {
        let raw = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                KeyVaultError::Credential(format!(
                    "failed to read federated token file {}: {e}",
                    self.token_file.display()
                ))
            })?;
        let assertion = raw.trim();
        if assertion.is_empty() {
            return Err(KeyVaultError::Credential(format!(
                "federated token file {} is empty",
                self.token_file.display()
            )));
        }
        Ok(SecureSecret::from(assertion))
    }
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, KeyVaultError> {
        tracing::debug!(
            tenant_id = %self.tenant_id,
            client_id = %self.client_id,
            scope,
            "Requesting Azure access token with workload identity"
        );

        let assertion = self.read_assertion().await?;
        request_token(
            &self.http,
            &token_endpoint(&self.authority_host, &self.tenant_id),
            &[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_assertion_type", JWT_BEARER_ASSERTION),
                ("client_assertion", assertion.expose()),
                ("scope", scope),
            ],
        )
        .await
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default, rename = "expires_on")]
    expires_on: Option<u64>,
}

/// Credential that shells out to `az account get-access-token`.
#[derive(Debug, Clone, Default)]
pub struct AzureCliCredential {
    tenant_id: Option<String>,
}

impl AzureCliCredential {
    /// Use the CLI's current login
    #[must_use]
    pub const fn new() -> Self {
        Self { tenant_id: None }
    }

    /// Request tokens for a specific tenant
    #[must_use]
    pub fn with_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
        }
    }

    /// Use `AZURE_TENANT_ID` as the tenant when it is set
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(TENANT_ID_ENV) {
            Ok(tenant_id) if !tenant_id.is_empty() => Self::with_tenant(tenant_id),
            _ => Self::new(),
        }
    }

    fn args<'a>(&'a self, resource: &'a str) -> Vec<&'a str> {
        let mut args = vec![
            "account",
            "get-access-token",
            "--resource",
            resource,
            "--output",
            "json",
        ];
        if let Some(tenant_id) = &self.tenant_id {
            args.extend(["--tenant", tenant_id.as_str()]);
        }
        args
    }

    /// `az` takes a resource, not a scope
    fn scope_to_resource(scope: &str) -> &str {
        scope.strip_suffix("/.default").unwrap_or(scope)
    }

    fn parse_output(stdout: &[u8]) -> Result<AccessToken, KeyVaultError> {
        let parsed: CliTokenResponse = serde_json::from_slice(stdout)
            .map_err(|e| KeyVaultError::Credential(format!("invalid az CLI output: {e}")))?;
        Ok(AccessToken {
            token: SecureSecret::new(parsed.access_token),
            expires_on: parsed.expires_on,
        })
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, KeyVaultError> {
        let resource = Self::scope_to_resource(scope);
        tracing::debug!(
            resource,
            tenant_id = self.tenant_id.as_deref(),
            "Requesting Azure access token from az CLI"
        );

        let output = Command::new("az")
            .args(self.args(resource))
            .output()
            .await
            .map_err(|e| KeyVaultError::Credential(format!("failed to execute az CLI: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KeyVaultError::Credential(format!(
                "az CLI failed: {}",
                stderr.trim()
            )));
        }

        Self::parse_output(&output.stdout)
    }
}

/// Credential with auto-negotiated mode
///
/// With `AZURE_TENANT_ID` and `AZURE_CLIENT_ID` set:
/// - `AZURE_CLIENT_SECRET` also set → service principal
/// - `AZURE_FEDERATED_TOKEN_FILE` also set → workload identity
///
/// Otherwise → CLI mode (uses `az` CLI, scoped to `AZURE_TENANT_ID` if set)
pub enum DefaultAzureCredential {
    /// Service principal with client secret
    ClientSecret(ClientSecretCredential),
    /// Federated service account token
    WorkloadIdentity(WorkloadIdentityCredential),
    /// Azure CLI login
    AzureCli(AzureCliCredential),
}

impl std::fmt::Debug for DefaultAzureCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAzureCredential")
            .field("mode", &self.mode())
            .finish()
    }
}

impl DefaultAzureCredential {
    /// Pick a mode from the environment
    #[must_use]
    pub fn new() -> Self {
        if let Some(credential) = ClientSecretCredential::from_env() {
            tracing::debug!("Using Azure service principal credential");
            Self::ClientSecret(credential)
        } else if let Some(credential) = WorkloadIdentityCredential::from_env() {
            tracing::debug!("Using Azure workload identity credential");
            Self::WorkloadIdentity(credential)
        } else {
            tracing::debug!("No Azure service principal or workload identity, using az CLI");
            Self::AzureCli(AzureCliCredential::from_env())
        }
    }

    /// Mode name for diagnostics
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::ClientSecret(_) => "client-secret",
            Self::WorkloadIdentity(_) => "workload-identity",
            Self::AzureCli(_) => "cli",
        }
    }
}

impl Default for DefaultAzureCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCredential for DefaultAzureCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, KeyVaultError> {
        match self {
            Self::ClientSecret(credential) => credential.get_token(scope).await,
            Self::WorkloadIdentity(credential) => credential.get_token(scope).await,
            Self::AzureCli(credential) => credential.get_token(scope).await,
        }
    }
}
