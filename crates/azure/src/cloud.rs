//! Azure cloud selection
//!
//! The target cloud is chosen by the `AVP_AZ_CLOUD_NAME` environment variable.
//! It is sampled on every call rather than cached, so it is expected to be set
//! once at process start.

/// Environment variable selecting the Azure cloud.
pub const CLOUD_NAME_ENV: &str = "AVP_AZ_CLOUD_NAME";

/// Azure cloud a vault lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CloudName {
    /// Azure public cloud
    #[default]
    AzurePublic,
    /// Azure China (operated by 21Vianet)
    AzureChina,
}

impl CloudName {
    /// Read the cloud from `AVP_AZ_CLOUD_NAME`.
    ///
    /// Only `azurechina` selects a non-default cloud; any other value, or an
    /// unset variable, means the public cloud.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(CLOUD_NAME_ENV)
            .map(|value| Self::from_name(&value))
            .unwrap_or_default()
    }

    /// Map a cloud name to a cloud.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "azurechina" => Self::AzureChina,
            _ => Self::AzurePublic,
        }
    }

    /// DNS suffix of Key Vault endpoints in this cloud.
    #[must_use]
    pub const fn vault_dns_suffix(self) -> &'static str {
        match self {
            Self::AzurePublic => "vault.azure.net",
            Self::AzureChina => "vault.azure.cn",
        }
    }

    /// Entra ID authority host used for token requests.
    #[must_use]
    pub const fn authority_host(self) -> &'static str {
        match self {
            Self::AzurePublic => "https://login.microsoftonline.com",
            Self::AzureChina => "https://login.chinacloudapi.cn",
        }
    }

    /// OAuth scope granting access to Key Vault data-plane APIs.
    #[must_use]
    pub const fn key_vault_scope(self) -> &'static str {
        match self {
            Self::AzurePublic => "https://vault.azure.net/.default",
            Self::AzureChina => "https://vault.azure.cn/.default",
        }
    }

    /// Infer the cloud from a vault URL's host.
    #[must_use]
    pub fn from_vault_url(vault_url: &str) -> Self {
        let host = vault_url
            .split("://")
            .nth(1)
            .unwrap_or(vault_url)
            .split(['/', ':'])
            .next()
            .unwrap_or_default();
        if host.ends_with(Self::AzureChina.vault_dns_suffix()) {
            Self::AzureChina
        } else {
            Self::AzurePublic
        }
    }

    /// Build the endpoint of the vault named `path`.
    ///
    /// `path` is not validated; a malformed name surfaces later as a transport
    /// error.
    #[must_use]
    pub fn vault_url(self, path: &str) -> String {
        format!("https://{path}.{}", self.vault_dns_suffix())
    }
}

/// Build the endpoint of the vault named `path` in the cloud currently
/// selected by the environment.
#[must_use]
pub fn resolve_vault_url(path: &str) -> String {
    CloudName::from_env().vault_url(path)
}
