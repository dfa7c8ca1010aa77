//! Backend configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{ClientOptions, DEFAULT_API_VERSION};

/// Default upper bound on a whole backend call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for the Azure Key Vault backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AzureKeyVaultConfig {
    /// Deadline covering listing plus every per-secret fetch of one call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Key Vault data-plane API version
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl Default for AzureKeyVaultConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_version: default_api_version(),
        }
    }
}

impl AzureKeyVaultConfig {
    /// Call deadline as a duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Options handed to the client constructor
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_version: self.api_version.clone(),
            ..ClientOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AzureKeyVaultConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.client_options().api_version, "7.4");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: AzureKeyVaultConfig = serde_json::from_str(r#"{"timeoutSecs": 30}"#).unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.api_version, "7.4");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = AzureKeyVaultConfig {
            timeout_secs: 5,
            api_version: "2025-07-01".to_string(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("apiVersion"));
        let parsed: AzureKeyVaultConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
