//! Azure integration for kvinject
//!
//! This crate provides the Azure Key Vault secret backend:
//! - [`AzureKeyVault`] implements [`kvinject_backends::Backend`]
//! - [`SecretsClient`] is the seam between the backend and Key Vault;
//!   [`KeyVaultClient`] implements it over the REST API
//! - [`credential`] holds the token sources (service principal, `az` CLI)

mod backend;
pub mod client;
pub mod cloud;
mod config;
pub mod credential;
mod error;
mod rest;

// Re-export main types for convenience
pub use backend::{AzureKeyVault, BACKEND_NAME};
pub use client::{
    ClientBuilder, ClientOptions, PageStream, Secret, SecretId, SecretProperties, SecretsClient,
};
pub use cloud::{CLOUD_NAME_ENV, CloudName};
pub use config::{AzureKeyVaultConfig, DEFAULT_TIMEOUT_SECS};
pub use credential::{DefaultAzureCredential, StaticTokenCredential, TokenCredential};
pub use error::KeyVaultError;
pub use rest::KeyVaultClient;
