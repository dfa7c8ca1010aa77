mod cli;
mod commands;
mod errors;
mod tracing;

use std::sync::Arc;

use ::tracing::Instrument;
use clap::Parser;
use kvinject_azure::{AzureKeyVault, AzureKeyVaultConfig, DefaultAzureCredential};
use kvinject_backends::BackendRegistry;

use crate::cli::Cli;
use crate::commands::Command;
use crate::tracing::TracingConfig;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    crate::tracing::init_tracing(&TracingConfig::from_flags(cli.json, cli.level))?;

    let registry = build_registry(cli.timeout_secs);
    let command: Command = cli.command.into();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::execute(&registry, &cli.backend, &command, &mut out)
        .instrument(::tracing::info_span!("kvinject", run_id = %crate::tracing::run_id()))
        .await?;
    Ok(())
}

fn build_registry(timeout_secs: u64) -> BackendRegistry {
    let config = AzureKeyVaultConfig {
        timeout_secs,
        ..Default::default()
    };
    let credential = Arc::new(DefaultAzureCredential::new());
    ::tracing::debug!(?credential, timeout_secs, "Registering Azure Key Vault backend");

    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(AzureKeyVault::from_config(credential, &config)));
    registry
}
