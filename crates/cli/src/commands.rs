//! Command execution against the backend registry

use std::collections::BTreeMap;
use std::io::Write;

use kvinject_backends::{Annotations, BackendRegistry};
use tracing::instrument;

use crate::errors::CliError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Secrets {
        path: String,
        version: Option<String>,
        annotations: Annotations,
    },
    Secret {
        path: String,
        name: String,
        version: Option<String>,
        annotations: Annotations,
    },
}

impl Command {
    const fn name(&self) -> &'static str {
        match self {
            Self::Secrets { .. } => "secrets",
            Self::Secret { .. } => "secret",
        }
    }
}

/// Run `command` on the named backend and write its result to `out`
#[instrument(skip(registry, command, out), fields(command = command.name()))]
pub async fn execute(
    registry: &BackendRegistry,
    backend: &str,
    command: &Command,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let name = command.name();
    let backend = registry
        .get(backend)
        .map_err(|e| CliError::backend_failed(name, e))?;

    backend
        .login()
        .await
        .map_err(|e| CliError::backend_failed(name, e))?;

    let rendered = match command {
        Command::Secrets {
            path,
            version,
            annotations,
        } => {
            let secrets = backend
                .get_secrets(path, version.as_deref(), annotations)
                .await
                .map_err(|e| CliError::backend_failed(name, e))?;
            tracing::info!(count = secrets.len(), "Fetched secrets");

            let ordered: BTreeMap<_, _> = secrets.into_iter().collect();
            serde_json::to_string_pretty(&ordered)
                .map_err(|source| CliError::RenderError { source })?
        }
        Command::Secret {
            path,
            name: secret,
            version,
            annotations,
        } => {
            let value = backend
                .get_individual_secret(path, secret, version.as_deref(), annotations)
                .await
                .map_err(|e| CliError::backend_failed(name, e))?;

            match value {
                serde_json::Value::String(value) => value,
                other => serde_json::to_string(&other)
                    .map_err(|source| CliError::RenderError { source })?,
            }
        }
    };

    writeln!(out, "{rendered}").map_err(|source| CliError::OutputError { source })
}
