//! CLI error types rendered through miette

use kvinject_backends::BackendError;
use miette::Diagnostic;
use thiserror::Error;

/// CLI-specific error types with diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("`{command}` failed")]
    #[diagnostic(
        code(kvinject::cli::backend_failed),
        help("Run with --level debug for per-secret diagnostics")
    )]
    BackendFailed {
        command: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("Unknown backend type")]
    #[diagnostic(code(kvinject::cli::unknown_backend))]
    UnknownBackend {
        #[source]
        source: BackendError,
        #[help]
        available: String,
    },

    #[error("Failed to write output")]
    #[diagnostic(code(kvinject::cli::output_error))]
    OutputError {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render secrets as JSON")]
    #[diagnostic(code(kvinject::cli::render_error))]
    RenderError {
        #[source]
        source: serde_json::Error,
    },

    #[error("Tracing initialization failed")]
    #[diagnostic(
        code(kvinject::cli::tracing_error),
        help("Check the RUST_LOG environment variable")
    )]
    TracingError {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CliError {
    pub fn backend_failed(command: &'static str, source: BackendError) -> Self {
        match source {
            BackendError::UnsupportedBackend { .. } => Self::UnknownBackend {
                source,
                available: format!("Supported backends: {}", kvinject_azure::BACKEND_NAME),
            },
            source => Self::BackendFailed { command, source },
        }
    }
}
