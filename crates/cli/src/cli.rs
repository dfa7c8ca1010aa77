use crate::commands::Command;
use crate::tracing::LogLevel;
use clap::{Parser, Subcommand};
use kvinject_azure::{BACKEND_NAME, DEFAULT_TIMEOUT_SECS};

#[derive(Parser, Debug)]
#[command(name = "kvinject")]
#[command(about = "Fetch secrets from a secret manager for placeholder substitution")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        env = "AVP_TYPE",
        help = "Secret backend to read from",
        default_value = BACKEND_NAME
    )]
    pub backend: String,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(long, global = true, help = "Output logs in JSON format")]
    pub json: bool,

    #[arg(
        long,
        global = true,
        env = "KVINJECT_TIMEOUT_SECS",
        help = "Deadline in seconds for a whole backend call",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Fetch every enabled secret in a vault as a JSON object")]
    Secrets {
        #[arg(long, short = 'p', help = "Vault name")]
        path: String,
        #[arg(long, help = "Only return secrets available at this version")]
        version: Option<String>,
        #[arg(
            long = "annotation",
            help = "Resource annotation as key=value (repeatable)",
            value_parser = parse_annotation
        )]
        annotations: Vec<(String, String)>,
    },
    #[command(about = "Fetch the value of one secret")]
    Secret {
        #[arg(long, short = 'p', help = "Vault name")]
        path: String,
        #[arg(long, short = 'n', help = "Secret name")]
        name: String,
        #[arg(long, help = "Secret version, current when omitted")]
        version: Option<String>,
        #[arg(
            long = "annotation",
            help = "Resource annotation as key=value (repeatable)",
            value_parser = parse_annotation
        )]
        annotations: Vec<(String, String)>,
    },
}

fn parse_annotation(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("'{raw}' is not of the form key=value")),
    }
}

impl From<Commands> for Command {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Secrets {
                path,
                version,
                annotations,
            } => Self::Secrets {
                path,
                version,
                annotations: annotations.into_iter().collect(),
            },
            Commands::Secret {
                path,
                name,
                version,
                annotations,
            } => Self::Secret {
                path,
                name,
                version,
                annotations: annotations.into_iter().collect(),
            },
        }
    }
}
