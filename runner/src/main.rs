//! kube-burner drives synthetic create load against a Kubernetes cluster
#![deny(missing_docs)]

mod check;
mod destroy;
mod init;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use kube_burner_common::telemetry::{self, LogFormat};
use tracing::{error, info};

use crate::{check::check, destroy::destroy, init::init};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Format of the log lines.
    #[arg(long, value_enum, default_value_t, env = "KUBE_BURNER_LOG_FORMAT")]
    log_format: Format,

    /// Export traces to this OTLP collector.
    #[arg(long, env = "KUBE_BURNER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Format {
    /// Human readable single line logs.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

impl From<Format> for LogFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Compact => LogFormat::Compact,
            Format::Json => LogFormat::Json,
        }
    }
}

/// Available Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the jobs of a configuration
    Init(utils::Opts),
    /// Delete the namespaces created by the jobs of a configuration
    Destroy(utils::Opts),
    /// Validate a configuration and report leftover namespaces
    Check(utils::Opts),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    telemetry::init(args.log_format.into(), args.otlp_endpoint.clone())?;

    info!(?args.command, ?args.otlp_endpoint, "starting kube-burner");
    let res = match args.command {
        Command::Init(opts) => init(opts).await,
        Command::Destroy(opts) => destroy(opts).await,
        Command::Check(opts) => check(opts).await,
    };
    if let Err(err) = &res {
        error!(%err, "kube-burner failed");
    }
    // Flush traces before shutdown
    telemetry::shutdown();
    res
}
