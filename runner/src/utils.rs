use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context as _, Result};
use clap::Args;
use futures::StreamExt;
use kube_burner::{kubeconfig, ConfigSpec, Context, KubeCluster};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Options shared by every command.
#[derive(Args, Debug)]
pub struct Opts {
    /// Configuration file describing the jobs to run.
    #[arg(short, long, env = "KUBE_BURNER_CONFIG")]
    pub config: PathBuf,
}

impl Opts {
    /// Read and validate the configuration file.
    pub fn load(&self) -> Result<ConfigSpec> {
        ConfigSpec::from_file(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))
    }
}

/// Build the engine context for the cluster the configuration points at.
pub async fn connect(config: &ConfigSpec) -> Result<Arc<Context<KubeCluster>>> {
    let path = kubeconfig::path_from_env(config.global.kubeconfig.as_deref())
        .ok_or_else(|| anyhow!("no kubeconfig found, set KUBECONFIG or global.kubeconfig"))?;
    debug!(kubeconfig = %path.display(), "connecting to cluster");
    let client = kubeconfig::client(&path).await?;
    Ok(Arc::new(Context::new(KubeCluster::new(client))))
}

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// Close the returned handle once the work is done to stop listening.
pub fn cancel_on_signal() -> Result<(CancellationToken, Handle)> {
    let cancellation = CancellationToken::new();
    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let handle = signals.handle();
    let shutdown = cancellation.clone();
    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            info!(?signal, "signal received");
            shutdown.cancel();
        }
    });
    Ok((cancellation, handle))
}
