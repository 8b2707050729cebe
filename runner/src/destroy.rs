use anyhow::Result;
use kube_burner::{labels::Selector, namespaces::cleanup_namespaces};
use tracing::info;

use crate::utils::{cancel_on_signal, connect, Opts};

/// Delete the namespaces of every job in the configuration.
#[tracing::instrument(skip_all, fields(config = %opts.config.display()))]
pub async fn destroy(opts: Opts) -> Result<()> {
    let config = opts.load()?;
    let cx = connect(&config).await?;
    let (cancel, signals) = cancel_on_signal()?;

    let res = async {
        for job in &config.jobs {
            let selector = Selector::for_job(&job.name);
            let deleted =
                cleanup_namespaces(&*cx, &selector, job.max_wait_timeout, &cancel).await?;
            info!(job = %job.name, deleted, "namespaces removed");
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;
    signals.close();
    res
}
