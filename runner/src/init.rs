use anyhow::Result;
use kube_burner::{build_executors, WaitRegistry};
use tracing::info;

use crate::utils::{cancel_on_signal, connect, Opts};

/// Run every job of the configuration in order.
#[tracing::instrument(skip_all, fields(config = %opts.config.display()))]
pub async fn init(opts: Opts) -> Result<()> {
    let config = opts.load()?;
    let cx = connect(&config).await?;
    let (cancel, signals) = cancel_on_signal()?;

    let mut executors = build_executors(cx, &WaitRegistry::default(), &config).await?;
    info!(jobs = executors.len(), "all jobs resolved");
    let res = async {
        for executor in &mut executors {
            info!(
                job = %executor.job().name,
                selector = %executor.selector(),
                iterations = executor.job().job_iterations,
                "starting job"
            );
            let summary = executor.run(&cancel).await?;
            executor.cleanup(&cancel).await?;
            info!(
                job = %summary.name,
                start = %summary.start,
                end = %summary.end,
                elapsed = ?summary.elapsed,
                iterations = summary.iterations,
                namespaces = summary.namespaces.len(),
                objects = summary.objects_created,
                "job summary"
            );
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;
    signals.close();
    res
}
