//! Rate-limited creation of the replicas of one object template.
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cluster::ClusterApi,
    error::{Error, Result},
    limiter::RateLimiter,
    template::ResolvedObject,
    utils::Context,
};

/// Where and for which iteration a template is dispatched.
#[derive(Clone, Debug)]
pub struct Target {
    /// Name of the job the objects belong to.
    pub job: String,
    /// Namespace the objects are created in.
    pub namespace: String,
    /// 1-based iteration number.
    pub iteration: u32,
}

/// Render every replica of `object` and create them concurrently.
///
/// Each create waits for a token from `limiter` first. All replica tasks are
/// spawned before any is awaited, and this returns once every one of them has
/// finished. The first failure aborts the remaining creates and is returned.
/// On success the number of created objects is returned.
pub async fn dispatch_replicas<C, K>(
    cx: Arc<Context<C, K>>,
    limiter: Arc<RateLimiter>,
    object: Arc<ResolvedObject>,
    target: Target,
    cancel: CancellationToken,
) -> Result<u64>
where
    C: ClusterApi + Send + Sync + 'static,
    K: Send + Sync + 'static,
{
    let mut vars = object.iteration_vars(&target.job, target.iteration);
    let mut tasks = JoinSet::new();
    for replica in 1..=object.replicas {
        let mut rendered = object.render_replica(&mut vars, replica)?;
        rendered.metadata.namespace = Some(target.namespace.clone());
        let cx = cx.clone();
        let limiter = limiter.clone();
        let object = object.clone();
        let namespace = target.namespace.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            limiter.acquire(&cancel).await?;
            let name = rendered.metadata.name.clone().unwrap_or_default();
            info!(kind = object.kind(), %name, %namespace, "creating object");
            cx.cluster
                .create(&object.resource, &namespace, &rendered)
                .await
                .map_err(|source| Error::Create {
                    kind: object.kind().to_owned(),
                    name,
                    namespace,
                    source,
                })
        });
    }
    let mut created = 0;
    while let Some(res) = tasks.join_next().await {
        res??;
        created += 1;
    }
    debug!(
        kind = object.kind(),
        namespace = %target.namespace,
        iteration = target.iteration,
        created,
        "dispatch finished"
    );
    Ok(created)
}
