//! Readiness waits for created objects.
//!
//! A [`WaitRegistry`] maps an object kind to the [`ReadinessCheck`] that
//! decides whether one object of that kind is ready. [`wait_for_ready`] polls
//! the cluster until every object of a kind in a namespace passes its check.
pub mod checks;

use std::{collections::HashMap, sync::Arc, time::Duration};

use kube::{api::DynamicObject, discovery::ApiResource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cluster::ClusterApi,
    error::{Error, Result},
    utils::{bounded, Context},
};

use self::checks::{DaemonSetReady, PodRunning, ReplicasReady};

/// Decides whether a single object of one kind is ready.
pub trait ReadinessCheck: Send + Sync {
    /// Kind of object this check applies to.
    fn kind(&self) -> &str;

    /// Report whether the object is ready.
    fn is_ready(&self, object: &DynamicObject) -> bool;
}

/// Readiness checks by kind.
#[derive(Clone)]
pub struct WaitRegistry {
    checks: HashMap<String, Arc<dyn ReadinessCheck>>,
}

impl WaitRegistry {
    /// Registry without any checks.
    pub fn empty() -> Self {
        Self {
            checks: HashMap::new(),
        }
    }

    /// Add a check, replacing any check already registered for its kind.
    pub fn register(&mut self, check: impl ReadinessCheck + 'static) {
        self.checks.insert(check.kind().to_owned(), Arc::new(check));
    }

    /// Check registered for a kind, if any.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn ReadinessCheck>> {
        self.checks.get(kind).cloned()
    }
}

impl Default for WaitRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for kind in [
            "Deployment",
            "ReplicaSet",
            "ReplicationController",
            "StatefulSet",
        ] {
            registry.register(ReplicasReady::new(kind));
        }
        registry.register(DaemonSetReady);
        registry.register(PodRunning);
        registry
    }
}

/// Block until every object of `resource` in `namespace` passes `check`.
///
/// The namespace is listed every `poll_interval` of the context. Without a
/// timeout this waits until the objects converge or `cancel` fires.
pub async fn wait_for_ready<C, K>(
    cx: &Context<C, K>,
    resource: &ApiResource,
    namespace: &str,
    check: &dyn ReadinessCheck,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<()>
where
    C: ClusterApi,
{
    info!(kind = %resource.kind, namespace, "waiting for objects to be ready");
    let poll = async {
        loop {
            let objects = cx
                .cluster
                .list(resource, namespace)
                .await
                .map_err(|source| Error::Wait {
                    kind: resource.kind.clone(),
                    namespace: namespace.to_owned(),
                    source,
                })?;
            let unready = objects.iter().filter(|o| !check.is_ready(o)).count();
            if unready == 0 {
                return Ok::<_, Error>(());
            }
            debug!(
                kind = %resource.kind,
                namespace,
                unready,
                total = objects.len(),
                "objects not ready yet"
            );
            tokio::time::sleep(cx.poll_interval).await;
        }
    };
    bounded(
        format!("{} readiness in {namespace}", resource.kind),
        timeout,
        cancel,
        poll,
    )
    .await?;
    info!(kind = %resource.kind, namespace, "objects ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use kube::{api::DynamicObject, core::GroupVersionKind, discovery::ApiResource};
    use mockall::predicate;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::{checks::PodRunning, wait_for_ready, WaitRegistry};
    use crate::{
        cluster::{ClusterApi, ClusterError, MockClusterApi},
        error::Error,
        utils::{test::FakeCluster, Context},
    };

    fn pods() -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind::gvk("", "v1", "Pod"))
    }

    #[test]
    fn default_registry_knows_workload_kinds() {
        let registry = WaitRegistry::default();
        for kind in [
            "Deployment",
            "ReplicaSet",
            "ReplicationController",
            "StatefulSet",
            "DaemonSet",
            "Pod",
        ] {
            let check = registry.get(kind).expect("registered");
            assert_eq!(check.kind(), kind);
        }
        assert!(registry.get("ConfigMap").is_none());
        assert!(WaitRegistry::empty().get("Pod").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_objects_become_ready() {
        let cx = Arc::new(Context::new(FakeCluster::new()));
        let resource = pods();
        for name in ["a", "b"] {
            cx.cluster
                .create(&resource, "ns-1", &DynamicObject::new(name, &resource))
                .await
                .expect("created");
        }
        let flip = {
            let cx = cx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                cx.cluster.set_status("Pod", json!({ "phase": "Running" }));
            })
        };
        wait_for_ready(
            &*cx,
            &resource,
            "ns-1",
            &PodRunning,
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("pods ready");
        flip.await.expect("status flipped");
        assert!(cx.cluster.state().object_lists >= 5);
    }

    #[tokio::test]
    async fn empty_namespace_is_ready() {
        let cx = Context::new(FakeCluster::new());
        wait_for_ready(
            &cx,
            &pods(),
            "ns-1",
            &PodRunning,
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("nothing to wait for");
        assert_eq!(cx.cluster.state().object_lists, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_objects_never_converge() {
        let cx = Context::new(FakeCluster::new());
        let resource = pods();
        cx.cluster
            .create(&resource, "ns-1", &DynamicObject::new("a", &resource))
            .await
            .expect("created");
        let err = wait_for_ready(
            &cx,
            &resource,
            "ns-1",
            &PodRunning,
            Some(Duration::from_secs(30)),
            &CancellationToken::new(),
        )
        .await
        .expect_err("never ready");
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let cx = Context::new(FakeCluster::new());
        let resource = pods();
        cx.cluster
            .create(&resource, "ns-1", &DynamicObject::new("a", &resource))
            .await
            .expect("created");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });
        let err = wait_for_ready(&cx, &resource, "ns-1", &PodRunning, None, &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn list_failure_is_wait_error() {
        let mut mock = MockClusterApi::new();
        mock.expect_list()
            .with(predicate::always(), predicate::eq("ns-1"))
            .times(1)
            .returning(|_, _| Err(ClusterError::NotFound("pods".to_owned())));
        let cx = Context::new(mock);
        let err = wait_for_ready(
            &cx,
            &pods(),
            "ns-1",
            &PodRunning,
            None,
            &CancellationToken::new(),
        )
        .await
        .expect_err("list failed");
        assert!(matches!(err, Error::Wait { kind, .. } if kind == "Pod"));
    }
}
