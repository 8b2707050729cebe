//! Namespace lifecycle of a job.
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cluster::{ClusterApi, ClusterError},
    config::JobConfig,
    error::{Error, Result},
    labels::Selector,
    utils::{bounded, Context},
};

/// Name of the `index`th namespace of a job.
pub fn namespace_name(prefix: &str, index: u32) -> String {
    format!("{prefix}-{index}")
}

/// Create the namespaces a job targets, labeled with the job's selector.
///
/// A namespace that already exists is reused. Returns the namespace names.
pub async fn create_namespaces<C, K>(
    cx: &Context<C, K>,
    job: &JobConfig,
    selector: &Selector,
) -> Result<Vec<String>>
where
    C: ClusterApi,
{
    let labels = selector.labels();
    let mut names = Vec::new();
    for index in 1..=job.namespace_count() {
        let name = namespace_name(&job.namespace, index);
        info!(namespace = %name, "creating namespace");
        match cx.cluster.create_namespace(&name, &labels).await {
            Ok(()) => {}
            Err(ClusterError::AlreadyExists(_)) => {
                warn!(namespace = %name, "namespace already exists");
            }
            Err(source) => return Err(Error::Namespace { name, source }),
        }
        names.push(name);
    }
    Ok(names)
}

/// Delete every namespace matching `selector` and wait until they are gone.
///
/// Namespaces that disappear before they are deleted are skipped. Returns the
/// number of namespaces this call deleted.
pub async fn cleanup_namespaces<C, K>(
    cx: &Context<C, K>,
    selector: &Selector,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<usize>
where
    C: ClusterApi,
{
    info!(%selector, "deleting namespaces");
    let names = list(cx, selector).await?;
    let mut deleted = 0;
    for name in names {
        match cx.cluster.delete_namespace(&name).await {
            Ok(()) => deleted += 1,
            Err(ClusterError::NotFound(_)) => {
                warn!(namespace = %name, "namespace not found");
            }
            Err(source) => {
                return Err(Error::Cleanup {
                    selector: selector.to_string(),
                    source,
                })
            }
        }
    }
    if !list(cx, selector).await?.is_empty() {
        wait_for_deleted_namespaces(cx, selector, timeout, cancel).await?;
    }
    Ok(deleted)
}

/// Poll until no namespace matches `selector`.
pub async fn wait_for_deleted_namespaces<C, K>(
    cx: &Context<C, K>,
    selector: &Selector,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<()>
where
    C: ClusterApi,
{
    info!(%selector, "waiting for namespaces to be deleted");
    let poll = async {
        loop {
            let remaining = list(cx, selector).await?;
            if remaining.is_empty() {
                return Ok::<_, Error>(());
            }
            debug!(%selector, remaining = remaining.len(), "namespaces still terminating");
            tokio::time::sleep(cx.poll_interval).await;
        }
    };
    bounded(
        format!("deletion of namespaces labeled {selector}"),
        timeout,
        cancel,
        poll,
    )
    .await
}

/// Report whether a namespace exists.
pub async fn namespace_exists<C, K>(cx: &Context<C, K>, name: &str) -> Result<bool>
where
    C: ClusterApi,
{
    match cx.cluster.get_namespace(name).await {
        Ok(_) => Ok(true),
        Err(ClusterError::NotFound(_)) => Ok(false),
        Err(source) => Err(Error::Namespace {
            name: name.to_owned(),
            source,
        }),
    }
}

async fn list<C, K>(cx: &Context<C, K>, selector: &Selector) -> Result<Vec<String>>
where
    C: ClusterApi,
{
    cx.cluster
        .list_namespaces(&selector.label_selector())
        .await
        .map_err(|source| Error::Cleanup {
            selector: selector.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use k8s_openapi::api::core::v1::Namespace;
    use mockall::predicate;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    use super::{cleanup_namespaces, create_namespaces, namespace_exists, namespace_name};
    use crate::{
        cluster::{ClusterApi, ClusterError, MockClusterApi},
        config::JobConfig,
        error::Error,
        labels::Selector,
        utils::{test::FakeCluster, Context},
    };

    fn job(iterations: u32, namespaced: bool) -> JobConfig {
        JobConfig {
            name: "density".to_owned(),
            namespace: "density".to_owned(),
            job_iterations: iterations,
            namespaced_iterations: namespaced,
            pod_wait: false,
            job_iteration_delay: 0,
            qps: 0,
            burst: 0,
            cleanup: true,
            max_wait_timeout: None,
            objects: vec![],
        }
    }

    #[test]
    fn names_are_prefixed_and_one_based() {
        assert_eq!(namespace_name("density", 1), "density-1");
        assert_eq!(namespace_name("a-b", 12), "a-b-12");
    }

    #[tokio::test]
    async fn one_namespace_per_iteration_when_namespaced() {
        let cx = Context::new(FakeCluster::new());
        let selector = Selector::for_job("density");
        let names = create_namespaces(&cx, &job(3, true), &selector)
            .await
            .expect("created");
        assert_eq!(names, vec!["density-1", "density-2", "density-3"]);
        let state = cx.cluster.state();
        assert_eq!(state.namespace_creates, 3);
        assert_eq!(
            state.namespaces["density-2"].get("kube-burner").map(String::as_str),
            Some("density")
        );
    }

    #[tokio::test]
    async fn single_namespace_when_shared() {
        let cx = Context::new(FakeCluster::new());
        let names = create_namespaces(&cx, &job(5, false), &Selector::for_job("density"))
            .await
            .expect("created");
        assert_eq!(names, vec!["density-1"]);
        assert_eq!(cx.cluster.state().namespace_creates, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn existing_namespace_is_reused() {
        let cx = Context::new(FakeCluster::new());
        let selector = Selector::for_job("density");
        cx.cluster
            .create_namespace("density-1", &selector.labels())
            .await
            .expect("precreated");
        let names = create_namespaces(&cx, &job(2, true), &selector)
            .await
            .expect("already exists is tolerated");
        assert_eq!(names.len(), 2);
        assert!(logs_contain("namespace already exists"));
    }

    #[tokio::test]
    async fn other_create_failures_are_fatal() {
        let mut mock = MockClusterApi::new();
        mock.expect_create_namespace()
            .times(1)
            .returning(|_, _| Err(ClusterError::Discovery("namespaces".to_owned())));
        let cx = Context::new(mock);
        let err = create_namespaces(&cx, &job(2, true), &Selector::for_job("density"))
            .await
            .expect_err("fatal");
        assert!(matches!(err, Error::Namespace { name, .. } if name == "density-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_waits_for_termination() {
        let cx = Context::new(FakeCluster::new());
        let selector = Selector::for_job("density");
        create_namespaces(&cx, &job(3, true), &selector)
            .await
            .expect("created");
        cx.cluster
            .create_namespace("other-1", &Selector::for_job("other").labels())
            .await
            .expect("created");
        cx.cluster.state().linger_polls = 4;

        let deleted = cleanup_namespaces(&cx, &selector, None, &CancellationToken::new())
            .await
            .expect("cleaned up");
        assert_eq!(deleted, 3);
        let state = cx.cluster.state();
        assert!(state.terminating.is_empty());
        assert!(state.namespace_lists >= 4);
        assert!(state.namespaces.contains_key("other-1"));
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let cx = Context::new(FakeCluster::new());
        let selector = Selector::for_job("density");
        create_namespaces(&cx, &job(2, true), &selector)
            .await
            .expect("created");
        let cancel = CancellationToken::new();
        assert_eq!(
            cleanup_namespaces(&cx, &selector, None, &cancel)
                .await
                .expect("first cleanup"),
            2
        );
        assert_eq!(
            cleanup_namespaces(&cx, &selector, None, &cancel)
                .await
                .expect("second cleanup"),
            0
        );
    }

    #[tokio::test]
    async fn vanished_namespace_is_skipped() {
        let mut mock = MockClusterApi::new();
        let mut lists = 0;
        mock.expect_list_namespaces()
            .with(predicate::eq("kube-burner=density"))
            .times(2)
            .returning(move |_| {
                lists += 1;
                Ok(if lists == 1 {
                    vec!["density-1".to_owned(), "density-2".to_owned()]
                } else {
                    vec![]
                })
            });
        mock.expect_delete_namespace()
            .with(predicate::eq("density-1"))
            .times(1)
            .returning(|name| Err(ClusterError::NotFound(name.to_owned())));
        mock.expect_delete_namespace()
            .with(predicate::eq("density-2"))
            .times(1)
            .returning(|_| Ok(()));
        let cx = Context::new(mock);
        let deleted = cleanup_namespaces(
            &cx,
            &Selector::for_job("density"),
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("not found is tolerated");
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn delete_failure_is_fatal() {
        let cx = Context::new(FakeCluster::new());
        let selector = Selector::for_job("density");
        create_namespaces(&cx, &job(1, true), &selector)
            .await
            .expect("created");
        cx.cluster.state().fail_delete = true;
        let err = cleanup_namespaces(&cx, &selector, None, &CancellationToken::new())
            .await
            .expect_err("forbidden");
        assert!(matches!(err, Error::Cleanup { selector, .. } if selector == "kube-burner=density"));
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_wait_honours_timeout() {
        let cx = Context::new(FakeCluster::new());
        let selector = Selector::for_job("density");
        create_namespaces(&cx, &job(1, true), &selector)
            .await
            .expect("created");
        cx.cluster.state().linger_polls = usize::MAX;
        let err = cleanup_namespaces(
            &cx,
            &selector,
            Some(Duration::from_secs(10)),
            &CancellationToken::new(),
        )
        .await
        .expect_err("never finishes");
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn exists_reports_not_found_as_false() {
        let mut mock = MockClusterApi::new();
        mock.expect_get_namespace()
            .with(predicate::eq("density-1"))
            .returning(|_| Ok(Namespace::default()));
        mock.expect_get_namespace()
            .with(predicate::eq("density-2"))
            .returning(|name| Err(ClusterError::NotFound(name.to_owned())));
        let cx = Context::new(mock);
        assert!(namespace_exists(&cx, "density-1").await.expect("lookup"));
        assert!(!namespace_exists(&cx, "density-2").await.expect("lookup"));
    }
}
