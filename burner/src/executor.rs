//! Drives one job from namespace setup through its iterations to cleanup.
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::future::try_join_all;
use k8s_openapi::chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cluster::ClusterApi,
    config::{ConfigSpec, JobConfig},
    dispatch::{dispatch_replicas, Target},
    error::Result,
    labels::Selector,
    limiter::RateLimiter,
    namespaces::{cleanup_namespaces, create_namespaces},
    template::{resolve_object, ResolvedObject},
    utils::{self, Clock, Context, UtcClock},
    wait::{wait_for_ready, WaitRegistry},
};

/// Where a job is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Built, not started.
    Idle,
    /// Creating the job's namespaces.
    NamespaceSetup,
    /// Creating the objects of an iteration.
    Dispatching {
        /// 1-based iteration number.
        iteration: u32,
    },
    /// Waiting for the objects of an iteration to be ready.
    PodWaiting {
        /// 1-based iteration number.
        iteration: u32,
    },
    /// Pausing after an iteration.
    Delaying {
        /// 1-based iteration number.
        iteration: u32,
    },
    /// Every iteration finished.
    Completed,
    /// Deleting the job's namespaces.
    CleaningUp,
    /// Nothing left to do.
    Done,
}

/// Outcome of a finished job.
#[derive(Clone, Debug, PartialEq)]
pub struct JobSummary {
    /// Job name.
    pub name: String,
    /// When the first iteration started.
    pub start: DateTime<Utc>,
    /// When the last object was created.
    pub end: DateTime<Utc>,
    /// Time between start and end.
    pub elapsed: Duration,
    /// Iterations run.
    pub iterations: u32,
    /// Namespaces the job used.
    pub namespaces: Vec<String>,
    /// Objects created across all iterations.
    pub objects_created: u64,
}

type Dispatches = JoinSet<Result<u64>>;

/// Runs a single job.
pub struct Executor<C, K = UtcClock> {
    cx: Arc<Context<C, K>>,
    job: JobConfig,
    selector: Selector,
    limiter: Arc<RateLimiter>,
    objects: Vec<Arc<ResolvedObject>>,
    state: JobState,
}

impl<C, K> Executor<C, K>
where
    C: ClusterApi + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    /// Resolve every object template of `job` against the cluster.
    pub async fn new(
        cx: Arc<Context<C, K>>,
        registry: &WaitRegistry,
        job: JobConfig,
    ) -> Result<Self> {
        let mut objects = Vec::with_capacity(job.objects.len());
        for object in &job.objects {
            if let Some(resolved) =
                resolve_object(&cx.cluster, registry, &job.name, job.job_iterations, object)
                    .await?
            {
                objects.push(Arc::new(resolved));
            }
        }
        Ok(Self {
            selector: Selector::for_job(&job.name),
            limiter: Arc::new(RateLimiter::new(job.qps, job.burst)),
            cx,
            job,
            objects,
            state: JobState::Idle,
        })
    }

    /// Configuration of the job.
    pub fn job(&self) -> &JobConfig {
        &self.job
    }

    /// Label selector matching the job's namespaces.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Object templates that create objects, in configuration order.
    pub fn objects(&self) -> &[Arc<ResolvedObject>] {
        &self.objects
    }

    fn transition(&mut self, state: JobState) {
        debug!(job = %self.job.name, from = ?self.state, to = ?state, "job state changed");
        self.state = state;
    }

    /// Create the job's namespaces and run every iteration.
    ///
    /// Iterations never overlap: each one starts by waiting for the creates of
    /// the previous one. The creates of the last iteration may still be in
    /// flight during its delay. The first failure ends the job.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<JobSummary> {
        self.transition(JobState::NamespaceSetup);
        let namespaces = create_namespaces(&*self.cx, &self.job, &self.selector).await?;

        let start = self.cx.clock.now();
        info!(job = %self.job.name, iterations = self.job.job_iterations, "triggering job");
        let mut in_flight: Option<Dispatches> = None;
        let mut created = 0;
        for iteration in 1..=self.job.job_iterations {
            if let Some(previous) = in_flight.take() {
                created += drain(previous).await?;
            }
            self.transition(JobState::Dispatching { iteration });
            let namespace = self.job.namespace_for(iteration);
            let dispatches = self.dispatch_iteration(&namespace, iteration, cancel);
            if self.job.pod_wait {
                created += drain(dispatches).await?;
                self.transition(JobState::PodWaiting { iteration });
                self.wait_for_iteration(&namespace, cancel).await?;
            } else {
                in_flight = Some(dispatches);
            }
            let delay = self.job.iteration_delay();
            if !delay.is_zero() {
                self.transition(JobState::Delaying { iteration });
                info!(job = %self.job.name, delay = ?delay, "sleeping before next iteration");
                utils::sleep(delay, cancel).await?;
            }
        }
        if let Some(previous) = in_flight.take() {
            created += drain(previous).await?;
        }
        let end = self.cx.clock.now();
        self.transition(JobState::Completed);

        let summary = JobSummary {
            name: self.job.name.clone(),
            start,
            end,
            elapsed: (end - start).to_std().unwrap_or_default(),
            iterations: self.job.job_iterations,
            namespaces,
            objects_created: created,
        };
        info!(
            job = %summary.name,
            elapsed = ?summary.elapsed,
            objects = summary.objects_created,
            "job finished"
        );
        Ok(summary)
    }

    /// Delete the job's namespaces if the job asks for it.
    pub async fn cleanup(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.job.cleanup {
            self.transition(JobState::CleaningUp);
            cleanup_namespaces(
                &*self.cx,
                &self.selector,
                self.job.max_wait_timeout,
                cancel,
            )
            .await?;
        }
        self.transition(JobState::Done);
        Ok(())
    }

    fn dispatch_iteration(
        &self,
        namespace: &str,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> Dispatches {
        let mut dispatches = JoinSet::new();
        for object in &self.objects {
            dispatches.spawn(dispatch_replicas(
                self.cx.clone(),
                self.limiter.clone(),
                object.clone(),
                Target {
                    job: self.job.name.clone(),
                    namespace: namespace.to_owned(),
                    iteration,
                },
                cancel.clone(),
            ));
        }
        dispatches
    }

    // Wait on each kind with a readiness check once, all kinds concurrently.
    async fn wait_for_iteration(&self, namespace: &str, cancel: &CancellationToken) -> Result<()> {
        let mut kinds = BTreeMap::new();
        for object in &self.objects {
            if let Some(check) = &object.check {
                kinds
                    .entry(object.kind())
                    .or_insert((&object.resource, check.clone()));
            }
        }
        if kinds.is_empty() {
            return Ok(());
        }
        info!(job = %self.job.name, namespace, "waiting for objects to be ready");
        try_join_all(kinds.into_values().map(|(resource, check)| async move {
            wait_for_ready(
                &*self.cx,
                resource,
                namespace,
                check.as_ref(),
                self.job.max_wait_timeout,
                cancel,
            )
            .await
        }))
        .await?;
        Ok(())
    }
}

async fn drain(mut dispatches: Dispatches) -> Result<u64> {
    let mut created = 0;
    while let Some(res) = dispatches.join_next().await {
        created += res??;
    }
    Ok(created)
}

/// Build an executor for every job of the configuration, in order.
///
/// Every template is resolved before any job runs, so a broken template or an
/// unknown kind aborts before the cluster is touched.
pub async fn build_executors<C, K>(
    cx: Arc<Context<C, K>>,
    registry: &WaitRegistry,
    config: &ConfigSpec,
) -> Result<Vec<Executor<C, K>>>
where
    C: ClusterApi + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    let mut executors = Vec::with_capacity(config.jobs.len());
    for job in &config.jobs {
        executors.push(Executor::new(cx.clone(), registry, job.clone()).await?);
    }
    Ok(executors)
}
