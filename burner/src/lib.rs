//! Provides the job execution engine: it turns job descriptions into
//! rate-limited bursts of object creates against a Kubernetes API server.
#![warn(missing_docs)]

/// Cluster module for the slice of the Kubernetes API the engine uses.
pub mod cluster;
/// Config module for job descriptions.
pub mod config;
/// Dispatch module for creating the replicas of one template.
pub mod dispatch;
/// Error module for engine errors.
pub mod error;
/// Executor module for running jobs.
pub mod executor;
/// Kubeconfig module for locating credentials and building clients.
pub mod kubeconfig;
/// Labels module for the job selector.
pub mod labels;
/// Limiter module for throttling creates.
pub mod limiter;
/// Namespaces module for the namespace lifecycle of a job.
pub mod namespaces;
/// Template module for loading and rendering object templates.
pub mod template;
/// Utils module for shared utility functions.
pub mod utils;
/// Wait module for readiness waits.
pub mod wait;

pub use cluster::{ClusterApi, KubeCluster};
pub use config::ConfigSpec;
pub use error::{Error, Result};
pub use executor::{build_executors, Executor, JobState, JobSummary};
pub use utils::Context;
pub use wait::WaitRegistry;
