//! Errors produced while building and running jobs.
use std::{path::PathBuf, time::Duration};

use crate::cluster::ClusterError;

/// Result alias used across the engine.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the engine.
///
/// Every variant is fatal to the job that produced it. The only recoverable
/// cluster conditions (namespace already exists, namespace not found on delete)
/// are handled where they occur and never surface here.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum Error {
    /// The configuration is well formed but unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid YAML for a job list.
    #[error("failed to parse configuration: {source}")]
    ConfigParse {
        #[from]
        source: serde_yaml::Error,
    },
    /// The kubeconfig could not be loaded.
    #[error("failed to load kubeconfig {path}: {message}")]
    Kubeconfig { path: PathBuf, message: String },
    /// No client could be built from the kubeconfig.
    #[error("failed to build cluster client: {source}")]
    Client {
        #[from]
        source: kube::Error,
    },
    /// An object template could not be read.
    #[error("failed to read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An object template could not be compiled or rendered.
    #[error("failed to render template {name}: {message}")]
    Render { name: String, message: String },
    /// A rendered template is not a Kubernetes object.
    #[error("failed to parse rendered template {name}: {message}")]
    Parse { name: String, message: String },
    /// No resource type serves a template's kind.
    #[error("failed to discover resource type for {kind} ({api_version}): {source}")]
    Discovery {
        kind: String,
        api_version: String,
        #[source]
        source: ClusterError,
    },
    /// An object create was rejected.
    #[error("failed to create {kind} {name} in namespace {namespace}: {source}")]
    Create {
        kind: String,
        name: String,
        namespace: String,
        #[source]
        source: ClusterError,
    },
    /// A namespace could not be created or looked up.
    #[error("namespace {name}: {source}")]
    Namespace {
        name: String,
        #[source]
        source: ClusterError,
    },
    /// Namespaces could not be listed or deleted.
    #[error("cleanup of namespaces labeled {selector} failed: {source}")]
    Cleanup {
        selector: String,
        #[source]
        source: ClusterError,
    },
    /// Objects could not be listed while waiting for readiness.
    #[error("waiting for {kind} objects in {namespace} failed: {source}")]
    Wait {
        kind: String,
        namespace: String,
        #[source]
        source: ClusterError,
    },
    /// A wait ran past its deadline.
    #[error("{what} did not finish within {timeout:?}")]
    Timeout { what: String, timeout: Duration },
    /// The run was cancelled.
    #[error("cancelled")]
    Cancelled,
    /// A spawned task panicked or was aborted.
    #[error("task failed: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
}
