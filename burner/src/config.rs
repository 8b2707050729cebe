//! Job descriptions loaded from the configuration file.
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{Error, Result},
    namespaces::namespace_name,
};

/// Top level configuration file.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    /// Settings shared by every job.
    #[serde(default)]
    pub global: GlobalConfig,
    /// Jobs to run, in order.
    pub jobs: Vec<JobConfig>,
}

/// Settings shared by every job.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Kubeconfig to use when `KUBECONFIG` is not set.
    pub kubeconfig: Option<PathBuf>,
}

/// One workload-generation run.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    /// Name of the job, also used as the value of the job label.
    pub name: String,
    /// Prefix of the namespaces created by the job.
    pub namespace: String,
    /// Number of iterations.
    #[serde(default = "default_iterations")]
    pub job_iterations: u32,
    /// Create one namespace per iteration instead of a single shared one.
    #[serde(default)]
    pub namespaced_iterations: bool,
    /// Wait for created objects to become ready after each iteration.
    #[serde(default)]
    pub pod_wait: bool,
    /// Pause between iterations, in milliseconds.
    #[serde(default)]
    pub job_iteration_delay: u64,
    /// Create calls per second. Zero disables throttling.
    #[serde(default)]
    pub qps: u32,
    /// Create calls allowed in a burst. Zero means the same as `qps`.
    #[serde(default)]
    pub burst: u32,
    /// Delete the job's namespaces once the job completes.
    #[serde(default)]
    pub cleanup: bool,
    /// Upper bound for readiness and namespace deletion waits.
    /// If unset those waits block until the cluster converges.
    #[serde(default, with = "humantime_serde")]
    pub max_wait_timeout: Option<Duration>,
    /// Object templates created on each iteration.
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
}

fn default_iterations() -> u32 {
    1
}

/// One object template of a job.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ObjectConfig {
    /// Path to the object template.
    pub object_template: PathBuf,
    /// Number of objects created from the template on each iteration.
    pub replicas: i32,
    /// Variables made available to the template.
    #[serde(default)]
    pub input_vars: BTreeMap<String, String>,
}

impl ConfigSpec {
    /// Read, parse and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| Error::ConfigRead {
            path: path.to_owned(),
            source,
        })?;
        Self::from_slice(&raw)
    }

    /// Parse and validate a configuration document.
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        let config: ConfigSpec = serde_yaml::from_slice(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(Error::Config("no jobs defined".to_owned()));
        }
        let mut names = HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !names.insert(job.name.as_str()) {
                return Err(Error::Config(format!("duplicate job name {}", job.name)));
            }
        }
        Ok(())
    }
}

impl JobConfig {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("job name must not be empty".to_owned()));
        }
        if self.namespace.is_empty() {
            return Err(Error::Config(format!(
                "job {} has an empty namespace",
                self.name
            )));
        }
        if self.job_iterations < 1 {
            return Err(Error::Config(format!(
                "job {} needs at least one iteration",
                self.name
            )));
        }
        if self.objects.iter().all(|o| o.replicas < 1) {
            warn!(job = %self.name, "job does not create any objects");
        }
        Ok(())
    }

    /// Number of namespaces the job creates.
    pub fn namespace_count(&self) -> u32 {
        if self.namespaced_iterations {
            self.job_iterations
        } else {
            1
        }
    }

    /// Namespace targeted by the given iteration (1-based).
    pub fn namespace_for(&self, iteration: u32) -> String {
        let index = if self.namespaced_iterations {
            iteration
        } else {
            1
        };
        namespace_name(&self.namespace, index)
    }

    /// Pause between iterations.
    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.job_iteration_delay)
    }
}
