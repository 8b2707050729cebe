use std::collections::BTreeMap;

/// Label key shared by every namespace a job creates.
pub const JOB_LABEL: &str = "kube-burner";

/// Label selector identifying everything created by one job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    job: String,
}

impl Selector {
    /// Selector for the job with the given name.
    pub fn for_job(job: &str) -> Self {
        Self {
            job: job.to_owned(),
        }
    }

    /// Labels to stamp on created namespaces.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from_iter([(JOB_LABEL.to_owned(), self.job.clone())])
    }

    /// Selector string for list calls, i.e. `kube-burner=<job>`.
    pub fn label_selector(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{JOB_LABEL}={}", self.job)
    }
}
