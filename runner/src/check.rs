use anyhow::{Context as _, Result};
use kube_burner::{
    namespaces::{namespace_exists, namespace_name},
    template::{iteration_vars, ObjectTemplate},
    WaitRegistry,
};
use tracing::{info, warn};

use crate::utils::{connect, Opts};

/// Validate the configuration and its templates, then report job namespaces
/// already present in the cluster.
#[tracing::instrument(skip_all, fields(config = %opts.config.display()))]
pub async fn check(opts: Opts) -> Result<()> {
    let config = opts.load()?;
    let registry = WaitRegistry::default();
    for job in &config.jobs {
        for object in &job.objects {
            let path = &object.object_template;
            if object.replicas < 1 {
                warn!(job = %job.name, template = %path.display(), "replicas < 1, template is skipped");
                continue;
            }
            let template = ObjectTemplate::load(path)?;
            let mut vars = iteration_vars(&job.name, 1, &object.input_vars);
            template
                .render_replica(&mut vars, 1)
                .with_context(|| format!("rendering {} for job {}", template.name(), job.name))?;
            let gvk = template.gvk();
            info!(
                job = %job.name,
                template = template.name(),
                kind = %gvk.kind,
                replicas = object.replicas,
                readiness_check = registry.get(&gvk.kind).is_some(),
                "template ok"
            );
        }
    }

    let cx = connect(&config).await?;
    let mut leftovers = 0;
    for job in &config.jobs {
        for index in 1..=job.namespace_count() {
            let name = namespace_name(&job.namespace, index);
            if namespace_exists(&*cx, &name).await? {
                warn!(job = %job.name, namespace = %name, "namespace already exists");
                leftovers += 1;
            }
        }
    }
    info!(jobs = config.jobs.len(), leftovers, "check finished");
    Ok(())
}
