//! Object templates and their resolution against the cluster.
use std::{collections::BTreeMap, path::Path, sync::Arc};

use handlebars::Handlebars;
use kube::{api::DynamicObject, core::GroupVersionKind, discovery::ApiResource};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    cluster::ClusterApi,
    config::ObjectConfig,
    error::{Error, Result},
    wait::{ReadinessCheck, WaitRegistry},
};

/// Variable holding the job name.
pub const JOB_NAME_VAR: &str = "JobName";
/// Variable holding the 1-based iteration number.
pub const ITERATION_VAR: &str = "Iteration";
/// Variable holding the 1-based replica number.
pub const REPLICA_VAR: &str = "Replica";

const TEMPLATE_NAME: &str = "object";

/// Variables used to render one template.
pub type TemplateVars = Map<String, Value>;

/// A compiled object template.
#[derive(Clone)]
pub struct ObjectTemplate {
    name: String,
    registry: Handlebars<'static>,
    gvk: GroupVersionKind,
}

impl ObjectTemplate {
    /// Read and compile the template at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::Template {
            path: path.to_owned(),
            source,
        })?;
        Self::from_source(&path.display().to_string(), &source)
    }

    /// Compile a template and learn its kind by rendering it without variables.
    pub fn from_source(name: &str, source: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, source)
            .map_err(|err| Error::Render {
                name: name.to_owned(),
                message: err.to_string(),
            })?;
        let mut template = Self {
            name: name.to_owned(),
            registry,
            gvk: GroupVersionKind::gvk("", "", ""),
        };
        let object = template.render(&TemplateVars::new())?;
        template.gvk = gvk_of(name, &object)?;
        Ok(template)
    }

    /// Name the template was loaded under, usually its path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group, version and kind of the objects rendered from this template.
    pub fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }

    /// Set the replica number in `vars` and render.
    pub fn render_replica(&self, vars: &mut TemplateVars, replica: u32) -> Result<DynamicObject> {
        vars.insert(REPLICA_VAR.to_owned(), Value::from(replica));
        self.render(vars)
    }

    /// Render the template and parse the result into an object.
    ///
    /// Variables missing from `vars` render as empty strings.
    pub fn render(&self, vars: &TemplateVars) -> Result<DynamicObject> {
        let rendered = self
            .registry
            .render(TEMPLATE_NAME, vars)
            .map_err(|err| Error::Render {
                name: self.name.clone(),
                message: err.to_string(),
            })?;
        serde_yaml::from_str(&rendered).map_err(|err| Error::Parse {
            name: self.name.clone(),
            message: err.to_string(),
        })
    }
}

fn gvk_of(name: &str, object: &DynamicObject) -> Result<GroupVersionKind> {
    let types = object.types.as_ref().ok_or_else(|| Error::Parse {
        name: name.to_owned(),
        message: "missing apiVersion or kind".to_owned(),
    })?;
    if types.kind.is_empty() || types.api_version.is_empty() {
        return Err(Error::Parse {
            name: name.to_owned(),
            message: "missing apiVersion or kind".to_owned(),
        });
    }
    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

/// An object entry of a job, ready to be dispatched.
pub struct ResolvedObject {
    /// Compiled template.
    pub template: ObjectTemplate,
    /// Resource type serving the template's kind.
    pub resource: ApiResource,
    /// Objects created per iteration.
    pub replicas: u32,
    /// Readiness check for the template's kind, if it has one.
    pub check: Option<Arc<dyn ReadinessCheck>>,
    /// Variables supplied by the configuration.
    pub input_vars: BTreeMap<String, String>,
}

impl ResolvedObject {
    /// Kind of the objects created from this entry.
    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    /// Variables shared by every replica of one iteration.
    pub fn iteration_vars(&self, job: &str, iteration: u32) -> TemplateVars {
        iteration_vars(job, iteration, &self.input_vars)
    }

    /// Render the object for one replica, reusing the iteration variables.
    pub fn render_replica(&self, vars: &mut TemplateVars, replica: u32) -> Result<DynamicObject> {
        self.template.render_replica(vars, replica)
    }
}

/// Variables shared by every replica of one iteration of a job.
///
/// Input variables are applied after the reserved ones and may shadow them.
pub fn iteration_vars(
    job: &str,
    iteration: u32,
    input_vars: &BTreeMap<String, String>,
) -> TemplateVars {
    let mut vars = TemplateVars::new();
    vars.insert(JOB_NAME_VAR.to_owned(), Value::from(job));
    vars.insert(ITERATION_VAR.to_owned(), Value::from(iteration));
    for (key, value) in input_vars {
        vars.insert(key.clone(), Value::from(value.as_str()));
    }
    vars
}

/// Load, classify and discover one object entry of a job.
///
/// Entries with fewer than one replica are skipped with a warning.
pub async fn resolve_object<C>(
    cluster: &C,
    registry: &WaitRegistry,
    job: &str,
    iterations: u32,
    object: &ObjectConfig,
) -> Result<Option<ResolvedObject>>
where
    C: ClusterApi,
{
    let path = object.object_template.as_path();
    if object.replicas < 1 {
        warn!(
            job,
            template = %path.display(),
            replicas = object.replicas,
            "object template has replicas < 1, skipping"
        );
        return Ok(None);
    }
    debug!(job, template = %path.display(), "processing template");
    let template = ObjectTemplate::load(path)?;
    let gvk = template.gvk().clone();
    let resource = cluster
        .discover(&gvk)
        .await
        .map_err(|source| Error::Discovery {
            kind: gvk.kind.clone(),
            api_version: api_version(&gvk),
            source,
        })?;
    let check = registry.get(&gvk.kind);
    if check.is_none() {
        info!(job, kind = %gvk.kind, "no readiness check for kind, objects will not be waited on");
    }
    // Negative counts were filtered above.
    let replicas = object.replicas.unsigned_abs();
    info!(
        job,
        iterations,
        replicas,
        kind = %resource.kind,
        "resolved object template"
    );
    Ok(Some(ResolvedObject {
        template,
        resource,
        replicas,
        check,
        input_vars: object.input_vars.clone(),
    }))
}

fn api_version(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

/// Path of a template relative to the crate's test fixtures.
#[cfg(test)]
pub(crate) fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join("templates")
        .join(name)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kube::core::GroupVersionKind;
    use serde_json::json;

    use super::{fixture, iteration_vars, resolve_object, ObjectTemplate, TemplateVars};
    use crate::{
        cluster::{ClusterError, MockClusterApi},
        config::ObjectConfig,
        error::Error,
        utils::test::FakeCluster,
        wait::WaitRegistry,
    };

    fn entry(template: &str, replicas: i32) -> ObjectConfig {
        ObjectConfig {
            object_template: fixture(template),
            replicas,
            input_vars: BTreeMap::from_iter([(
                "image".to_owned(),
                "registry.k8s.io/pause:3.9".to_owned(),
            )]),
        }
    }

    #[test]
    fn kind_comes_from_empty_render() {
        let path = fixture("deployment.yml");
        let template = ObjectTemplate::load(&path).expect("template");
        assert_eq!(template.name(), path.display().to_string());
        assert_eq!(
            template.gvk(),
            &GroupVersionKind::gvk("apps", "v1", "Deployment")
        );
        let core = ObjectTemplate::load(&fixture("pod.yml")).expect("template");
        assert_eq!(core.gvk(), &GroupVersionKind::gvk("", "v1", "Pod"));
    }

    #[test]
    fn missing_variables_render_empty() {
        let template = ObjectTemplate::from_source(
            "inline",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm-{{Replica}}\ndata:\n  value: \"{{missing}}\"\n",
        )
        .expect("template");
        let object = template.render(&TemplateVars::new()).expect("rendered");
        assert_eq!(object.metadata.name.as_deref(), Some("cm-"));
        assert_eq!(object.data["data"]["value"], json!(""));
    }

    #[test]
    fn values_are_not_html_escaped() {
        let template = ObjectTemplate::from_source(
            "inline",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\ndata:\n  value: \"{{value}}\"\n",
        )
        .expect("template");
        let mut vars = TemplateVars::new();
        vars.insert("value".to_owned(), json!("a&b<c>"));
        let object = template.render(&vars).expect("rendered");
        assert_eq!(object.data["data"]["value"], json!("a&b<c>"));
    }

    #[test]
    fn missing_kind_is_parse_error() {
        let err = ObjectTemplate::from_source("inline", "metadata:\n  name: x\n")
            .err()
            .expect("no kind");
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn broken_template_is_render_error() {
        let err = ObjectTemplate::from_source("inline", "kind: {{#if}}\n")
            .err()
            .expect("broken");
        assert!(matches!(err, Error::Render { .. }));
    }

    #[test]
    fn missing_file_is_template_error() {
        let err = ObjectTemplate::load(&fixture("does-not-exist.yml"))
            .err()
            .expect("missing");
        assert!(matches!(err, Error::Template { .. }));
    }

    #[tokio::test]
    async fn resolves_replica_variables() {
        let cluster = FakeCluster::new();
        let resolved = resolve_object(
            &cluster,
            &WaitRegistry::default(),
            "density",
            2,
            &entry("deployment.yml", 3),
        )
        .await
        .expect("resolved")
        .expect("has replicas");
        assert_eq!(resolved.kind(), "Deployment");
        assert_eq!(resolved.resource.plural, "deployments");
        assert_eq!(resolved.replicas, 3);
        assert!(resolved.check.is_some());

        let mut vars = resolved.iteration_vars("density", 2);
        let object = resolved.render_replica(&mut vars, 3).expect("rendered");
        assert_eq!(object.metadata.name.as_deref(), Some("density-2-3"));
        assert_eq!(
            object.data["spec"]["template"]["spec"]["containers"][0]["image"],
            json!("registry.k8s.io/pause:3.9")
        );
    }

    #[tokio::test]
    async fn input_vars_shadow_reserved_names() {
        let cluster = FakeCluster::new();
        let mut config = entry("pod.yml", 1);
        config
            .input_vars
            .insert("JobName".to_owned(), "override".to_owned());
        let resolved = resolve_object(&cluster, &WaitRegistry::default(), "density", 1, &config)
            .await
            .expect("resolved")
            .expect("has replicas");
        let mut vars = resolved.iteration_vars("density", 1);
        let object = resolved.render_replica(&mut vars, 1).expect("rendered");
        assert_eq!(object.metadata.name.as_deref(), Some("override-1-1"));
    }

    #[test]
    fn iteration_vars_render_like_dispatch() {
        let template = ObjectTemplate::load(&fixture("pod.yml")).expect("template");
        let input = BTreeMap::from_iter([("Iteration".to_owned(), "x".to_owned())]);
        let mut vars = iteration_vars("density", 4, &input);
        assert_eq!(vars["JobName"], json!("density"));
        let object = template.render_replica(&mut vars, 2).expect("rendered");
        assert_eq!(object.metadata.name.as_deref(), Some("density-x-2"));
        assert_eq!(vars["Replica"], json!(2));
    }

    #[tokio::test]
    async fn unknown_kind_has_no_check() {
        let cluster = FakeCluster::new();
        let resolved = resolve_object(
            &cluster,
            &WaitRegistry::default(),
            "density",
            1,
            &entry("configmap.yml", 1),
        )
        .await
        .expect("resolved")
        .expect("has replicas");
        assert!(resolved.check.is_none());
    }

    #[tokio::test]
    async fn zero_replicas_are_skipped() {
        let mock = MockClusterApi::new();
        let resolved = resolve_object(
            &mock,
            &WaitRegistry::default(),
            "density",
            1,
            &entry("pod.yml", 0),
        )
        .await
        .expect("not an error");
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn discovery_failure_is_fatal() {
        let mut mock = MockClusterApi::new();
        mock.expect_discover()
            .times(1)
            .returning(|gvk| Err(ClusterError::Discovery(gvk.kind.clone())));
        let err = resolve_object(
            &mock,
            &WaitRegistry::default(),
            "density",
            1,
            &entry("deployment.yml", 1),
        )
        .await
        .err()
        .expect("undiscoverable");
        assert!(
            matches!(err, Error::Discovery { kind, api_version, .. } if kind == "Deployment" && api_version == "apps/v1")
        );
    }
}
