//! Readiness predicates for the built-in workload kinds.
use kube::api::DynamicObject;
use serde_json::Value;

use super::ReadinessCheck;

fn int_at(object: &DynamicObject, pointer: &str) -> Option<i64> {
    object.data.pointer(pointer).and_then(Value::as_i64)
}

/// Ready once every desired replica reports ready.
///
/// Shared by the controllers that expose `spec.replicas` and
/// `status.readyReplicas`. An unset `spec.replicas` means one replica.
pub struct ReplicasReady {
    kind: &'static str,
}

impl ReplicasReady {
    /// Check for the given controller kind.
    pub fn new(kind: &'static str) -> Self {
        Self { kind }
    }
}

impl ReadinessCheck for ReplicasReady {
    fn kind(&self) -> &str {
        self.kind
    }

    fn is_ready(&self, object: &DynamicObject) -> bool {
        let desired = int_at(object, "/spec/replicas").unwrap_or(1);
        let ready = int_at(object, "/status/readyReplicas").unwrap_or(0);
        ready == desired
    }
}

/// Ready once a daemon pod runs on every node it is scheduled to.
pub struct DaemonSetReady;

impl ReadinessCheck for DaemonSetReady {
    fn kind(&self) -> &str {
        "DaemonSet"
    }

    fn is_ready(&self, object: &DynamicObject) -> bool {
        let ready = int_at(object, "/status/numberReady").unwrap_or(0);
        let desired = int_at(object, "/status/desiredNumberScheduled").unwrap_or(0);
        ready == desired
    }
}

/// Ready once the pod is running.
pub struct PodRunning;

impl ReadinessCheck for PodRunning {
    fn kind(&self) -> &str {
        "Pod"
    }

    fn is_ready(&self, object: &DynamicObject) -> bool {
        object.data.pointer("/status/phase").and_then(Value::as_str) == Some("Running")
    }
}
