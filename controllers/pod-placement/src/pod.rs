//! Pod inspection helpers shared by the admission webhook and the gated pod reconciler.

use crds::{CONTROL_PLANE_NODE_SELECTOR_LABELS, SCHEDULING_GATE_NAME};
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use std::collections::BTreeSet;

/// Explicit placement the pod author already chose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementDirective {
    /// `spec.nodeName` is set
    NodeName,
    /// `spec.nodeSelector` pins a control-plane role
    ControlPlane,
    /// `spec.nodeSelector` is set
    NodeSelector,
}

impl PlacementDirective {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NodeName => "nodeName",
            Self::ControlPlane => "control-plane nodeSelector",
            Self::NodeSelector => "nodeSelector",
        }
    }
}

/// Placement directive that takes the pod out of scope, if any
#[must_use]
pub fn placement_directive(spec: &PodSpec) -> Option<PlacementDirective> {
    if spec.node_name.as_deref().is_some_and(|n| !n.is_empty()) {
        return Some(PlacementDirective::NodeName);
    }
    let selector = spec.node_selector.as_ref().filter(|s| !s.is_empty())?;
    if CONTROL_PLANE_NODE_SELECTOR_LABELS.iter().any(|l| selector.contains_key(*l)) {
        Some(PlacementDirective::ControlPlane)
    } else {
        Some(PlacementDirective::NodeSelector)
    }
}

/// Distinct images of the init and regular containers
#[must_use]
pub fn images(spec: &PodSpec) -> BTreeSet<String> {
    spec.init_containers
        .iter()
        .flatten()
        .chain(spec.containers.iter())
        .filter_map(|c| c.image.clone())
        .filter(|image| !image.is_empty())
        .collect()
}

/// Whether the pod still carries the placement scheduling gate
#[must_use]
pub fn has_gate(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.scheduling_gates.as_ref())
        .is_some_and(|gates| gates.iter().any(|g| g.name == SCHEDULING_GATE_NAME))
}

/// Removes the placement gate; returns true when it was present
pub fn remove_gate(spec: &mut PodSpec) -> bool {
    let Some(gates) = spec.scheduling_gates.as_mut() else {
        return false;
    };
    let before = gates.len();
    gates.retain(|g| g.name != SCHEDULING_GATE_NAME);
    let removed = gates.len() != before;
    if gates.is_empty() {
        spec.scheduling_gates = None;
    }
    removed
}

/// Names of the pod's `imagePullSecrets`
#[must_use]
pub fn pull_secret_names(spec: &PodSpec) -> Vec<String> {
    spec.image_pull_secrets
        .iter()
        .flatten()
        .map(|r| r.name.clone())
        .filter(|n| !n.is_empty())
        .collect()
}

/// `namespace/name` (or `namespace/generateName*` before the name is assigned)
#[must_use]
pub fn display_name(pod: &Pod) -> String {
    let ns = pod.metadata.namespace.as_deref().unwrap_or_default();
    match (&pod.metadata.name, &pod.metadata.generate_name) {
        (Some(name), _) if !name.is_empty() => format!("{ns}/{name}"),
        (_, Some(prefix)) => format!("{ns}/{prefix}*"),
        _ => format!("{ns}/<unnamed>"),
    }
}

/// `Kind/name` of the first owner reference
#[must_use]
pub fn owner(pod: &Pod) -> Option<String> {
    pod.metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.first())
        .map(|r| format!("{}/{}", r.kind, r.name))
}
