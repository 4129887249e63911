//! Mutating pod webhook: first phase of the gate-then-patch protocol.
//!
//! Adds the placement scheduling gate and the `gated` label at creation.
//! Gates cannot be added after a pod exists, so this has to happen here.
//! No registry I/O happens on this path.

use crate::config_resolver::PlacementScope;
use crate::pod::{has_gate, images, placement_directive};
use crds::{SCHEDULING_GATE_LABEL, SCHEDULING_GATE_LABEL_VALUE_GATED, SCHEDULING_GATE_NAME};
use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation};
use k8s_openapi::api::core::v1::Pod;
use serde_json::{Value, json};

/// Outcome of the admission check for one pod
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Patch adding the gate and label
    Gate(Patch),
    /// Admitted unchanged
    Skip(String),
}

/// Decides whether `pod` gets the scheduling gate under `scope`.
#[must_use]
pub fn gate(pod: &Pod, scope: &PlacementScope) -> GateDecision {
    if let PlacementScope::Disabled(reason) = scope {
        return GateDecision::Skip(format!("placement disabled: {reason:?}"));
    }
    let Some(spec) = pod.spec.as_ref() else {
        return GateDecision::Skip("pod has no spec".to_string());
    };
    if let Some(directive) = placement_directive(spec) {
        return GateDecision::Skip(format!("pod sets {}", directive.as_str()));
    }
    if has_gate(pod) {
        return GateDecision::Skip("pod is already gated".to_string());
    }
    if images(spec).is_empty() {
        return GateDecision::Skip("pod references no image".to_string());
    }

    let gate = json!({ "name": SCHEDULING_GATE_NAME });
    let mut operations = Vec::with_capacity(2);
    if spec.scheduling_gates.as_ref().is_some_and(|g| !g.is_empty()) {
        operations.push(add(&["spec", "schedulingGates", "-"], gate));
    } else {
        operations.push(add(&["spec", "schedulingGates"], json!([gate])));
    }

    if pod.metadata.labels.is_some() {
        operations.push(add(
            &["metadata", "labels", SCHEDULING_GATE_LABEL],
            json!(SCHEDULING_GATE_LABEL_VALUE_GATED),
        ));
    } else {
        operations.push(add(
            &["metadata", "labels"],
            json!({ SCHEDULING_GATE_LABEL: SCHEDULING_GATE_LABEL_VALUE_GATED }),
        ));
    }
    GateDecision::Gate(Patch(operations))
}

fn add(tokens: &[&str], value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(tokens.iter().copied()),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_resolver::DisabledReason;
    use crate::test_utils::pod_with_images;
    use k8s_openapi::api::core::v1::PodSchedulingGate;
    use std::collections::BTreeMap;

    fn in_scope() -> PlacementScope {
        PlacementScope::Enabled {
            scoring: None,
            source: None,
        }
    }

    /// `(path, value)` of every add operation
    fn ops(decision: GateDecision) -> Vec<(String, Value)> {
        match decision {
            GateDecision::Gate(Patch(ops)) => ops
                .into_iter()
                .map(|op| match op {
                    PatchOperation::Add(AddOperation { path, value }) => (path.to_string(), value),
                    other => panic!("unexpected operation {other:?}"),
                })
                .collect(),
            GateDecision::Skip(why) => panic!("expected a gate, skipped: {why}"),
        }
    }

    #[test]
    fn test_gate_added_with_label() {
        let mut pod = pod_with_images("app", "web", &["quay.io/a:1"]);
        pod.metadata.labels = None;

        let operations = ops(gate(&pod, &in_scope()));
        assert_eq!(operations.len(), 2);
        assert_eq!(operations[0].0, "/spec/schedulingGates");
        assert_eq!(operations[0].1, json!([{ "name": SCHEDULING_GATE_NAME }]));
        assert_eq!(operations[1].0, "/metadata/labels");
        assert_eq!(operations[1].1, json!({ "multiarch.openshift.io/scheduling-gate": "gated" }));
    }

    #[test]
    fn test_gate_appended_to_existing_gates_and_labels() {
        let mut pod = pod_with_images("app", "web", &["quay.io/a:1"]);
        pod.metadata.labels = Some(BTreeMap::from([("app".to_string(), "web".to_string())]));
        pod.spec.as_mut().unwrap().scheduling_gates = Some(vec![PodSchedulingGate {
            name: "example.com/other".to_string(),
        }]);

        let operations = ops(gate(&pod, &in_scope()));
        assert_eq!(operations[0].0, "/spec/schedulingGates/-");
        // the label key's slash is escaped as a pointer token
        assert_eq!(operations[1].0, "/metadata/labels/multiarch.openshift.io~1scheduling-gate");
    }

    #[test]
    fn test_out_of_scope_is_untouched() {
        let pod = pod_with_images("app", "web", &["quay.io/a:1"]);
        assert!(matches!(
            gate(&pod, &PlacementScope::Disabled(DisabledReason::NamespaceNotSelected)),
            GateDecision::Skip(_)
        ));
    }

    #[test]
    fn test_explicit_placement_is_untouched() {
        let mut pod = pod_with_images("app", "web", &["quay.io/a:1"]);
        pod.spec.as_mut().unwrap().node_selector =
            Some(BTreeMap::from([("node-role.kubernetes.io/control-plane".to_string(), String::new())]));
        assert!(matches!(gate(&pod, &in_scope()), GateDecision::Skip(ref why) if why.contains("control-plane")));

        let mut pinned = pod_with_images("app", "web", &["quay.io/a:1"]);
        pinned.spec.as_mut().unwrap().node_name = Some("worker-0".to_string());
        assert!(matches!(gate(&pinned, &in_scope()), GateDecision::Skip(_)));
    }
}
