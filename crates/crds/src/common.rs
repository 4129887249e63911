//! Types shared by the cluster-scoped and namespaced placement configurations.
//!
//! Also holds the well-known label, annotation and scheduling gate names the
//! webhook and the controller agree on.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// API group of the placement configuration CRDs
pub const API_GROUP: &str = "multiarch.openshift.io";

/// Name of the cluster-scoped singleton
pub const SINGLETON_NAME: &str = "cluster";

/// Node label carrying the CPU architecture
pub const ARCH_LABEL: &str = "kubernetes.io/arch";

/// Scheduling gate added to pods pending architecture resolution
pub const SCHEDULING_GATE_NAME: &str = "multiarch.openshift.io/scheduling-gate";

/// Pod label mirroring the gate state
pub const SCHEDULING_GATE_LABEL: &str = "multiarch.openshift.io/scheduling-gate";
/// Value of [`SCHEDULING_GATE_LABEL`] while the gate is present
pub const SCHEDULING_GATE_LABEL_VALUE_GATED: &str = "gated";
/// Value of [`SCHEDULING_GATE_LABEL`] once the gate was removed
pub const SCHEDULING_GATE_LABEL_VALUE_REMOVED: &str = "removed";

/// Pod label recording whether the required architecture affinity was set
pub const NODE_AFFINITY_LABEL: &str = "multiarch.openshift.io/node-affinity";
/// Pod label recording whether preferred architecture terms were set
pub const PREFERRED_NODE_AFFINITY_LABEL: &str = "multiarch.openshift.io/preferred-node-affinity";
/// Value for [`NODE_AFFINITY_LABEL`] / [`PREFERRED_NODE_AFFINITY_LABEL`]
pub const LABEL_VALUE_SET: &str = "set";
/// Value for [`NODE_AFFINITY_LABEL`] / [`PREFERRED_NODE_AFFINITY_LABEL`]
pub const LABEL_VALUE_NOT_SET: &str = "not-set";

/// Node-selector keys that pin a pod to control-plane nodes
pub const CONTROL_PLANE_NODE_SELECTOR_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Annotation used to carry v1beta1-only fields through a v1alpha1 round-trip
pub const V1BETA1_PLUGINS_ANNOTATION: &str = "multiarch.openshift.io/v1beta1-plugins";

/// Architectures accepted in configuration objects
pub const SUPPORTED_ARCHITECTURES: [&str; 4] = ["amd64", "arm64", "ppc64le", "s390x"];

/// Returns true when `arch` is one of [`SUPPORTED_ARCHITECTURES`]
#[must_use]
pub fn is_supported_architecture(arch: &str) -> bool {
    SUPPORTED_ARCHITECTURES.contains(&arch)
}

/// Log verbosity of the placement controller
///
/// Maps onto tracing filter levels: Normal=info, Debug=debug, Trace=trace,
/// TraceAll=trace for every crate (including kube and the registry stack).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum LogVerbosity {
    /// Informational messages only
    #[default]
    Normal,
    /// Adds debug output from the controller crates
    Debug,
    /// Adds trace output from the controller crates
    Trace,
    /// Trace output from every crate
    TraceAll,
}

impl LogVerbosity {
    /// tracing `EnvFilter` directive for this verbosity
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Normal => "info",
            Self::Debug => "info,pod_placement=debug,registry_client=debug,crds=debug",
            Self::Trace => "info,pod_placement=trace,registry_client=trace,crds=trace",
            Self::TraceAll => "trace",
        }
    }
}

/// Placement priority of a namespaced configuration (higher wins)
pub type Priority = u8;

/// Optional plugins tuning pod placement
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Plugins {
    /// Adds preferred (soft) node affinity terms per architecture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_affinity_scoring: Option<NodeAffinityScoring>,
}

/// Preferred-affinity scoring plugin
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeAffinityScoring {
    /// Whether the plugin is active
    #[serde(default)]
    pub enabled: bool,

    /// Weighted architecture terms
    #[serde(default)]
    pub platforms: Vec<NodeAffinityScoringPlatformTerm>,
}

/// A single `(architecture, weight)` scoring term
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeAffinityScoringPlatformTerm {
    /// Architecture value of the `kubernetes.io/arch` node label
    pub architecture: String,

    /// Scheduler weight, 1..=100
    pub weight: i32,
}

impl Plugins {
    /// Scoring plugin, only when enabled
    #[must_use]
    pub fn active_scoring(&self) -> Option<&NodeAffinityScoring> {
        self.node_affinity_scoring.as_ref().filter(|s| s.enabled)
    }

    /// Validates the plugin stanza.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason naming the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        match &self.node_affinity_scoring {
            Some(scoring) => scoring.validate(),
            None => Ok(()),
        }
    }
}

impl NodeAffinityScoring {
    /// Validates weights, architecture names and uniqueness of the terms.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason naming the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.platforms.is_empty() {
            return Err(
                "the .spec.plugins.nodeAffinityScoring.platforms list must not be empty when the plugin is enabled"
                    .to_string(),
            );
        }
        let mut seen = BTreeSet::new();
        for term in &self.platforms {
            if term.architecture.is_empty() {
                return Err("missing architecture in a .spec.plugins.nodeAffinityScoring.platforms term".to_string());
            }
            if !is_supported_architecture(&term.architecture) {
                return Err(format!(
                    "unsupported architecture {:?} in the .spec.plugins.nodeAffinityScoring.platforms list (expected one of {})",
                    term.architecture,
                    SUPPORTED_ARCHITECTURES.join(", ")
                ));
            }
            if !(1..=100).contains(&term.weight) {
                return Err(format!(
                    "weight {} for architecture {} is out of range, it must be between 1 and 100",
                    term.weight, term.architecture
                ));
            }
            if !seen.insert(term.architecture.as_str()) {
                return Err("duplicate architecture in the .spec.plugins.nodeAffinityScoring.platforms list".to_string());
            }
        }
        Ok(())
    }
}

/// Label selector over namespace labels.
///
/// Same shape as the Kubernetes `LabelSelector`; the empty selector matches
/// every namespace and all requirements are ANDed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    /// Exact key/value matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,

    /// Set-based requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
}

/// A set-based label requirement
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// Label key
    pub key: String,

    /// One of In, NotIn, Exists, DoesNotExist
    pub operator: String,

    /// Values for In / NotIn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl NamespaceSelector {
    /// Whether `labels` satisfies every requirement of the selector.
    ///
    /// Unknown operators never match, so a malformed selector fails closed.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let labels_ok = self
            .match_labels
            .iter()
            .flatten()
            .all(|(k, v)| labels.get(k) == Some(v));
        labels_ok
            && self
                .match_expressions
                .iter()
                .flatten()
                .all(|req| req.matches(labels))
    }
}

impl LabelSelectorRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let values = self.values.as_deref().unwrap_or_default();
        match self.operator.as_str() {
            "In" => labels.get(&self.key).is_some_and(|v| values.contains(v)),
            "NotIn" => labels.get(&self.key).is_none_or(|v| !values.contains(v)),
            "Exists" => labels.contains_key(&self.key),
            "DoesNotExist" => !labels.contains_key(&self.key),
            _ => false,
        }
    }
}

/// Status condition on a placement configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementCondition {
    /// Condition type, e.g. "Available"
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    /// Machine-readable reason
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status flipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// Sets `condition` in `conditions`, keeping the transition time when the status did not change.
///
/// Returns true when the list changed.
pub fn set_condition(conditions: &mut Vec<PlacementCondition>, mut condition: PlacementCondition) -> bool {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status == condition.status
            && existing.reason == condition.reason
            && existing.message == condition.message
        {
            return false;
        }
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time;
        }
        *existing = condition;
        return true;
    }
    conditions.push(condition);
    true
}
