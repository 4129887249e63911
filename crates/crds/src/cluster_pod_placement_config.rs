//! ClusterPodPlacementConfig CRD (v1beta1, storage version)
//!
//! Cluster-scoped singleton named `cluster`. Its namespace selector decides
//! which namespaces take part in architecture-aware pod placement.

use crate::common::{LogVerbosity, NamespaceSelector, PlacementCondition, Plugins};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "multiarch.openshift.io",
    version = "v1beta1",
    kind = "ClusterPodPlacementConfig",
    status = "ClusterPodPlacementConfigStatus",
    shortname = "cppc"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPodPlacementConfigSpec {
    /// Log level of the placement controller
    #[serde(default)]
    pub log_verbosity: LogVerbosity,

    /// Namespaces taking part in pod placement.
    ///
    /// Defaults to the empty selector, which matches every namespace.
    /// Opt-out example: `DoesNotExist` on `multiarch.openshift.io/exclude-pod-placement`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<NamespaceSelector>,

    /// Placement plugins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Plugins>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPodPlacementConfigStatus {
    /// Latest observations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PlacementCondition>,
}

impl ClusterPodPlacementConfigSpec {
    /// Enabled scoring plugin, if any
    #[must_use]
    pub fn active_scoring(&self) -> Option<&crate::NodeAffinityScoring> {
        self.plugins.as_ref().and_then(Plugins::active_scoring)
    }
}
