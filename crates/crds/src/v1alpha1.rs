//! ClusterPodPlacementConfig v1alpha1
//!
//! Served for older clients. Carries no `plugins`; see [`crate::conversion`]
//! for how those survive a round-trip through this version.

use crate::common::{LogVerbosity, NamespaceSelector, PlacementCondition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "multiarch.openshift.io",
    version = "v1alpha1",
    kind = "ClusterPodPlacementConfig",
    status = "ClusterPodPlacementConfigStatus",
    shortname = "cppc"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPodPlacementConfigSpec {
    /// Log level of the placement controller
    #[serde(default)]
    pub log_verbosity: LogVerbosity,

    /// Namespaces taking part in pod placement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<NamespaceSelector>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPodPlacementConfigStatus {
    /// Latest observations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PlacementCondition>,
}
