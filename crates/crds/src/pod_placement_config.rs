//! PodPlacementConfig CRD
//!
//! Namespaced override of the scoring plugins. Priorities are unique within a
//! namespace; the highest one wins.

use crate::common::{PlacementCondition, Plugins, Priority};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "multiarch.openshift.io",
    version = "v1beta1",
    kind = "PodPlacementConfig",
    namespaced,
    status = "PodPlacementConfigStatus",
    shortname = "ppc",
    printcolumn = r#"{"name":"Priority", "type":"integer", "jsonPath":".spec.priority"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodPlacementConfigSpec {
    /// Priority among configurations of the same namespace
    #[serde(default)]
    pub priority: Priority,

    /// Placement plugins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Plugins>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodPlacementConfigStatus {
    /// Latest observations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PlacementCondition>,
}
