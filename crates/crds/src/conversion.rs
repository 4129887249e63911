//! ClusterPodPlacementConfig version conversion
//!
//! Field-for-field mapping between v1alpha1 and v1beta1. The v1beta1-only
//! `plugins` stanza is parked in an annotation on the way down and restored
//! on the way up, so alpha→beta→alpha and beta→alpha→beta are both lossless.

use crate::cluster_pod_placement_config::{
    ClusterPodPlacementConfig, ClusterPodPlacementConfigSpec, ClusterPodPlacementConfigStatus,
};
use crate::common::{Plugins, V1BETA1_PLUGINS_ANNOTATION};
use crate::v1alpha1;
use thiserror::Error;

/// apiVersion string of the storage version
pub const V1BETA1: &str = "multiarch.openshift.io/v1beta1";
/// apiVersion string of the legacy version
pub const V1ALPHA1: &str = "multiarch.openshift.io/v1alpha1";

/// Errors raised while converting between versions
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Object could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// apiVersion not served by this group
    #[error("Unsupported apiVersion: {0}")]
    UnsupportedVersion(String),

    /// Object kind is not ClusterPodPlacementConfig
    #[error("Unsupported kind: {0}")]
    UnsupportedKind(String),
}

/// Converts a v1alpha1 object to the storage version.
///
/// # Errors
///
/// Fails when the parked plugins annotation holds invalid JSON.
pub fn to_v1beta1(src: v1alpha1::ClusterPodPlacementConfig) -> Result<ClusterPodPlacementConfig, ConversionError> {
    let mut metadata = src.metadata;
    let plugins = match metadata
        .annotations
        .as_mut()
        .and_then(|a| a.remove(V1BETA1_PLUGINS_ANNOTATION))
    {
        Some(raw) => Some(serde_json::from_str::<Plugins>(&raw)?),
        None => None,
    };
    if metadata.annotations.as_ref().is_some_and(std::collections::BTreeMap::is_empty) {
        metadata.annotations = None;
    }

    Ok(ClusterPodPlacementConfig {
        metadata,
        spec: ClusterPodPlacementConfigSpec {
            log_verbosity: src.spec.log_verbosity,
            namespace_selector: src.spec.namespace_selector,
            plugins,
        },
        status: src.status.map(|s| ClusterPodPlacementConfigStatus {
            conditions: s.conditions,
        }),
    })
}

/// Converts a storage-version object to v1alpha1.
///
/// # Errors
///
/// Fails when the plugins stanza cannot be serialized.
pub fn to_v1alpha1(src: ClusterPodPlacementConfig) -> Result<v1alpha1::ClusterPodPlacementConfig, ConversionError> {
    let mut metadata = src.metadata;
    if let Some(plugins) = &src.spec.plugins {
        metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(V1BETA1_PLUGINS_ANNOTATION.to_string(), serde_json::to_string(plugins)?);
    }

    Ok(v1alpha1::ClusterPodPlacementConfig {
        metadata,
        spec: v1alpha1::ClusterPodPlacementConfigSpec {
            log_verbosity: src.spec.log_verbosity,
            namespace_selector: src.spec.namespace_selector,
        },
        status: src.status.map(|s| v1alpha1::ClusterPodPlacementConfigStatus {
            conditions: s.conditions,
        }),
    })
}

/// Converts a raw object to `desired_api_version`, as a conversion webhook does.
///
/// # Errors
///
/// Fails on an unknown kind or apiVersion, or when the object does not
/// deserialize as the version it claims to be.
pub fn convert_object(
    object: serde_json::Value,
    desired_api_version: &str,
) -> Result<serde_json::Value, ConversionError> {
    let kind = object.get("kind").and_then(serde_json::Value::as_str).unwrap_or_default();
    if kind != "ClusterPodPlacementConfig" {
        return Err(ConversionError::UnsupportedKind(kind.to_string()));
    }
    let source_version = object
        .get("apiVersion")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();

    let hub = match source_version.as_str() {
        V1BETA1 => serde_json::from_value::<ClusterPodPlacementConfig>(object)?,
        V1ALPHA1 => to_v1beta1(serde_json::from_value::<v1alpha1::ClusterPodPlacementConfig>(object)?)?,
        other => return Err(ConversionError::UnsupportedVersion(other.to_string())),
    };

    match desired_api_version {
        V1BETA1 => Ok(serde_json::to_value(hub)?),
        V1ALPHA1 => Ok(serde_json::to_value(to_v1alpha1(hub)?)?),
        other => Err(ConversionError::UnsupportedVersion(other.to_string())),
    }
}
