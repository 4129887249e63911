//! Read-only views of the cluster image configuration (`config.openshift.io/v1`)
//!
//! Only the fields that affect where and how image manifests are fetched are
//! modelled. These CRDs are owned by the platform; this crate never installs
//! them (see `crdgen`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the cluster-wide `Image` configuration object
pub const CLUSTER_IMAGE_CONFIG_NAME: &str = "cluster";

/// Cluster-wide image registry settings
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(group = "config.openshift.io", version = "v1", kind = "Image")]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Registry access rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_sources: Option<RegistrySources>,

    /// ConfigMap (in the trusted CA namespace) holding extra registry CAs
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "additionalTrustedCA")]
    pub additional_trusted_ca: Option<ConfigMapNameReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySources {
    /// Registries reached without TLS verification
    #[serde(default)]
    pub insecure_registries: Vec<String>,

    /// Registries that must never be contacted
    #[serde(default)]
    pub blocked_registries: Vec<String>,

    /// When non-empty, the only registries that may be contacted
    #[serde(default)]
    pub allowed_registries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct ConfigMapNameReference {
    pub name: String,
}

/// Digest-pull mirror configuration
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(group = "config.openshift.io", version = "v1", kind = "ImageDigestMirrorSet")]
#[serde(rename_all = "camelCase")]
pub struct ImageDigestMirrorSetSpec {
    #[serde(default)]
    pub image_digest_mirrors: Vec<ImageMirrors>,
}

/// Tag-pull mirror configuration
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(group = "config.openshift.io", version = "v1", kind = "ImageTagMirrorSet")]
#[serde(rename_all = "camelCase")]
pub struct ImageTagMirrorSetSpec {
    #[serde(default)]
    pub image_tag_mirrors: Vec<ImageMirrors>,
}

/// One source scope with its ordered mirrors
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageMirrors {
    /// Repository or registry scope being mirrored
    pub source: String,

    /// Mirror locations, tried in order
    #[serde(default)]
    pub mirrors: Vec<String>,

    /// Whether the source may still be contacted after the mirrors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_source_policy: Option<MirrorSourcePolicyValue>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum MirrorSourcePolicyValue {
    #[default]
    AllowContactingSource,
    NeverContactSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_spec_parses_platform_json() {
        let spec: ImageSpec = serde_json::from_value(serde_json::json!({
            "registrySources": {
                "blockedRegistries": ["quay.io/bad"],
                "insecureRegistries": ["registry.local:5000"]
            },
            "additionalTrustedCA": {"name": "registry-cas"}
        }))
        .unwrap();

        let sources = spec.registry_sources.unwrap();
        assert_eq!(sources.blocked_registries, vec!["quay.io/bad"]);
        assert!(sources.allowed_registries.is_empty());
        assert_eq!(spec.additional_trusted_ca.unwrap().name, "registry-cas");
    }

    #[test]
    fn test_mirror_policy_defaults_to_allow() {
        let spec: ImageDigestMirrorSetSpec = serde_json::from_value(serde_json::json!({
            "imageDigestMirrors": [
                {"source": "quay.io/app", "mirrors": ["mirror.local/app"]},
                {"source": "docker.io", "mirrors": [], "mirrorSourcePolicy": "NeverContactSource"}
            ]
        }))
        .unwrap();

        assert_eq!(spec.image_digest_mirrors[0].mirror_source_policy, None);
        assert_eq!(
            spec.image_digest_mirrors[1].mirror_source_policy,
            Some(MirrorSourcePolicyValue::NeverContactSource)
        );
    }
}
