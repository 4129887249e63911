//! Validating webhooks for the placement configuration objects.
//!
//! Checks run against the reflector snapshot, so a denial reflects what the
//! controller itself will act on.

use crds::{ClusterPodPlacementConfig, PodPlacementConfig, SINGLETON_NAME};
use kube::ResourceExt;
use kube::core::admission::Operation;
use std::sync::Arc;

/// Validates a ClusterPodPlacementConfig admission.
///
/// `object` is the new object on create/update, the old one on delete.
///
/// # Errors
///
/// The denial reason shown to the user.
pub fn validate_cluster_config(
    operation: &Operation,
    object: &ClusterPodPlacementConfig,
    namespaced_configs: &[Arc<PodPlacementConfig>],
) -> Result<(), String> {
    match operation {
        Operation::Create | Operation::Update => {
            if object.name_any() != SINGLETON_NAME {
                return Err(format!(
                    "the ClusterPodPlacementConfig must be named {SINGLETON_NAME:?}, got {:?}",
                    object.name_any()
                ));
            }
            match object.spec.plugins.as_ref() {
                Some(plugins) => plugins.validate(),
                None => Ok(()),
            }
        }
        Operation::Delete => match namespaced_configs.first() {
            Some(dependent) => Err(format!(
                "cannot delete the ClusterPodPlacementConfig while {} PodPlacementConfig(s) exist, e.g. {}/{}",
                namespaced_configs.len(),
                dependent.namespace().unwrap_or_default(),
                dependent.name_any()
            )),
            None => Ok(()),
        },
        Operation::Connect => Ok(()),
    }
}

/// Validates a PodPlacementConfig admission against its namespace siblings.
///
/// # Errors
///
/// The denial reason shown to the user.
pub fn validate_namespaced_config(
    operation: &Operation,
    object: &PodPlacementConfig,
    cluster: Option<&ClusterPodPlacementConfig>,
    siblings: &[Arc<PodPlacementConfig>],
) -> Result<(), String> {
    if matches!(operation, Operation::Delete | Operation::Connect) {
        return Ok(());
    }
    if *operation == Operation::Create {
        match cluster {
            None => {
                return Err(format!(
                    "a ClusterPodPlacementConfig named {SINGLETON_NAME:?} must exist before creating a PodPlacementConfig"
                ));
            }
            Some(c) if c.metadata.deletion_timestamp.is_some() => {
                return Err(format!(
                    "the ClusterPodPlacementConfig {SINGLETON_NAME:?} is being deleted"
                ));
            }
            Some(_) => {}
        }
    }

    let name = object.name_any();
    if let Some(holder) = siblings
        .iter()
        .find(|s| s.name_any() != name && s.spec.priority == object.spec.priority)
    {
        return Err(format!(
            "priority {} is already used by PodPlacementConfig {:?} in namespace {:?}",
            object.spec.priority,
            holder.name_any(),
            object.namespace().unwrap_or_default()
        ));
    }

    match object.spec.plugins.as_ref() {
        Some(plugins) => plugins.validate(),
        None => Ok(()),
    }
}
