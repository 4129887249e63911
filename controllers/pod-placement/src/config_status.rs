//! Status of the placement configuration objects
//!
//! Keeps an `Available` condition on the singleton and on every
//! `PodPlacementConfig`, and applies the singleton's log verbosity.

use crate::error::ControllerError;
use crate::logging::LogHandle;
use crate::stores::Stores;
use chrono::Utc;
use crds::{
    ClusterPodPlacementConfig, PlacementCondition, PodPlacementConfig, SINGLETON_NAME, set_condition,
};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const AVAILABLE: &str = "Available";

/// PodPlacementConfigs are re-checked periodically since the singleton may come and go
const NAMESPACED_RESYNC: Duration = Duration::from_secs(300);

/// Shared state of the status reconcilers
pub struct StatusContext {
    pub client: Client,
    pub stores: Stores,
    pub log: Arc<LogHandle>,
}

impl std::fmt::Debug for StatusContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusContext")
            .field("stores", &self.stores)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

fn condition(available: bool, reason: &str, message: String) -> PlacementCondition {
    PlacementCondition {
        type_: AVAILABLE.to_string(),
        status: if available { "True" } else { "False" }.to_string(),
        reason: reason.to_string(),
        message,
        last_transition_time: Some(Utc::now()),
    }
}

/// `Available` condition for the singleton
#[must_use]
pub fn cluster_condition(config: &ClusterPodPlacementConfig) -> PlacementCondition {
    if config.name_any() != SINGLETON_NAME {
        return condition(
            false,
            "InvalidName",
            format!("only the {SINGLETON_NAME:?} object is honoured"),
        );
    }
    match config.spec.plugins.as_ref().map(crds::Plugins::validate) {
        Some(Err(reason)) => condition(false, "InvalidPlugins", reason),
        _ => condition(true, "AsExpected", "Pod placement is configured".to_string()),
    }
}

/// `Available` condition for a namespaced configuration
#[must_use]
pub fn namespaced_condition(config: &PodPlacementConfig, cluster_present: bool) -> PlacementCondition {
    if !cluster_present {
        return condition(
            false,
            "ClusterConfigMissing",
            format!("ClusterPodPlacementConfig {SINGLETON_NAME:?} does not exist"),
        );
    }
    match config.spec.plugins.as_ref().map(crds::Plugins::validate) {
        Some(Err(reason)) => condition(false, "InvalidPlugins", reason),
        _ => condition(true, "AsExpected", format!("Active with priority {}", config.spec.priority)),
    }
}

/// Reconciles the singleton: log verbosity and status.
///
/// # Errors
///
/// Kubernetes API errors while patching status.
pub async fn reconcile_cluster(
    config: Arc<ClusterPodPlacementConfig>,
    ctx: Arc<StatusContext>,
) -> Result<Action, ControllerError> {
    let name = config.name_any();
    if config.metadata.deletion_timestamp.is_some() {
        debug!("ClusterPodPlacementConfig {} is being deleted", name);
        return Ok(Action::await_change());
    }
    if name == SINGLETON_NAME {
        ctx.log.apply(config.spec.log_verbosity);
    }

    let mut conditions = config.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
    if set_condition(&mut conditions, cluster_condition(&config)) {
        info!("Updating status of ClusterPodPlacementConfig {}", name);
        let api: Api<ClusterPodPlacementConfig> = Api::all(ctx.client.clone());
        api.patch_status(
            &name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": { "conditions": conditions } })),
        )
        .await?;
    }
    Ok(Action::await_change())
}

/// Reconciles the status of one namespaced configuration.
///
/// # Errors
///
/// Kubernetes API errors while patching status.
pub async fn reconcile_namespaced(
    config: Arc<PodPlacementConfig>,
    ctx: Arc<StatusContext>,
) -> Result<Action, ControllerError> {
    let name = config.name_any();
    let namespace = config.namespace().unwrap_or_default();
    if config.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let cluster_present = ctx.stores.cluster_config().is_some();
    let mut conditions = config.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
    if set_condition(&mut conditions, namespaced_condition(&config, cluster_present)) {
        info!("Updating status of PodPlacementConfig {}/{}", namespace, name);
        let api: Api<PodPlacementConfig> = Api::namespaced(ctx.client.clone(), &namespace);
        api.patch_status(
            &name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": { "conditions": conditions } })),
        )
        .await?;
    }
    Ok(Action::requeue(NAMESPACED_RESYNC))
}

/// Requeue policy shared by both status reconcilers
pub fn error_policy<K: kube::Resource<DynamicType = ()>>(
    object: Arc<K>,
    error: &ControllerError,
    _ctx: Arc<StatusContext>,
) -> Action {
    error!("Status reconciliation failed for {}: {}", object.name_any(), error);
    Action::requeue(Duration::from_secs(30))
}
