//! Kubernetes resource watchers.
//!
//! Every watcher runs a `kube_runtime::Controller` through the generic
//! `watch_resource()` helper, which owns reconnection, retries and the
//! per-watcher concurrency limit.

use crate::config_status::{self, StatusContext};
use crate::error::ControllerError;
use crate::reconciler::{self, Context};
use crds::{ClusterPodPlacementConfig, PodPlacementConfig};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube_runtime::Controller;
use kube_runtime::controller::{Action, Config as ControllerConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Runs `controller` until its watch stream ends.
///
/// `reconcile_fn` and `error_policy` are the usual kube-runtime pair; this
/// wrapper adds the debug/error logging every watcher shares.
async fn watch_resource<K, Ctx, F, Fut, E>(
    controller: Controller<K>,
    ctx: Arc<Ctx>,
    reconcile_fn: F,
    error_policy: E,
    resource_name: &'static str,
    concurrency: u16,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    Ctx: Send + Sync + 'static,
    F: Fn(Arc<K>, Arc<Ctx>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<Action, ControllerError>> + Send + 'static,
    E: Fn(Arc<K>, &ControllerError, Arc<Ctx>) -> Action + Send + Sync + 'static,
{
    info!("Starting {} watcher", resource_name);

    let reconcile = move |obj: Arc<K>, ctx: Arc<Ctx>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            debug!("Reconciling {} {:?}", resource_name, obj.meta().name);
            reconcile_fn(obj, ctx).await
        }
    };

    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_millis(500))
        .concurrency(concurrency);

    controller
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    info!("{} watcher stopped", resource_name);
    Ok(())
}

/// Watches gated pods and the placement configuration objects.
pub struct Watcher {
    pod_controller: Controller<Pod>,
    pod_context: Arc<Context>,
    status_context: Arc<StatusContext>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

impl Watcher {
    /// `pod_controller` must already be restricted to gated pods; its store
    /// is the one held by `pod_context`.
    #[must_use]
    pub fn new(pod_controller: Controller<Pod>, pod_context: Arc<Context>, status_context: Arc<StatusContext>) -> Self {
        Self {
            pod_controller,
            pod_context,
            status_context,
        }
    }

    /// Splits into the three watch loops, each runnable on its own task.
    #[must_use]
    pub fn into_tasks(
        self,
    ) -> (
        impl Future<Output = Result<(), ControllerError>> + Send,
        impl Future<Output = Result<(), ControllerError>> + Send,
        impl Future<Output = Result<(), ControllerError>> + Send,
    ) {
        let concurrency = self.pod_context.config.reconcile_concurrency;
        let client = self.status_context.client.clone();

        let pods = watch_resource(
            self.pod_controller,
            self.pod_context,
            reconciler::reconcile,
            reconciler::error_policy,
            "Pod",
            concurrency,
        );
        let cluster_configs = watch_resource(
            Controller::new(
                kube::Api::<ClusterPodPlacementConfig>::all(client.clone()),
                kube_runtime::watcher::Config::default(),
            ),
            self.status_context.clone(),
            config_status::reconcile_cluster,
            config_status::error_policy::<ClusterPodPlacementConfig>,
            "ClusterPodPlacementConfig",
            1,
        );
        let namespaced_configs = watch_resource(
            Controller::new(
                kube::Api::<PodPlacementConfig>::all(client),
                kube_runtime::watcher::Config::default(),
            ),
            self.status_context,
            config_status::reconcile_namespaced,
            config_status::error_policy::<PodPlacementConfig>,
            "PodPlacementConfig",
            2,
        );
        (pods, cluster_configs, namespaced_configs)
    }
}
