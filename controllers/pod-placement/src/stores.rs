//! Reflector caches of the placement configuration and namespaces.
//!
//! The webhooks and the reconcilers read these synchronously; none of them
//! list from the API server on the hot path.

use crate::config_resolver::{self, PlacementScope};
use crate::error::ControllerError;
use crds::{ClusterPodPlacementConfig, PodPlacementConfig, SINGLETON_NAME};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use kube_runtime::reflector::{self, ObjectRef, Store};
use kube_runtime::{WatchStreamExt, watcher};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Read handles on the reflected objects
#[derive(Clone)]
pub struct Stores {
    pub cluster_configs: Store<ClusterPodPlacementConfig>,
    pub namespaced_configs: Store<PodPlacementConfig>,
    pub namespaces: Store<Namespace>,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// Drives one reflector until the watch stream ends
fn spawn_reflector<K>(api: Api<K>, writer: reflector::store::Writer<K>, name: &'static str) -> JoinHandle<Result<(), ControllerError>>
where
    K: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone + Send + Sync,
{
    tokio::spawn(async move {
        info!("Starting {} reflector", name);
        reflector::reflector(writer, watcher(api, watcher::Config::default()))
            .default_backoff()
            .applied_objects()
            .for_each(|event| async move {
                if let Err(e) = event {
                    warn!("{} watch error: {}", name, e);
                }
            })
            .await;
        Err(ControllerError::Watch(format!("{name} reflector stopped")))
    })
}

impl Stores {
    /// Starts the reflectors; the returned handles only finish on failure.
    #[must_use]
    pub fn start(client: &Client) -> (Self, Vec<JoinHandle<Result<(), ControllerError>>>) {
        let (cluster_configs, cluster_writer) = reflector::store();
        let (namespaced_configs, namespaced_writer) = reflector::store();
        let (namespaces, namespace_writer) = reflector::store();

        let handles = vec![
            spawn_reflector(
                Api::<ClusterPodPlacementConfig>::all(client.clone()),
                cluster_writer,
                "ClusterPodPlacementConfig",
            ),
            spawn_reflector(
                Api::<PodPlacementConfig>::all(client.clone()),
                namespaced_writer,
                "PodPlacementConfig",
            ),
            spawn_reflector(Api::<Namespace>::all(client.clone()), namespace_writer, "Namespace"),
        ];

        let stores = Self::from_stores(cluster_configs, namespaced_configs, namespaces);
        (stores, handles)
    }

    /// Wraps already populated stores
    #[must_use]
    pub fn from_stores(
        cluster_configs: Store<ClusterPodPlacementConfig>,
        namespaced_configs: Store<PodPlacementConfig>,
        namespaces: Store<Namespace>,
    ) -> Self {
        Self {
            cluster_configs,
            namespaced_configs,
            namespaces,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Waits for the initial list of every reflector, then flips [`Stores::is_ready`].
    ///
    /// # Errors
    ///
    /// [`ControllerError::Watch`] when a reflector stopped before syncing.
    pub async fn wait_until_ready(&self) -> Result<(), ControllerError> {
        let dropped = |e: reflector::store::WriterDropped| ControllerError::Watch(e.to_string());
        self.cluster_configs.wait_until_ready().await.map_err(dropped)?;
        self.namespaced_configs.wait_until_ready().await.map_err(dropped)?;
        self.namespaces.wait_until_ready().await.map_err(dropped)?;
        self.mark_ready();
        info!("Configuration caches synced");
        Ok(())
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// The `cluster` singleton, if present
    #[must_use]
    pub fn cluster_config(&self) -> Option<Arc<ClusterPodPlacementConfig>> {
        self.cluster_configs.get(&ObjectRef::new(SINGLETON_NAME))
    }

    /// Every `PodPlacementConfig` of `namespace`
    #[must_use]
    pub fn namespaced_configs_in(&self, namespace: &str) -> Vec<Arc<PodPlacementConfig>> {
        self.namespaced_configs
            .state()
            .into_iter()
            .filter(|c| c.metadata.namespace.as_deref() == Some(namespace))
            .collect()
    }

    /// Labels of `namespace`; empty when it is not (yet) cached
    #[must_use]
    pub fn namespace_labels(&self, namespace: &str) -> BTreeMap<String, String> {
        self.namespaces
            .get(&ObjectRef::new(namespace))
            .and_then(|ns| ns.metadata.labels.clone())
            .unwrap_or_default()
    }

    /// Placement scope of `namespace` over the current snapshot
    #[must_use]
    pub fn scope(&self, namespace: &str, operator_namespace: &str) -> PlacementScope {
        let cluster = self.cluster_config();
        config_resolver::resolve(
            namespace,
            &self.namespace_labels(namespace),
            operator_namespace,
            cluster.as_deref(),
            &self.namespaced_configs_in(namespace),
        )
    }
}
