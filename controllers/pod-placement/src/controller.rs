//! Main controller implementation.
//!
//! Wires the caches, the webhook listener, the probe listener and the
//! reconcilers together, and runs until one of them stops.

use crate::config::ControllerConfig;
use crate::config_status::StatusContext;
use crate::error::ControllerError;
use crate::image_policy::PolicySource;
use crate::logging::LogHandle;
use crate::metrics::Metrics;
use crate::reconciler::Context;
use crate::server::{self, ProbeState};
use crate::stores::Stores;
use crate::watcher::Watcher;
use crate::webhook::{self, WebhookState};
use crds::{SCHEDULING_GATE_LABEL, SCHEDULING_GATE_LABEL_VALUE_GATED};
use futures::future::select_all;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use kube_runtime::events::{Recorder, Reporter};
use kube_runtime::watcher;
use registry_client::{ArchitectureProber, OciManifestSource, ProberConfig};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

const CONTROLLER_NAME: &str = "pod-placement";

/// Main controller for architecture-aware pod placement.
#[derive(Debug)]
pub struct Controller {
    reflectors: JoinHandle<Result<(), ControllerError>>,
    webhook_server: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
    pod_watcher: JoinHandle<Result<(), ControllerError>>,
    cluster_config_watcher: JoinHandle<Result<(), ControllerError>>,
    namespaced_config_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts every task.
    ///
    /// # Errors
    ///
    /// Fails when no Kubernetes client can be built or metrics cannot be registered.
    pub async fn new(config: ControllerConfig, log: LogHandle) -> Result<Self, ControllerError> {
        info!("Initializing pod placement controller");

        let client = Client::try_default().await?;
        let metrics = Metrics::new()?;

        let (stores, reflector_handles) = Stores::start(&client);
        let reflectors = tokio::spawn(async move {
            let (result, _, _) = select_all(reflector_handles).await;
            result.unwrap_or_else(|e| Err(ControllerError::Watch(format!("reflector panicked: {e}"))))
        });
        {
            let stores = stores.clone();
            tokio::spawn(async move {
                if let Err(e) = stores.wait_until_ready().await {
                    error!("Configuration caches never synced: {}", e);
                }
            });
        }

        let webhook_server = {
            let state = Arc::new(WebhookState {
                stores: stores.clone(),
                metrics: metrics.clone(),
                operator_namespace: config.operator_namespace.clone(),
            });
            let addr = config.webhook_bind_addr;
            let cert_dir = config.webhook_cert_dir.clone();
            tokio::spawn(async move { webhook::serve(addr, &cert_dir, state).await })
        };

        let probe_server = {
            let state = Arc::new(ProbeState {
                stores: stores.clone(),
                metrics: metrics.clone(),
            });
            let addr = config.metrics_bind_addr;
            tokio::spawn(async move { server::serve(addr, state).await })
        };

        // Only gated pods reach the reconciler
        let pod_controller = kube_runtime::Controller::new(
            Api::<Pod>::all(client.clone()),
            watcher::Config::default().labels(&format!("{SCHEDULING_GATE_LABEL}={SCHEDULING_GATE_LABEL_VALUE_GATED}")),
        );
        let pods = pod_controller.store();

        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);

        let prober = ArchitectureProber::new(
            OciManifestSource::new(),
            ProberConfig {
                timeout: config.registry_timeout,
                max_candidates: config.max_candidates_per_image,
                cache_ttl: config.arch_cache_ttl,
            },
        );
        let policy_source = PolicySource::new(
            client.clone(),
            config.trusted_ca_namespace.clone(),
            config.global_pull_secret.clone(),
        );

        let pod_context = Arc::new(Context::new(
            client.clone(),
            stores.clone(),
            pods,
            policy_source,
            prober,
            metrics,
            recorder,
            config,
        ));
        let status_context = Arc::new(StatusContext {
            client,
            stores,
            log: Arc::new(log),
        });

        let (pods_task, cluster_task, namespaced_task) =
            Watcher::new(pod_controller, pod_context, status_context).into_tasks();
        let pod_watcher = tokio::spawn(pods_task);
        let cluster_config_watcher = tokio::spawn(cluster_task);
        let namespaced_config_watcher = tokio::spawn(namespaced_task);

        Ok(Self {
            reflectors,
            webhook_server,
            probe_server,
            pod_watcher,
            cluster_config_watcher,
            namespaced_config_watcher,
        })
    }

    /// Runs the controller until shutdown.
    ///
    /// # Errors
    ///
    /// Returns the error of the first task that stops.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Pod placement controller running");

        // Watchers stop on SIGTERM; everything else only ends on failure
        tokio::select! {
            result = &mut self.reflectors => {
                result.map_err(|e| ControllerError::Watch(format!("Reflectors panicked: {e}")))??;
            }
            result = &mut self.webhook_server => {
                result.map_err(|e| ControllerError::Watch(format!("Webhook server panicked: {e}")))??;
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {e}")))??;
            }
            result = &mut self.pod_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Pod watcher panicked: {e}")))??;
            }
            result = &mut self.cluster_config_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("ClusterPodPlacementConfig watcher panicked: {e}")))??;
            }
            result = &mut self.namespaced_config_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("PodPlacementConfig watcher panicked: {e}")))??;
            }
        }

        info!("Pod placement controller stopped");
        Ok(())
    }
}
