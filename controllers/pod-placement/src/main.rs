//! Pod Placement Controller
//!
//! Architecture-aware pod placement for multi-architecture clusters:
//! - Mutating webhook: gates new pods of in-scope namespaces
//! - Gated pod reconciler: probes every image of the pod, intersects the
//!   supported architectures, merges them into the node affinity and
//!   removes the gate
//! - Validating and conversion webhooks for the placement CRDs
//!
//! No pod is ever left gated: every failure path releases it unmutated.

mod affinity;
mod backoff;
mod config;
mod config_resolver;
mod config_status;
mod controller;
mod error;
mod image_policy;
mod logging;
mod metrics;
mod pod;
mod reconciler;
mod resolution;
mod server;
mod stores;
mod watcher;
mod webhook;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // The webhook listener builds its rustls config from the process default
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        return Err(ControllerError::InvalidConfig(
            "a rustls crypto provider was already installed".to_string(),
        ));
    }
    let log = logging::init();

    info!("Starting Pod Placement Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Webhook listener: {}", config.webhook_bind_addr);
    info!("  Metrics listener: {}", config.metrics_bind_addr);
    info!("  Operator namespace: {}", config.operator_namespace);
    info!(
        "  Global pull secret: {}/{}",
        config.global_pull_secret.0, config.global_pull_secret.1
    );
    info!("  Registry timeout: {:?}", config.registry_timeout);

    let controller = Controller::new(config, log).await?;
    controller.run().await?;

    Ok(())
}
