//! Admission and conversion webhooks.
//!
//! Every handler answers from the reflector caches; nothing here talks to a
//! registry or lists from the API server.

pub mod conversion;
pub mod pod_gate;
pub mod validation;

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::stores::Stores;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use crds::{ClusterPodPlacementConfig, PodPlacementConfig};
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use k8s_openapi::api::core::v1::Pod;
use kube::Resource;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::conversion::ConversionReview;
use pod_gate::GateDecision;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const MUTATE_POD_PATH: &str = "/mutate-v1-pod";
pub const VALIDATE_CLUSTER_CONFIG_PATH: &str = "/validate-multiarch-openshift-io-v1beta1-clusterpodplacementconfig";
pub const VALIDATE_NAMESPACED_CONFIG_PATH: &str = "/validate-multiarch-openshift-io-v1beta1-podplacementconfig";
pub const CONVERT_PATH: &str = "/convert";

/// State shared by the webhook handlers
#[derive(Debug, Clone)]
pub struct WebhookState {
    pub stores: Stores,
    pub metrics: Metrics,
    pub operator_namespace: String,
}

type Review = AdmissionReview<DynamicObject>;

/// Object under review: the new one, or the old one on DELETE
fn reviewed_object<K>(request: &AdmissionRequest<DynamicObject>) -> Result<K, String>
where
    K: Resource + DeserializeOwned,
{
    request
        .object
        .as_ref()
        .or(request.old_object.as_ref())
        .ok_or_else(|| "admission request carries no object".to_string())?
        .clone()
        .try_parse()
        .map_err(|e| format!("cannot decode object: {e}"))
}

fn answer(state: &WebhookState, webhook: &str, response: AdmissionResponse) -> Json<Review> {
    state.metrics.admission_review(webhook, response.allowed);
    Json(response.into_review())
}

/// Gates new pods of in-scope namespaces.
///
/// Fails open: a pod that cannot be decoded, or arrives before the caches
/// synced, is admitted unchanged.
async fn mutate_pod(State(state): State<Arc<WebhookState>>, Json(review): Json<Review>) -> Json<Review> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => return answer(&state, "pod", AdmissionResponse::invalid(e)),
    };
    let allow = AdmissionResponse::from(&request);
    // Gates can only be added at creation
    if request.operation != Operation::Create {
        return answer(&state, "pod", allow);
    }

    let pod: Pod = match reviewed_object(&request) {
        Ok(pod) => pod,
        Err(e) => {
            warn!("Admitting undecodable pod in {:?}: {}", request.namespace, e);
            return answer(&state, "pod", allow);
        }
    };
    if !state.stores.is_ready() {
        warn!("Configuration caches not synced; admitting pod ungated");
        return answer(&state, "pod", allow);
    }

    let namespace = request
        .namespace
        .clone()
        .or_else(|| pod.metadata.namespace.clone())
        .unwrap_or_default();
    let name = pod
        .metadata
        .name
        .clone()
        .or_else(|| pod.metadata.generate_name.as_ref().map(|p| format!("{p}*")))
        .unwrap_or_default();

    let scope = state.stores.scope(&namespace, &state.operator_namespace);
    let response = match pod_gate::gate(&pod, &scope) {
        GateDecision::Skip(reason) => {
            debug!("Not gating pod {}/{}: {}", namespace, name, reason);
            allow
        }
        GateDecision::Gate(patch) => match allow.clone().with_patch(patch) {
            Ok(patched) => {
                if !request.dry_run {
                    state.metrics.pods_gated.inc();
                }
                debug!("Gating pod {}/{}", namespace, name);
                patched
            }
            Err(e) => {
                warn!("Cannot encode gate patch for {}/{}: {}", namespace, name, e);
                allow
            }
        },
    };
    answer(&state, "pod", response)
}

async fn validate_cluster_config(State(state): State<Arc<WebhookState>>, Json(review): Json<Review>) -> Json<Review> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => return answer(&state, "clusterpodplacementconfig", AdmissionResponse::invalid(e)),
    };
    let verdict = reviewed_object::<ClusterPodPlacementConfig>(&request).and_then(|config| {
        validation::validate_cluster_config(&request.operation, &config, &state.stores.namespaced_configs.state())
    });
    let response = match verdict {
        Ok(()) => AdmissionResponse::from(&request),
        Err(reason) => {
            info!("Denied ClusterPodPlacementConfig {:?}: {}", request.operation, reason);
            AdmissionResponse::from(&request).deny(reason)
        }
    };
    answer(&state, "clusterpodplacementconfig", response)
}

async fn validate_namespaced_config(State(state): State<Arc<WebhookState>>, Json(review): Json<Review>) -> Json<Review> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => return answer(&state, "podplacementconfig", AdmissionResponse::invalid(e)),
    };
    let verdict = reviewed_object::<PodPlacementConfig>(&request).and_then(|config| {
        let namespace = request
            .namespace
            .clone()
            .or_else(|| config.metadata.namespace.clone())
            .unwrap_or_default();
        let cluster = state.stores.cluster_config();
        validation::validate_namespaced_config(
            &request.operation,
            &config,
            cluster.as_deref(),
            &state.stores.namespaced_configs_in(&namespace),
        )
    });
    let response = match verdict {
        Ok(()) => AdmissionResponse::from(&request),
        Err(reason) => {
            info!(
                "Denied PodPlacementConfig {:?} in {:?}: {}",
                request.operation, request.namespace, reason
            );
            AdmissionResponse::from(&request).deny(reason)
        }
    };
    answer(&state, "podplacementconfig", response)
}

async fn convert(Json(review): Json<ConversionReview>) -> Json<ConversionReview> {
    Json(conversion::convert(review))
}

/// Routes of the webhook listener
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_POD_PATH, post(mutate_pod))
        .route(VALIDATE_CLUSTER_CONFIG_PATH, post(validate_cluster_config))
        .route(VALIDATE_NAMESPACED_CONFIG_PATH, post(validate_namespaced_config))
        .route(CONVERT_PATH, post(convert))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Loads `tls.crt` and `tls.key` from `cert_dir`; `None` when either is missing.
fn load_tls(cert_dir: &Path) -> Result<Option<Arc<ServerConfig>>, ControllerError> {
    let cert_path = cert_dir.join("tls.crt");
    let key_path = cert_dir.join("tls.key");
    if !cert_path.exists() || !key_path.exists() {
        return Ok(None);
    }

    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(&cert_path)?)).collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(&key_path)?))?
        .ok_or_else(|| ControllerError::InvalidConfig(format!("no private key in {}", key_path.display())))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ControllerError::InvalidConfig(format!("webhook certificate: {e}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Some(Arc::new(config)))
}

/// Serves the webhooks on `addr`, over TLS when certificates are mounted in `cert_dir`.
///
/// # Errors
///
/// Fails when the listener cannot bind or the certificates are unreadable.
pub async fn serve(addr: SocketAddr, cert_dir: &Path, state: Arc<WebhookState>) -> Result<(), ControllerError> {
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;

    let Some(tls) = load_tls(cert_dir)? else {
        warn!(
            "No certificates in {}; serving webhooks over plain HTTP on {}",
            cert_dir.display(),
            addr
        );
        axum::serve(listener, app).await?;
        return Ok(());
    };

    info!("Serving webhooks over TLS on {}", addr);
    let acceptor = TlsAcceptor::from(tls);
    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
            };
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), TowerToHyperService::new(app))
                .await
            {
                debug!("Webhook connection from {} failed: {}", peer, e);
            }
        });
    }
}

#[cfg(test)]
#[path = "webhook_test.rs"]
mod webhook_test;
