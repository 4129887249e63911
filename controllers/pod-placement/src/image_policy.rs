//! Cluster image policy and pull secrets
//!
//! Re-read from the API server for every pod resolution; nothing here is
//! cached. Missing objects (including platforms without the
//! `config.openshift.io` types) mean an empty policy.

use crate::error::ControllerError;
use crds::{CLUSTER_IMAGE_CONFIG_NAME, Image, ImageDigestMirrorSet, ImageMirrors, ImageTagMirrorSet, MirrorSourcePolicyValue};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::ListParams;
use kube::{Api, Client};
use registry_client::{MirrorRule, MirrorSourcePolicy, PullSecrets, RegistryPolicy};
use tracing::{debug, warn};

const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";
const DOCKER_CFG_KEY: &str = ".dockercfg";

/// Builds the registry policy snapshot from the cluster image configuration.
#[must_use]
pub fn registry_policy(
    image: Option<&Image>,
    digest_mirror_sets: &[ImageDigestMirrorSet],
    tag_mirror_sets: &[ImageTagMirrorSet],
    trusted_cas: Option<&ConfigMap>,
) -> RegistryPolicy {
    let mut policy = RegistryPolicy::default();

    if let Some(sources) = image.and_then(|i| i.spec.registry_sources.as_ref()) {
        policy.insecure.clone_from(&sources.insecure_registries);
        policy.blocked.clone_from(&sources.blocked_registries);
        policy.allowed.clone_from(&sources.allowed_registries);
    }

    policy.digest_mirrors = digest_mirror_sets
        .iter()
        .flat_map(|set| set.spec.image_digest_mirrors.iter())
        .map(mirror_rule)
        .collect();
    policy.tag_mirrors = tag_mirror_sets
        .iter()
        .flat_map(|set| set.spec.image_tag_mirrors.iter())
        .map(mirror_rule)
        .collect();

    for (key, pem) in trusted_cas.and_then(|cm| cm.data.as_ref()).into_iter().flatten() {
        policy.add_trusted_ca(key, pem.clone());
    }
    policy
}

fn mirror_rule(mirrors: &ImageMirrors) -> MirrorRule {
    MirrorRule {
        source: mirrors.source.clone(),
        mirrors: mirrors.mirrors.clone(),
        source_policy: match mirrors.mirror_source_policy.unwrap_or_default() {
            MirrorSourcePolicyValue::AllowContactingSource => MirrorSourcePolicy::AllowContactingSource,
            MirrorSourcePolicyValue::NeverContactSource => MirrorSourcePolicy::NeverContactSource,
        },
    }
}

/// Merges pull secrets, earlier secrets taking precedence on identical registry keys.
///
/// Secrets that hold neither `.dockerconfigjson` nor `.dockercfg`, or hold
/// an unparseable payload, are skipped.
#[must_use]
pub fn pull_secrets<'a>(secrets: impl IntoIterator<Item = &'a Secret>) -> PullSecrets {
    let mut merged = PullSecrets::default();
    for secret in secrets {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        let Some(data) = secret.data.as_ref() else {
            continue;
        };
        let parsed = if let Some(raw) = data.get(DOCKER_CONFIG_JSON_KEY) {
            PullSecrets::from_docker_config_json(&raw.0)
        } else if let Some(raw) = data.get(DOCKER_CFG_KEY) {
            PullSecrets::from_docker_cfg(&raw.0)
        } else {
            debug!("Secret {} holds no registry credentials", name);
            continue;
        };
        match parsed {
            Ok(entries) => merged.merge_lower_priority(entries),
            Err(e) => warn!("Ignoring pull secret {}: {}", name, e),
        }
    }
    merged
}

/// Reads the image policy objects and pull secrets from the API server
#[derive(Clone)]
pub struct PolicySource {
    client: Client,
    trusted_ca_namespace: String,
    global_pull_secret: (String, String),
}

impl std::fmt::Debug for PolicySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicySource")
            .field("trusted_ca_namespace", &self.trusted_ca_namespace)
            .field("global_pull_secret", &self.global_pull_secret)
            .finish_non_exhaustive()
    }
}

impl PolicySource {
    #[must_use]
    pub fn new(client: Client, trusted_ca_namespace: String, global_pull_secret: (String, String)) -> Self {
        Self {
            client,
            trusted_ca_namespace,
            global_pull_secret,
        }
    }

    /// Current registry policy.
    ///
    /// # Errors
    ///
    /// Kubernetes API failures other than "not found".
    pub async fn registry_policy(&self) -> Result<RegistryPolicy, ControllerError> {
        let images: Api<Image> = Api::all(self.client.clone());
        let image = images.get_opt(CLUSTER_IMAGE_CONFIG_NAME).await.or_else(not_found)?;

        let idms: Api<ImageDigestMirrorSet> = Api::all(self.client.clone());
        let digest_sets = match idms.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(e) => not_found(e)?.unwrap_or_default(),
        };
        let itms: Api<ImageTagMirrorSet> = Api::all(self.client.clone());
        let tag_sets = match itms.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(e) => not_found(e)?.unwrap_or_default(),
        };

        let trusted_cas = match image.as_ref().and_then(|i| i.spec.additional_trusted_ca.as_ref()) {
            Some(reference) if !reference.name.is_empty() => {
                let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.trusted_ca_namespace);
                config_maps.get_opt(&reference.name).await?
            }
            _ => None,
        };

        Ok(registry_policy(image.as_ref(), &digest_sets, &tag_sets, trusted_cas.as_ref()))
    }

    /// Pod pull secrets merged over the cluster-wide pull secret.
    ///
    /// # Errors
    ///
    /// Kubernetes API failures other than "not found".
    pub async fn pull_secrets(&self, namespace: &str, names: &[String]) -> Result<PullSecrets, ControllerError> {
        let namespaced: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let mut secrets = Vec::with_capacity(names.len() + 1);
        for name in names {
            match namespaced.get_opt(name).await? {
                Some(secret) => secrets.push(secret),
                None => debug!("Pull secret {}/{} not found", namespace, name),
            }
        }

        let (global_ns, global_name) = &self.global_pull_secret;
        let global: Api<Secret> = Api::namespaced(self.client.clone(), global_ns);
        match global.get_opt(global_name).await {
            Ok(Some(secret)) => secrets.push(secret),
            Ok(None) => debug!("Global pull secret {}/{} not found", global_ns, global_name),
            Err(e) => warn!("Cannot read global pull secret {}/{}: {}", global_ns, global_name, e),
        }

        Ok(pull_secrets(&secrets))
    }
}

/// Maps a 404 (object or whole resource type missing) to `None`
fn not_found<T>(error: kube::Error) -> Result<Option<T>, ControllerError> {
    match error {
        kube::Error::Api(response) if response.code == 404 => Ok(None),
        other => Err(other.into()),
    }
}
