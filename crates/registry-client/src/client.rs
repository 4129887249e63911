//! OCI distribution implementation of [`ManifestSource`]

use crate::error::RegistryError;
use crate::policy::TlsPolicy;
use crate::resolver::Candidate;
use crate::source_trait::{ImageArchitectures, ManifestSource};
use oci_distribution::client::{Certificate, CertificateEncoding, ClientConfig, ClientProtocol};
use oci_distribution::errors::OciDistributionError;
use oci_distribution::manifest::OciManifest;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Platform placeholder used by attestation manifests inside an index
const UNKNOWN_ARCHITECTURE: &str = "unknown";

#[derive(Debug, Deserialize)]
struct ImageConfigPlatform {
    #[serde(default)]
    architecture: String,
}

/// Reads manifests from real registries
///
/// A distribution client is built per candidate, since TLS settings and
/// trust roots differ per endpoint.
#[derive(Debug, Clone, Default)]
pub struct OciManifestSource;

impl OciManifestSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn client_for(candidate: &Candidate) -> Client {
        let mut config = ClientConfig {
            protocol: ClientProtocol::Https,
            ..Default::default()
        };
        match &candidate.tls {
            TlsPolicy::Verify => {}
            TlsPolicy::Insecure => config.accept_invalid_certificates = true,
            TlsPolicy::CustomCa(pem) => config.extra_root_certificates.push(Certificate {
                encoding: CertificateEncoding::Pem,
                data: pem.as_bytes().to_vec(),
            }),
        }
        Client::new(config)
    }

    fn auth_for(candidate: &Candidate) -> RegistryAuth {
        match &candidate.credentials {
            Some(c) => RegistryAuth::Basic(c.username.clone(), c.password.clone()),
            None => RegistryAuth::Anonymous,
        }
    }
}

#[async_trait::async_trait]
impl ManifestSource for OciManifestSource {
    async fn fetch_architectures(&self, candidate: &Candidate) -> Result<ImageArchitectures, RegistryError> {
        let client = Self::client_for(candidate);
        let auth = Self::auth_for(candidate);
        let reference = candidate.reference.to_oci();

        let (manifest, digest) = client
            .pull_manifest(&reference, &auth)
            .await
            .map_err(|e| classify(candidate, e))?;

        let architectures = match manifest {
            OciManifest::ImageIndex(index) => {
                debug!("{} is an index with {} manifests", candidate.reference, index.manifests.len());
                index
                    .manifests
                    .iter()
                    .filter_map(|m| m.platform.as_ref())
                    .map(|p| p.architecture.to_string())
                    .filter(|a| !a.is_empty() && a != UNKNOWN_ARCHITECTURE)
                    .collect::<BTreeSet<_>>()
            }
            OciManifest::Image(image) => {
                let mut config_data = Vec::new();
                client
                    .pull_blob(&reference, &image.config, &mut config_data)
                    .await
                    .map_err(|e| classify(candidate, e))?;
                let config: ImageConfigPlatform =
                    serde_json::from_slice(&config_data).map_err(|e| RegistryError::ManifestInvalid {
                        image: candidate.reference.to_string(),
                        reason: format!("unreadable image config: {e}"),
                    })?;
                debug!("{} is a single manifest for {:?}", candidate.reference, config.architecture);
                std::iter::once(config.architecture)
                    .filter(|a| !a.is_empty())
                    .collect::<BTreeSet<_>>()
            }
        };

        Ok(ImageArchitectures { digest, architectures })
    }
}

/// Maps a distribution error onto the failure taxonomy.
///
/// Anything that is not a malformed manifest is treated as the endpoint
/// being unavailable, so the prober moves on to the next candidate.
fn classify(candidate: &Candidate, error: OciDistributionError) -> RegistryError {
    match error {
        OciDistributionError::ManifestParsingError(_)
        | OciDistributionError::UnsupportedMediaTypeError(_)
        | OciDistributionError::UnsupportedSchemaVersionError(_)
        | OciDistributionError::JsonError(_) => RegistryError::ManifestInvalid {
            image: candidate.reference.to_string(),
            reason: error.to_string(),
        },
        other => RegistryError::Unreachable {
            location: candidate.location(),
            reason: other.to_string(),
        },
    }
}
