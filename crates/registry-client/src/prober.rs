//! Image Architecture Prober
//!
//! Walks the resolver's candidate list until one endpoint answers. Network
//! failures advance to the next candidate; policy and manifest failures stop
//! the walk for that image.

use crate::cache::{ArchitectureCache, ResolvedArchitectures};
use crate::credentials::PullSecrets;
use crate::error::RegistryError;
use crate::policy::RegistryPolicy;
use crate::reference::ImageReference;
use crate::resolver::{Candidate, resolve};
use crate::source_trait::ManifestSource;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Limits applied to every probe
#[derive(Debug, Clone, Copy)]
pub struct ProberConfig {
    /// Budget for a single endpoint call
    pub timeout: Duration,
    /// Upper bound on endpoints tried per image
    pub max_candidates: usize,
    /// Lifetime of cached results
    pub cache_ttl: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_candidates: 8,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Resolves and probes images, sharing one cache across callers
pub struct ArchitectureProber {
    source: Arc<dyn ManifestSource>,
    cache: ArchitectureCache,
    config: ProberConfig,
}

impl std::fmt::Debug for ArchitectureProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchitectureProber")
            .field("cache_entries", &self.cache.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ArchitectureProber {
    pub fn new(source: impl ManifestSource + 'static, config: ProberConfig) -> Self {
        Self {
            source: Arc::new(source),
            cache: ArchitectureCache::new(config.cache_ttl),
            config,
        }
    }

    /// Resolves `image` under `policy`/`secrets` and probes the candidates.
    ///
    /// The blocked/allowed lists are applied on every call, cache hit or not.
    ///
    /// # Errors
    ///
    /// See [`ArchitectureProber::probe`]; resolution errors are returned as is.
    pub async fn probe_image(
        &self,
        image: &str,
        policy: &RegistryPolicy,
        secrets: &PullSecrets,
    ) -> Result<ResolvedArchitectures, RegistryError> {
        let reference = ImageReference::parse(image)?;
        let candidates = resolve(&reference, policy, secrets)?;
        self.probe(image, &candidates).await
    }

    /// Probes `candidates` in order.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PolicyDenied`] / [`RegistryError::ManifestInvalid`]
    ///   as soon as a candidate reports one.
    /// - [`RegistryError::ManifestInvalid`] when the answering manifest names
    ///   no architecture at all.
    /// - The last transient error once every candidate (up to
    ///   `max_candidates`) was unreachable or timed out.
    pub async fn probe(&self, image: &str, candidates: &[Candidate]) -> Result<ResolvedArchitectures, RegistryError> {
        let fingerprint = ArchitectureCache::fingerprint(candidates);
        if let Some(hit) = self.cache.get(image, fingerprint) {
            debug!("Architecture cache hit for {}: {:?}", image, hit.architectures);
            return Ok(hit);
        }

        let mut last_error = None;
        for candidate in candidates.iter().take(self.config.max_candidates) {
            let location = candidate.location();
            let outcome = tokio::time::timeout(self.config.timeout, self.source.fetch_architectures(candidate)).await;

            let fetched = match outcome {
                Err(_elapsed) => {
                    warn!("Timed out probing {} at {}", image, location);
                    last_error = Some(RegistryError::Timeout {
                        location,
                        seconds: self.config.timeout.as_secs(),
                    });
                    continue;
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!("Candidate {} unavailable for {}: {}", location, image, e);
                    last_error = Some(e);
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(fetched)) => fetched,
            };

            if fetched.architectures.is_empty() {
                return Err(RegistryError::ManifestInvalid {
                    image: image.to_string(),
                    reason: format!("manifest at {location} declares no architecture"),
                });
            }

            debug!("Probed {} at {}: {:?}", image, location, fetched.architectures);
            let resolved = ResolvedArchitectures {
                endpoint: location,
                digest: fetched.digest,
                architectures: fetched.architectures,
            };
            self.cache.insert(image, fingerprint, resolved.clone());
            return Ok(resolved);
        }

        Err(last_error.unwrap_or_else(|| RegistryError::Unreachable {
            location: image.to_string(),
            reason: "no candidate endpoint".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeFailure;
    use crate::mock::{MockManifestSource, MockResponse};
    use crate::policy::{MirrorRule, MirrorSourcePolicy};

    const DIGEST: &str = "sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn mirrored_policy() -> RegistryPolicy {
        RegistryPolicy {
            digest_mirrors: vec![MirrorRule {
                source: "quay.io/team".to_string(),
                mirrors: vec!["mirror-a.local/team".to_string(), "mirror-b.local/team".to_string()],
                source_policy: MirrorSourcePolicy::AllowContactingSource,
            }],
            ..Default::default()
        }
    }

    fn image() -> String {
        format!("quay.io/team/app@{DIGEST}")
    }

    fn prober(source: MockManifestSource) -> ArchitectureProber {
        ArchitectureProber::new(
            source,
            ProberConfig {
                timeout: Duration::from_millis(50),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_unreachable_mirror_falls_through() {
        let source = MockManifestSource::new()
            .with_response("mirror-a.local/team/app", MockResponse::Unreachable)
            .with_architectures("mirror-b.local/team/app", &["amd64", "arm64"]);
        let prober = prober(source.clone());

        let resolved = prober
            .probe_image(&image(), &mirrored_policy(), &PullSecrets::default())
            .await
            .unwrap();

        assert_eq!(resolved.endpoint, "mirror-b.local/team/app");
        assert_eq!(resolved.architectures.len(), 2);
        assert_eq!(source.calls(), vec!["mirror-a.local/team/app", "mirror-b.local/team/app"]);
    }

    #[tokio::test]
    async fn test_timeout_advances_to_next_candidate() {
        let source = MockManifestSource::new()
            .with_response("mirror-a.local/team/app", MockResponse::Hang)
            .with_response("mirror-b.local/team/app", MockResponse::Unreachable)
            .with_architectures("quay.io/team/app", &["s390x"]);
        let resolved = prober(source)
            .probe_image(&image(), &mirrored_policy(), &PullSecrets::default())
            .await
            .unwrap();
        assert_eq!(resolved.endpoint, "quay.io/team/app");
    }

    #[tokio::test]
    async fn test_manifest_invalid_stops_the_walk() {
        let source = MockManifestSource::new()
            .with_response("mirror-a.local/team/app", MockResponse::ManifestInvalid)
            .with_architectures("mirror-b.local/team/app", &["amd64"]);
        let prober = prober(source.clone());

        let err = prober
            .probe_image(&image(), &mirrored_policy(), &PullSecrets::default())
            .await
            .unwrap_err();
        assert_eq!(err.failure(), ProbeFailure::ManifestInvalid);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_all_unreachable_is_transient() {
        let err = prober(MockManifestSource::new())
            .probe_image(&image(), &mirrored_policy(), &PullSecrets::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_architecture_set_is_manifest_invalid() {
        let source = MockManifestSource::new().with_architectures("quay.io/team/app", &[]);
        let err = prober(source)
            .probe_image(&image(), &RegistryPolicy::default(), &PullSecrets::default())
            .await
            .unwrap_err();
        assert_eq!(err.failure(), ProbeFailure::ManifestInvalid);
    }

    #[tokio::test]
    async fn test_blocked_registry_never_fetches() {
        let source = MockManifestSource::new().with_architectures("quay.io/team/app", &["amd64"]);
        let policy = RegistryPolicy {
            blocked: vec!["quay.io".to_string()],
            ..Default::default()
        };
        let err = prober(source.clone())
            .probe_image(&image(), &policy, &PullSecrets::default())
            .await
            .unwrap_err();
        assert_eq!(err.failure(), ProbeFailure::PolicyDenied);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_and_policy_change_invalidation() {
        let source = MockManifestSource::new()
            .with_architectures("quay.io/team/app", &["amd64"])
            .with_architectures("mirror-a.local/team/app", &["arm64"]);
        let prober = prober(source.clone());
        let secrets = PullSecrets::default();

        let first = prober.probe_image(&image(), &RegistryPolicy::default(), &secrets).await.unwrap();
        let second = prober.probe_image(&image(), &RegistryPolicy::default(), &secrets).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls().len(), 1, "second probe must be served from cache");

        let mirrored = prober.probe_image(&image(), &mirrored_policy(), &secrets).await.unwrap();
        assert_eq!(mirrored.endpoint, "mirror-a.local/team/app");
        assert_eq!(source.calls().len(), 2);
    }
}
