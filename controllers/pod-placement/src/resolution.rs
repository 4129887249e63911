//! Per-pod architecture resolution
//!
//! Probes every image of a pod concurrently and reduces the per-image
//! results to one verdict only once all probes have finished.

use crate::metrics::Metrics;
use futures::future::join_all;
use registry_client::{ArchitectureProber, ProbeFailure, PullSecrets, RegistryError, RegistryPolicy};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Verdict for one pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodResolution {
    /// Architectures every image supports (possibly empty)
    Architectures(BTreeSet<String>),
    /// At least one image failed for good; no affinity will be added
    Fatal { image: String, failure: ProbeFailure, reason: String },
    /// Some registry was unreachable; the pod should be retried
    Transient { image: String, reason: String },
}

/// Reduces per-image results.
///
/// Any policy denial wins over everything: the pod is never retried. A
/// manifest failure contributes an empty set, so the intersection is empty.
/// Otherwise any unreachable image makes the whole pod transient; a partial
/// intersection is never reported.
#[must_use]
pub fn aggregate(results: Vec<(String, Result<BTreeSet<String>, RegistryError>)>) -> PodResolution {
    let mut intersection: Option<BTreeSet<String>> = None;
    let mut manifest_failure = None;
    let mut transient = None;

    for (image, result) in results {
        match result {
            Ok(architectures) => {
                intersection = Some(match intersection {
                    None => architectures,
                    Some(acc) => acc.intersection(&architectures).cloned().collect(),
                });
            }
            Err(e) => match e.failure() {
                ProbeFailure::PolicyDenied => {
                    return PodResolution::Fatal {
                        image,
                        failure: ProbeFailure::PolicyDenied,
                        reason: e.to_string(),
                    };
                }
                ProbeFailure::ManifestInvalid => {
                    manifest_failure.get_or_insert((image, e.to_string()));
                }
                ProbeFailure::Unreachable => {
                    transient.get_or_insert((image, e.to_string()));
                }
            },
        }
    }

    if let Some((image, reason)) = manifest_failure {
        return PodResolution::Fatal {
            image,
            failure: ProbeFailure::ManifestInvalid,
            reason,
        };
    }
    if let Some((image, reason)) = transient {
        return PodResolution::Transient { image, reason };
    }
    PodResolution::Architectures(intersection.unwrap_or_default())
}

/// Probes `images` concurrently and aggregates the results.
pub async fn resolve_pod(
    prober: &ArchitectureProber,
    images: &BTreeSet<String>,
    policy: &RegistryPolicy,
    secrets: &PullSecrets,
    metrics: &Metrics,
) -> PodResolution {
    let probes = images.iter().map(|image| async move {
        let result = prober.probe_image(image, policy, secrets).await;
        match &result {
            Ok(resolved) => {
                metrics.image_probed("success");
                debug!("{} supports {:?} (via {})", image, resolved.architectures, resolved.endpoint);
            }
            Err(e) => {
                metrics.image_probed(e.failure().as_str());
                warn!("Probing {} failed: {}", image, e);
            }
        }
        (image.clone(), result.map(|r| r.architectures))
    });
    aggregate(join_all(probes).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::archs;
    use registry_client::{MockManifestSource, MockResponse, ProberConfig};
    use std::time::Duration;

    fn unreachable(image: &str) -> RegistryError {
        RegistryError::Unreachable {
            location: image.to_string(),
            reason: "connection refused".to_string(),
        }
    }

    fn invalid(image: &str) -> RegistryError {
        RegistryError::ManifestInvalid {
            image: image.to_string(),
            reason: "unknown media type".to_string(),
        }
    }

    #[test]
    fn test_intersection_across_images() {
        let verdict = aggregate(vec![
            ("a".to_string(), Ok(archs(&["amd64", "arm64", "ppc64le", "s390x"]))),
            ("b".to_string(), Ok(archs(&["arm64", "ppc64le"]))),
        ]);
        assert_eq!(verdict, PodResolution::Architectures(archs(&["arm64", "ppc64le"])));
    }

    #[test]
    fn test_disjoint_images_give_empty_set() {
        let verdict = aggregate(vec![
            ("a".to_string(), Ok(archs(&["amd64"]))),
            ("b".to_string(), Ok(archs(&["s390x"]))),
        ]);
        assert_eq!(verdict, PodResolution::Architectures(BTreeSet::new()));
    }

    #[test]
    fn test_manifest_failure_is_fatal_even_with_transient() {
        let verdict = aggregate(vec![
            ("a".to_string(), Err(unreachable("a"))),
            ("b".to_string(), Err(invalid("b"))),
            ("c".to_string(), Ok(archs(&["amd64"]))),
        ]);
        assert!(matches!(
            verdict,
            PodResolution::Fatal { failure: ProbeFailure::ManifestInvalid, ref image, .. } if image == "b"
        ));
    }

    #[test]
    fn test_policy_denial_wins() {
        let verdict = aggregate(vec![
            ("a".to_string(), Err(invalid("a"))),
            (
                "b".to_string(),
                Err(RegistryError::PolicyDenied {
                    image: "b".to_string(),
                    reason: "blocked".to_string(),
                }),
            ),
        ]);
        assert!(matches!(verdict, PodResolution::Fatal { failure: ProbeFailure::PolicyDenied, .. }));
    }

    #[test]
    fn test_unreachable_makes_pod_transient() {
        let verdict = aggregate(vec![
            ("a".to_string(), Ok(archs(&["amd64"]))),
            ("b".to_string(), Err(unreachable("b"))),
        ]);
        assert!(matches!(verdict, PodResolution::Transient { ref image, .. } if image == "b"));
    }

    #[tokio::test]
    async fn test_resolve_pod_with_mock_registry() {
        let source = MockManifestSource::new()
            .with_architectures("quay.io/multi/app", &["amd64", "arm64", "ppc64le", "s390x"])
            .with_architectures("quay.io/arm/sidecar", &["arm64"])
            .with_response("quay.io/broken/app", MockResponse::ManifestInvalid);
        let prober = ArchitectureProber::new(
            source,
            ProberConfig {
                timeout: Duration::from_millis(200),
                ..ProberConfig::default()
            },
        );
        let metrics = Metrics::new().unwrap();
        let policy = RegistryPolicy::default();
        let secrets = PullSecrets::default();

        let images: BTreeSet<String> = ["quay.io/multi/app:1", "quay.io/arm/sidecar:1"]
            .into_iter()
            .map(String::from)
            .collect();
        let verdict = resolve_pod(&prober, &images, &policy, &secrets, &metrics).await;
        assert_eq!(verdict, PodResolution::Architectures(archs(&["arm64"])));

        let images: BTreeSet<String> = ["quay.io/multi/app:1", "quay.io/broken/app:1"]
            .into_iter()
            .map(String::from)
            .collect();
        let verdict = resolve_pod(&prober, &images, &policy, &secrets, &metrics).await;
        assert!(matches!(verdict, PodResolution::Fatal { failure: ProbeFailure::ManifestInvalid, .. }));
    }
}
