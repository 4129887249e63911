//! Configuration Resolver
//!
//! Decides, from an immutable snapshot of the placement configuration,
//! whether a namespace takes part in pod placement and which scoring plugin
//! applies there. No I/O; callers pass what their reflectors hold.

use crds::{ClusterPodPlacementConfig, NodeAffinityScoring, PodPlacementConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Namespace prefixes that never take part in placement
const SYSTEM_NAMESPACE_PREFIXES: [&str; 3] = ["kube-", "openshift-", "hypershift-"];

/// Why placement is off for a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledReason {
    /// No `cluster` singleton exists
    NoClusterConfig,
    /// The singleton is being deleted
    ClusterConfigDeleting,
    /// Operator or system namespace
    ExcludedNamespace,
    /// The singleton's namespace selector does not match
    NamespaceNotSelected,
}

/// Where the effective scoring plugin came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoringSource {
    /// `PodPlacementConfig` of this name in the pod's namespace
    Namespaced(String),
    /// The cluster singleton
    Cluster,
}

/// Effective placement settings for one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementScope {
    /// No gate, no mutation
    Disabled(DisabledReason),
    /// Placement applies; `scoring` is `None` for affinity-only placement
    Enabled {
        scoring: Option<NodeAffinityScoring>,
        source: Option<ScoringSource>,
    },
}

impl PlacementScope {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    /// Scoring plugin to apply, if any
    #[must_use]
    pub fn scoring(&self) -> Option<&NodeAffinityScoring> {
        match self {
            Self::Enabled { scoring, .. } => scoring.as_ref(),
            Self::Disabled(_) => None,
        }
    }
}

/// Whether `namespace` is one placement never touches
#[must_use]
pub fn is_excluded_namespace(namespace: &str, operator_namespace: &str) -> bool {
    namespace == operator_namespace || SYSTEM_NAMESPACE_PREFIXES.iter().any(|p| namespace.starts_with(p))
}

/// Resolves the placement scope of `namespace`.
///
/// The singleton's selector gates participation. Inside scope, the
/// highest-priority `PodPlacementConfig` of the namespace (ties broken by
/// name) supplies the scoring plugin when it has an enabled one; otherwise
/// the singleton's enabled plugin applies; otherwise placement is
/// affinity-only. `namespaced` may hold configs of other namespaces; they
/// are ignored.
#[must_use]
pub fn resolve(
    namespace: &str,
    namespace_labels: &BTreeMap<String, String>,
    operator_namespace: &str,
    cluster: Option<&ClusterPodPlacementConfig>,
    namespaced: &[Arc<PodPlacementConfig>],
) -> PlacementScope {
    let Some(cluster) = cluster else {
        return PlacementScope::Disabled(DisabledReason::NoClusterConfig);
    };
    if cluster.metadata.deletion_timestamp.is_some() {
        return PlacementScope::Disabled(DisabledReason::ClusterConfigDeleting);
    }
    if is_excluded_namespace(namespace, operator_namespace) {
        return PlacementScope::Disabled(DisabledReason::ExcludedNamespace);
    }
    let selected = cluster
        .spec
        .namespace_selector
        .as_ref()
        .is_none_or(|selector| selector.matches(namespace_labels));
    if !selected {
        return PlacementScope::Disabled(DisabledReason::NamespaceNotSelected);
    }

    let current = namespaced
        .iter()
        .filter(|c| c.metadata.namespace.as_deref() == Some(namespace) && c.metadata.deletion_timestamp.is_none())
        .max_by(|a, b| {
            a.spec
                .priority
                .cmp(&b.spec.priority)
                .then_with(|| b.metadata.name.cmp(&a.metadata.name))
        });

    if let Some(config) = current
        && let Some(scoring) = config.spec.plugins.as_ref().and_then(crds::Plugins::active_scoring)
    {
        return PlacementScope::Enabled {
            scoring: Some(scoring.clone()),
            source: Some(ScoringSource::Namespaced(config.metadata.name.clone().unwrap_or_default())),
        };
    }

    match cluster.spec.active_scoring() {
        Some(scoring) => PlacementScope::Enabled {
            scoring: Some(scoring.clone()),
            source: Some(ScoringSource::Cluster),
        },
        None => PlacementScope::Enabled {
            scoring: None,
            source: None,
        },
    }
}
