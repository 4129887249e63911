//! Test utilities for unit testing the placement logic
//!
//! Builders for pods, placement configurations and pre-populated caches.

use crate::stores::Stores;
use crds::{
    ClusterPodPlacementConfig, ClusterPodPlacementConfigSpec, LabelSelectorRequirement, NamespaceSelector,
    NodeAffinityScoring, NodeAffinityScoringPlatformTerm, PodPlacementConfig, PodPlacementConfigSpec, Plugins,
    SCHEDULING_GATE_LABEL, SCHEDULING_GATE_LABEL_VALUE_GATED, SCHEDULING_GATE_NAME, SINGLETON_NAME,
};
use k8s_openapi::api::core::v1::{Container, Namespace, Pod, PodSchedulingGate, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube_runtime::reflector;
use kube_runtime::watcher::Event;
use std::collections::{BTreeMap, BTreeSet};

/// Node label the affinity fixtures pin hosts with
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

pub fn archs(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// Enabled scoring plugin with one term per `(architecture, weight)`
pub fn scoring(terms: &[(&str, i32)]) -> NodeAffinityScoring {
    NodeAffinityScoring {
        enabled: true,
        platforms: terms
            .iter()
            .map(|(architecture, weight)| NodeAffinityScoringPlatformTerm {
                architecture: (*architecture).to_string(),
                weight: *weight,
            })
            .collect(),
    }
}

/// Namespaces labelled `multiarch.openshift.io/exclude-pod-placement` are opted out
pub fn opt_out_selector() -> NamespaceSelector {
    NamespaceSelector {
        match_labels: None,
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: "multiarch.openshift.io/exclude-pod-placement".to_string(),
            operator: "DoesNotExist".to_string(),
            values: None,
        }]),
    }
}

pub fn cluster_config(
    namespace_selector: Option<NamespaceSelector>,
    scoring: Option<NodeAffinityScoring>,
) -> ClusterPodPlacementConfig {
    ClusterPodPlacementConfig {
        metadata: ObjectMeta {
            name: Some(SINGLETON_NAME.to_string()),
            ..Default::default()
        },
        spec: ClusterPodPlacementConfigSpec {
            namespace_selector,
            plugins: scoring.map(|s| Plugins {
                node_affinity_scoring: Some(s),
            }),
            ..Default::default()
        },
        status: None,
    }
}

pub fn namespaced_config(
    namespace: &str,
    name: &str,
    priority: u8,
    scoring: Option<NodeAffinityScoring>,
) -> PodPlacementConfig {
    PodPlacementConfig {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: PodPlacementConfigSpec {
            priority,
            plugins: scoring.map(|s| Plugins {
                node_affinity_scoring: Some(s),
            }),
        },
        status: None,
    }
}

pub fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Ungated, unlabelled pod with one container per image
pub fn pod_with_images(namespace: &str, name: &str, images: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{namespace}-{name}-uid")),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: images
                .iter()
                .enumerate()
                .map(|(i, image)| Container {
                    name: format!("c{i}"),
                    image: Some((*image).to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        status: None,
    }
}

/// Pod as it looks after admission: gate and `gated` label set
pub fn gated_pod(namespace: &str, name: &str, images: &[&str]) -> Pod {
    let mut pod = pod_with_images(namespace, name, images);
    pod.metadata.labels = Some(BTreeMap::from([(
        SCHEDULING_GATE_LABEL.to_string(),
        SCHEDULING_GATE_LABEL_VALUE_GATED.to_string(),
    )]));
    if let Some(spec) = pod.spec.as_mut() {
        spec.scheduling_gates = Some(vec![PodSchedulingGate {
            name: SCHEDULING_GATE_NAME.to_string(),
        }]);
    }
    pod
}

/// Caches holding exactly the given objects; not marked ready
pub fn stores(
    cluster: Option<ClusterPodPlacementConfig>,
    namespaced: Vec<PodPlacementConfig>,
    namespaces: Vec<Namespace>,
) -> Stores {
    let (cluster_store, mut cluster_writer) = reflector::store();
    for config in cluster {
        cluster_writer.apply_watcher_event(&Event::Apply(config));
    }
    let (namespaced_store, mut namespaced_writer) = reflector::store();
    for config in namespaced {
        namespaced_writer.apply_watcher_event(&Event::Apply(config));
    }
    let (namespace_store, mut namespace_writer) = reflector::store();
    for ns in namespaces {
        namespace_writer.apply_watcher_event(&Event::Apply(ns));
    }
    Stores::from_stores(cluster_store, namespaced_store, namespace_store)
}
