//! Prints the placement CRDs as a multi-document YAML stream.
//!
//! Both ClusterPodPlacementConfig versions are merged into one CRD with
//! v1beta1 as the storage version.

use anyhow::Context;
use crds::{ClusterPodPlacementConfig, PodPlacementConfig, v1alpha1};
use kube::CustomResourceExt;
use kube::core::crd::merge_crds;

fn main() -> anyhow::Result<()> {
    let cppc = merge_crds(
        vec![ClusterPodPlacementConfig::crd(), v1alpha1::ClusterPodPlacementConfig::crd()],
        "v1beta1",
    )
    .context("merging ClusterPodPlacementConfig versions")?;

    for crd in [cppc, PodPlacementConfig::crd()] {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd).context("serializing CRD")?);
    }
    Ok(())
}
