//! Pod Placement CRD Definitions
//!
//! Custom Resource Definitions for architecture-aware pod placement, the
//! v1alpha1/v1beta1 conversion between them, and read-only views of the
//! cluster image configuration the registry resolver consumes.

pub mod cluster_pod_placement_config;
pub mod common;
pub mod conversion;
pub mod image_config;
pub mod pod_placement_config;
pub mod v1alpha1;

pub use cluster_pod_placement_config::*;
pub use common::*;
pub use conversion::ConversionError;
pub use image_config::*;
pub use pod_placement_config::*;
