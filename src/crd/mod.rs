//! Custom Resource Definitions read and written by the controller

mod managed_cluster;

pub use managed_cluster::*;

use kube::CustomResourceExt;

/// Generate the CRD YAML manifests, for clusters without the fleet control plane installed
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![serde_yaml::to_string(&ManagedCluster::crd())?])
}
