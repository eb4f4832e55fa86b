//! CRD YAML Generator
//!
//! Prints the ManagedCluster CRD so the controller can run against a local
//! cluster that does not have the fleet control plane installed.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/managedcluster.yaml

use auto_import_controller::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
