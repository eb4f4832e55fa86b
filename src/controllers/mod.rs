//! Kubernetes controllers
//!
//! This module wires the reconciler into kube-runtime: it watches the
//! resources that can change an import's outcome and triggers reconciliation.

mod auto_import_controller;

pub use auto_import_controller::run as run_auto_import_controller;
pub use auto_import_controller::{cluster_to_secret, import_secret_to_secret};

use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::import::{KubeconfigClientFactory, ManifestApplier};
use crate::reconcilers::AutoImportReconciler;
use crate::recorder::KubeRecorder;
use crate::store::KubeStore;

/// Reconciler wired to the Kubernetes-backed collaborators
pub type KubeReconciler =
    AutoImportReconciler<KubeStore, KubeconfigClientFactory, ManifestApplier, KubeRecorder>;

/// Name the controller reports events and applies manifests under
pub const CONTROLLER_NAME: &str = "auto-import-controller";

/// Shared context for the controller
pub struct Context {
    pub reconciler: KubeReconciler,
    pub config: OperatorConfig,
    /// Cancelled on shutdown; each pass runs under a child token
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, config: OperatorConfig, shutdown: CancellationToken) -> Self {
        let reconciler = AutoImportReconciler::new(
            KubeStore::new(client.clone()),
            KubeconfigClientFactory::default(),
            ManifestApplier::new(config.field_manager.clone()),
            KubeRecorder::new(client, CONTROLLER_NAME),
        );
        Self {
            reconciler,
            config,
            shutdown,
        }
    }
}
