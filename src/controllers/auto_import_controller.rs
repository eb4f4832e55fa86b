//! Auto-import controller
//!
//! Watches auto-import secrets and triggers reconciliation. Changes to the
//! owning ManagedCluster or to the generated import secret are mapped back
//! to the auto-import secret of the same cluster, so every trigger for one
//! cluster lands on the same work-queue key.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        reflector::ObjectRef,
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::ManagedCluster;
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::{ClusterIdentity, AUTO_IMPORT_SECRET_NAME};

fn secrets_api(client: &Client, namespace: Option<&str>) -> Api<Secret> {
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Work-queue key for the cluster named `cluster`
fn auto_import_ref(cluster: &str) -> ObjectRef<Secret> {
    ObjectRef::new(AUTO_IMPORT_SECRET_NAME).within(cluster)
}

/// Map a ManagedCluster to its auto-import secret
pub fn cluster_to_secret(cluster: &ManagedCluster) -> Option<ObjectRef<Secret>> {
    Some(auto_import_ref(&cluster.name_any()))
}

/// Map a `<cluster>-import` secret to the auto-import secret beside it
pub fn import_secret_to_secret(secret: &Secret) -> Option<ObjectRef<Secret>> {
    let namespace = secret.namespace()?;
    let expected = ClusterIdentity::new(namespace.as_str()).import_secret_name();
    (secret.name_any() == expected).then(|| auto_import_ref(&namespace))
}

/// Run the auto-import controller
pub async fn run(client: Client, context: Arc<Context>) {
    let clusters: Api<ManagedCluster> = Api::all(client.clone());

    // Verify the fleet control plane's CRD is installed
    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!("ManagedCluster CRD not installed: {}", e);
        return;
    }

    let namespace = context.config.watch_namespace.clone();
    let auto_import_secrets = secrets_api(&client, namespace.as_deref());
    let import_secrets = secrets_api(&client, namespace.as_deref());

    info!(namespace = ?namespace, "Starting auto-import controller");

    Controller::new(
        auto_import_secrets,
        WatcherConfig::default().fields(&format!("metadata.name={}", AUTO_IMPORT_SECRET_NAME)),
    )
    .watches(clusters, WatcherConfig::default(), |cluster| {
        cluster_to_secret(&cluster)
    })
    .watches(import_secrets, WatcherConfig::default(), |secret| {
        import_secret_to_secret(&secret)
    })
    .shutdown_on_signal()
    .run(reconcile, error_policy, context)
    .for_each(|result| async move {
        match result {
            Ok((obj, _action)) => {
                info!(
                    cluster = obj.namespace.as_deref().unwrap_or_default(),
                    "Reconciled auto-import secret"
                );
            }
            Err(e) => {
                warn!(error = %e, "Reconciliation error");
            }
        }
    })
    .await;
}

/// Main reconciliation function
#[instrument(skip(obj, ctx), fields(cluster = obj.namespace()))]
async fn reconcile(obj: Arc<Secret>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION.start_timer();
    metrics::RECONCILIATIONS.inc();

    let Some(namespace) = obj.namespace() else {
        return Ok(Action::await_change());
    };
    let identity = ClusterIdentity::new(namespace);

    let outcome = ctx
        .reconciler
        .reconcile(&identity, &ctx.shutdown.child_token())
        .await
        .inspect_err(|e| {
            metrics::RECONCILIATION_ERRORS
                .with_label_values(&[e.kind().as_str()])
                .inc();
        })?;

    if outcome.requeue {
        Ok(Action::requeue(ctx.config.error_requeue))
    } else {
        Ok(Action::await_change())
    }
}

/// Error policy for the controller
fn error_policy(obj: Arc<Secret>, error: &Error, ctx: Arc<Context>) -> Action {
    let requeue = requeue_after(error, &ctx);
    error!(
        cluster = obj.namespace().unwrap_or_default(),
        error = %error,
        requeue_secs = requeue.as_secs(),
        "Reconciliation failed, scheduling retry"
    );
    Action::requeue(requeue)
}

/// Failures that need manual intervention back off longer
fn requeue_after(error: &Error, ctx: &Context) -> std::time::Duration {
    if error.is_retryable() {
        ctx.config.error_requeue
    } else {
        ctx.config.config_error_requeue
    }
}
