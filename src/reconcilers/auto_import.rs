//! Auto-import reconciler
//!
//! One pass for a cluster identity:
//! - Load the managed cluster, the auto-import secret and the import secret;
//!   if any is missing there is nothing to do
//! - Build a client for the remote cluster from the auto-import secret
//! - Apply the import manifest through it
//! - On success delete the auto-import secret, on failure spend one unit of
//!   its retry budget (deleting it once exhausted)
//! - Record the outcome as the `ImportSucceeded` condition on the cluster
//!
//! Write failures are collected rather than short-circuited and returned
//! together once every write has been attempted. A write that finds its
//! object gone counts as done.

use std::future::Future;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::budget::{self, BudgetAction};
use crate::conditions;
use crate::error::{ignore_not_found, Error, ErrorList, Result};
use crate::import::{ClientFactory, ImportExecutor};
use crate::metrics;
use crate::model::{BootstrapCredential, ClusterIdentity};
use crate::reconcilers::locks::IdentityLocks;
use crate::recorder::{
    AuditEvent, Recorder, REASON_RETRY_INVALID, REASON_RETRY_TO_IMPORT, REASON_SECRET_DELETED,
};
use crate::store::ResourceStore;

/// Result of a successful pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Ask the dispatcher for another pass even though nothing failed
    pub requeue: bool,
}

impl ReconcileOutcome {
    /// Pass finished; any state change it made triggers the next delivery itself
    pub fn done() -> Self {
        Self { requeue: false }
    }
}

/// Reconciles the auto-import secret of one cluster at a time
pub struct AutoImportReconciler<S, F, E, R> {
    store: S,
    factory: F,
    executor: E,
    recorder: R,
    locks: IdentityLocks,
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

impl<S, F, E, R> AutoImportReconciler<S, F, E, R>
where
    S: ResourceStore,
    F: ClientFactory,
    E: ImportExecutor<Client = F::Client>,
    R: Recorder,
{
    pub fn new(store: S, factory: F, executor: E, recorder: R) -> Self {
        Self {
            store,
            factory,
            executor,
            recorder,
            locks: IdentityLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one reconciliation pass for `identity`
    #[instrument(skip(self, identity, cancel), fields(cluster = %identity))]
    pub async fn reconcile(
        &self,
        identity: &ClusterIdentity,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let _guard =
            until_cancelled(cancel, async { Ok(self.locks.lock(identity).await) }).await?;
        ensure_active(cancel)?;

        let Some(mut cluster) = self.store.get_cluster(identity).await? else {
            debug!("Managed cluster not found, nothing to do");
            return Ok(ReconcileOutcome::done());
        };
        let Some(credential) = self.store.get_credential(identity).await? else {
            debug!("Auto-import secret not found, nothing to do");
            return Ok(ReconcileOutcome::done());
        };
        let Some(manifest) = self.store.get_manifest(identity).await? else {
            debug!("Import secret not generated yet, nothing to do");
            return Ok(ReconcileOutcome::done());
        };

        info!("Importing managed cluster");

        // A client failure is a connectivity fault, not a failed attempt: keep the budget.
        ensure_active(cancel)?;
        let client = until_cancelled(cancel, self.factory.from_credential(&credential)).await?;

        ensure_active(cancel)?;
        let attempt = until_cancelled(cancel, self.executor.apply(&client, &manifest)).await;

        let mut errors = ErrorList::new();
        let condition = match attempt {
            Ok(()) => {
                info!("Managed cluster imported");
                metrics::IMPORT_ATTEMPTS.with_label_values(&["succeeded"]).inc();

                ensure_active(cancel)?;
                errors.collect(ignore_not_found(self.delete_imported(&credential).await));
                conditions::import_succeeded(Utc::now())
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!(error = %e, "Import attempt failed");
                metrics::IMPORT_ATTEMPTS.with_label_values(&["failed"]).inc();

                ensure_active(cancel)?;
                errors.collect(ignore_not_found(self.on_import_failure(&credential).await));
                conditions::import_failed(identity, &e, Utc::now())
            }
        };

        // Keep what already failed visible alongside the cancellation
        if cancel.is_cancelled() {
            errors.push(Error::Cancelled);
            return errors.into_result().map(|()| ReconcileOutcome::done());
        }
        cluster.set_condition(condition);
        errors.collect(ignore_not_found(self.store.update_cluster_status(&cluster).await));

        errors.into_result().map(|()| ReconcileOutcome::done())
    }

    async fn delete_imported(&self, credential: &BootstrapCredential) -> Result<()> {
        self.store.delete_credential(credential).await?;

        metrics::CREDENTIALS_DELETED.with_label_values(&["imported"]).inc();
        self.recorder.event(
            &credential.identity,
            AuditEvent::normal(
                REASON_SECRET_DELETED,
                format!(
                    "The managed cluster {} is imported, delete its auto import secret",
                    credential.identity
                ),
            ),
        );
        Ok(())
    }

    /// Spend one unit of the retry budget, deleting the credential once exhausted
    async fn on_import_failure(&self, credential: &BootstrapCredential) -> Result<()> {
        let identity = &credential.identity;

        let action = match budget::on_failure(credential) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "Retry counter is invalid, leaving auto-import secret untouched");
                self.recorder.event(
                    identity,
                    AuditEvent::warning(
                        REASON_RETRY_INVALID,
                        format!(
                            "The value of autoImportRetry is invalid in secret {}",
                            credential.key()
                        ),
                    ),
                );
                return Err(e);
            }
        };

        self.recorder.event(
            identity,
            AuditEvent::normal(
                REASON_RETRY_TO_IMPORT,
                format!("Retry to import cluster {}, {}", identity, action.charged()),
            ),
        );

        match action {
            BudgetAction::Decrement {
                credential: updated,
                ..
            } => {
                self.store.update_credential(&updated).await?;
                debug!("Retry budget decremented");
                Ok(())
            }
            BudgetAction::DeleteExhausted => {
                self.store.delete_credential(credential).await?;

                info!("Retry budget exhausted, auto-import secret deleted");
                metrics::CREDENTIALS_DELETED.with_label_values(&["exhausted"]).inc();
                self.recorder.event(
                    identity,
                    AuditEvent::normal(
                        REASON_SECRET_DELETED,
                        format!(
                            "Exceed the retry times, delete the auto import secret {}",
                            credential.key()
                        ),
                    ),
                );
                Ok(())
            }
        }
    }
}
