//! Audit event emission
//!
//! Events are fire-and-forget: recording never blocks a reconciliation pass
//! and a failure to publish is ignored.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder as EventRecorder, Reporter};
use kube::{Client, Resource};
use tracing::debug;

use crate::crd::ManagedCluster;
use crate::model::ClusterIdentity;

pub const REASON_RETRY_TO_IMPORT: &str = "RetryToImportCluster";
pub const REASON_RETRY_INVALID: &str = "AutoImportRetryInvalid";
pub const REASON_SECRET_DELETED: &str = "AutoImportSecretDeleted";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditKind {
    Normal,
    Warning,
}

/// A single audit record about a cluster
#[derive(Clone, Debug, PartialEq)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub reason: &'static str,
    pub message: String,
}

impl AuditEvent {
    pub fn normal(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: AuditKind::Normal,
            reason,
            message: message.into(),
        }
    }

    pub fn warning(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: AuditKind::Warning,
            reason,
            message: message.into(),
        }
    }
}

/// Sink for audit events
pub trait Recorder: Send + Sync {
    fn event(&self, identity: &ClusterIdentity, event: AuditEvent);
}

/// Publishes audit events as Kubernetes Events regarding the ManagedCluster
#[derive(Clone)]
pub struct KubeRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeRecorder {
    pub fn new(client: Client, controller: impl Into<String>) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }

    fn reference(identity: &ClusterIdentity) -> ObjectReference {
        ObjectReference {
            api_version: Some(ManagedCluster::api_version(&()).into_owned()),
            kind: Some(ManagedCluster::kind(&()).into_owned()),
            name: Some(identity.to_string()),
            ..Default::default()
        }
    }
}

impl Recorder for KubeRecorder {
    fn event(&self, identity: &ClusterIdentity, event: AuditEvent) {
        let recorder = EventRecorder::new(
            self.client.clone(),
            self.reporter.clone(),
            Self::reference(identity),
        );
        let cluster = identity.to_string();

        tokio::spawn(async move {
            let published = recorder
                .publish(Event {
                    type_: match event.kind {
                        AuditKind::Normal => EventType::Normal,
                        AuditKind::Warning => EventType::Warning,
                    },
                    reason: event.reason.to_string(),
                    note: Some(event.message),
                    action: "Import".to_string(),
                    secondary: None,
                })
                .await;
            if let Err(e) = published {
                debug!(cluster = %cluster, error = %e, "Dropped audit event");
            }
        });
    }
}
