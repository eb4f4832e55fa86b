//! Resource store: loading and writing the three records a pass works on
//!
//! Loads normalize "not found" to `None`. Writes carry the resource version
//! observed at load time, so a stale write surfaces as [`Error::Conflict`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, Patch, PatchParams, Preconditions};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

use crate::crd::ManagedCluster;
use crate::error::{Error, Result};
use crate::model::{
    BootstrapCredential, ClusterIdentity, ClusterRecord, ImportManifest, AUTO_IMPORT_SECRET_NAME,
};

/// Backing store for cluster, credential and manifest records
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_cluster(&self, identity: &ClusterIdentity) -> Result<Option<ClusterRecord>>;

    async fn get_credential(&self, identity: &ClusterIdentity)
        -> Result<Option<BootstrapCredential>>;

    async fn get_manifest(&self, identity: &ClusterIdentity) -> Result<Option<ImportManifest>>;

    /// Persist the credential's data
    async fn update_credential(&self, credential: &BootstrapCredential) -> Result<()>;

    /// Delete the credential. Deleting an already absent credential succeeds.
    async fn delete_credential(&self, credential: &BootstrapCredential) -> Result<()>;

    /// Persist the cluster's conditions
    async fn update_cluster_status(&self, cluster: &ClusterRecord) -> Result<()>;
}

/// [`ResourceStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, identity: &ClusterIdentity) -> Api<Secret> {
        Api::namespaced(self.client.clone(), identity.namespace())
    }

    fn clusters(&self) -> Api<ManagedCluster> {
        Api::all(self.client.clone())
    }
}

fn secret_data(secret: Secret) -> BTreeMap<String, Vec<u8>> {
    secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.0))
        .collect()
}

/// Outcome of a delete call: `true` if this call removed the object,
/// `false` if it was already gone
fn deleted_or_absent<T>(result: std::result::Result<T, kube::Error>) -> Result<bool> {
    match result.map_err(Error::from_kube) {
        Ok(_) => Ok(true),
        Err(Error::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_cluster(&self, identity: &ClusterIdentity) -> Result<Option<ClusterRecord>> {
        let Some(cluster) = self.clusters().get_opt(identity.as_str()).await? else {
            return Ok(None);
        };
        Ok(Some(ClusterRecord {
            identity: identity.clone(),
            resource_version: cluster.metadata.resource_version,
            conditions: cluster.status.map(|s| s.conditions).unwrap_or_default(),
        }))
    }

    async fn get_credential(
        &self,
        identity: &ClusterIdentity,
    ) -> Result<Option<BootstrapCredential>> {
        let Some(secret) = self.secrets(identity).get_opt(AUTO_IMPORT_SECRET_NAME).await? else {
            return Ok(None);
        };
        Ok(Some(BootstrapCredential {
            identity: identity.clone(),
            name: AUTO_IMPORT_SECRET_NAME.to_string(),
            uid: secret.metadata.uid.clone(),
            resource_version: secret.metadata.resource_version.clone(),
            data: secret_data(secret),
        }))
    }

    async fn get_manifest(&self, identity: &ClusterIdentity) -> Result<Option<ImportManifest>> {
        let name = identity.import_secret_name();
        let Some(secret) = self.secrets(identity).get_opt(&name).await? else {
            return Ok(None);
        };
        Ok(Some(ImportManifest {
            identity: identity.clone(),
            name,
            data: secret_data(secret),
        }))
    }

    async fn update_credential(&self, credential: &BootstrapCredential) -> Result<()> {
        let data: BTreeMap<&str, ByteString> = credential
            .data
            .iter()
            .map(|(key, value)| (key.as_str(), ByteString(value.clone())))
            .collect();
        let patch = json!({
            "metadata": { "resourceVersion": credential.resource_version },
            "data": data,
        });

        self.secrets(&credential.identity)
            .patch(&credential.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        debug!(secret = %credential.key(), "Updated bootstrap credential");
        Ok(())
    }

    async fn delete_credential(&self, credential: &BootstrapCredential) -> Result<()> {
        // Guard on uid so a credential re-created by a user is never removed by a stale pass.
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                uid: credential.uid.clone(),
                resource_version: None,
            }),
            ..DeleteParams::default()
        };

        let result = self
            .secrets(&credential.identity)
            .delete(&credential.name, &params)
            .await;
        if deleted_or_absent(result)? {
            debug!(secret = %credential.key(), "Deleted bootstrap credential");
        } else {
            debug!(secret = %credential.key(), "Bootstrap credential already deleted");
        }
        Ok(())
    }

    async fn update_cluster_status(&self, cluster: &ClusterRecord) -> Result<()> {
        let patch = json!({
            "metadata": { "resourceVersion": cluster.resource_version },
            "status": { "conditions": cluster.conditions },
        });

        self.clusters()
            .patch_status(cluster.identity.as_str(), &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        debug!(cluster = %cluster.identity, "Updated managed cluster conditions");
        Ok(())
    }
}
