//! Server-side apply of the import manifest
//!
//! The manifest secret holds two multi-document YAML streams: `crds.yaml`
//! is applied first, then API discovery is refreshed and `import.yaml` is
//! applied, so custom resources in the second stream resolve against the
//! CRDs created by the first.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::discovery::{Discovery, Scope};
use kube::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::ImportExecutor;
use crate::error::{Error, Result};
use crate::model::ImportManifest;

pub const CRDS_KEY: &str = "crds.yaml";
pub const IMPORT_KEY: &str = "import.yaml";

/// [`ImportExecutor`] that server-side applies every manifest document
#[derive(Clone, Debug)]
pub struct ManifestApplier {
    field_manager: String,
}

impl ManifestApplier {
    pub fn new(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
        }
    }

    async fn apply_all(&self, client: &Client, documents: &[Value]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(|e| Error::import(format!("API discovery failed: {}", e)))?;

        for document in documents {
            self.apply_one(client, &discovery, document).await?;
        }
        Ok(())
    }

    async fn apply_one(&self, client: &Client, discovery: &Discovery, document: &Value) -> Result<()> {
        let object = ObjectHeader::from_value(document)?;
        let (group, version) = parse_api_version(object.api_version);
        let gvk = GroupVersionKind::gvk(group, version, object.kind);

        let Some((resource, capabilities)) = discovery.resolve_gvk(&gvk) else {
            return Err(Error::import(format!(
                "unknown resource type {}/{}",
                object.api_version, object.kind
            )));
        };

        let api: Api<DynamicObject> = match (&capabilities.scope, object.namespace) {
            (Scope::Cluster, _) => Api::all_with(client.clone(), &resource),
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(client.clone(), ns, &resource),
            (Scope::Namespaced, None) => Api::default_namespaced_with(client.clone(), &resource),
        };

        api.patch(
            object.name,
            &PatchParams::apply(&self.field_manager).force(),
            &Patch::Apply(document),
        )
        .await
        .map_err(|e| Error::import(format!("failed to apply {} {}: {}", object.kind, object.name, e)))?;

        debug!(kind = %object.kind, name = %object.name, namespace = ?object.namespace, "Applied manifest");
        Ok(())
    }
}

#[async_trait]
impl ImportExecutor for ManifestApplier {
    type Client = Client;

    async fn apply(&self, client: &Client, manifest: &ImportManifest) -> Result<()> {
        let crds = manifest_documents(manifest, CRDS_KEY)?;
        let objects = manifest_documents(manifest, IMPORT_KEY)?;
        if crds.is_empty() && objects.is_empty() {
            return Err(Error::import(format!(
                "import secret {} contains no manifests",
                manifest.name
            )));
        }

        self.apply_all(client, &crds).await?;
        self.apply_all(client, &objects).await?;

        info!(
            cluster = %manifest.identity,
            crds = crds.len(),
            objects = objects.len(),
            "Applied import manifests"
        );
        Ok(())
    }
}

/// Identifying fields of a manifest document
struct ObjectHeader<'a> {
    api_version: &'a str,
    kind: &'a str,
    name: &'a str,
    namespace: Option<&'a str>,
}

impl<'a> ObjectHeader<'a> {
    fn from_value(value: &'a Value) -> Result<Self> {
        fn field<'v>(value: &'v Value, pointer: &str) -> Option<&'v str> {
            value.pointer(pointer).and_then(Value::as_str)
        }
        let missing = |what: &str| Error::import(format!("manifest document is missing {}", what));

        Ok(Self {
            api_version: field(value, "/apiVersion").ok_or_else(|| missing("apiVersion"))?,
            kind: field(value, "/kind").ok_or_else(|| missing("kind"))?,
            name: field(value, "/metadata/name").ok_or_else(|| missing("metadata.name"))?,
            namespace: field(value, "/metadata/namespace"),
        })
    }
}

/// Split `group/version`; the core group has no slash
pub fn parse_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Apply order for a resource kind, lower first
pub fn kind_priority(kind: &str) -> u8 {
    match kind {
        "Namespace" => 0,
        "CustomResourceDefinition" => 1,
        "ServiceAccount" => 2,
        "ClusterRole" | "Role" => 3,
        "ClusterRoleBinding" | "RoleBinding" => 4,
        "ConfigMap" | "Secret" => 5,
        _ => 10,
    }
}

/// Parse a multi-document YAML stream, dropping empty documents and
/// ordering the rest by [`kind_priority`]
pub fn parse_documents(text: &str) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)
            .map_err(|e| Error::import(format!("invalid manifest YAML: {}", e)))?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    documents.sort_by_key(|doc| kind_priority(doc.get("kind").and_then(Value::as_str).unwrap_or("")));
    Ok(documents)
}

fn manifest_documents(manifest: &ImportManifest, key: &str) -> Result<Vec<Value>> {
    match manifest.document(key) {
        None => Ok(Vec::new()),
        Some(Ok(text)) => parse_documents(text),
        Some(Err(e)) => Err(Error::import(format!(
            "{} in import secret {} is not valid UTF-8: {}",
            key, manifest.name, e
        ))),
    }
}
