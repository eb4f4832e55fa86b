//! Typed records the reconciler works on
//!
//! These are decoupled from the Kubernetes wire objects; [`crate::store`]
//! converts between the two at the store boundary.

use std::collections::BTreeMap;
use std::fmt;

use crate::crd::Condition;

/// Name of the bootstrap credential secret inside a cluster's namespace
pub const AUTO_IMPORT_SECRET_NAME: &str = "auto-import-secret";

/// Suffix of the generated import manifest secret, `<cluster>-import`
pub const IMPORT_SECRET_NAME_SUFFIX: &str = "import";

/// Data key holding the textual retry counter
pub const AUTO_IMPORT_RETRY_KEY: &str = "autoImportRetry";

/// Unique name of a remote cluster.
///
/// The cluster's namespace on the hub carries the same name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterIdentity(String);

impl ClusterIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace holding this cluster's credential and manifest
    pub fn namespace(&self) -> &str {
        &self.0
    }

    /// Name of the import manifest secret for this cluster
    pub fn import_secret_name(&self) -> String {
        format!("{}-{}", self.0, IMPORT_SECRET_NAME_SUFFIX)
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClusterIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The managed cluster as seen by the controller
#[derive(Clone, Debug)]
pub struct ClusterRecord {
    pub identity: ClusterIdentity,
    /// Version observed at load time, used for optimistic concurrency on write
    pub resource_version: Option<String>,
    /// At most one condition per type, in insertion order
    pub conditions: Vec<Condition>,
}

impl ClusterRecord {
    pub fn new(identity: ClusterIdentity) -> Self {
        Self {
            identity,
            resource_version: None,
            conditions: Vec::new(),
        }
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// Bootstrap credential that triggers an import attempt
#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapCredential {
    pub identity: ClusterIdentity,
    pub name: String,
    pub uid: Option<String>,
    pub resource_version: Option<String>,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl BootstrapCredential {
    pub fn new(identity: ClusterIdentity) -> Self {
        Self {
            identity,
            name: AUTO_IMPORT_SECRET_NAME.to_string(),
            uid: None,
            resource_version: None,
            data: BTreeMap::new(),
        }
    }

    /// Builder-style helper to set a data key
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    /// `namespace/name` of the underlying secret
    pub fn key(&self) -> String {
        format!("{}/{}", self.identity.namespace(), self.name)
    }
}

/// Generated import manifest, read-only to the controller
#[derive(Clone, Debug, PartialEq)]
pub struct ImportManifest {
    pub identity: ClusterIdentity,
    pub name: String,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl ImportManifest {
    pub fn new(identity: ClusterIdentity) -> Self {
        let name = identity.import_secret_name();
        Self {
            identity,
            name,
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// A manifest document as UTF-8 text, if present
    pub fn document(&self, key: &str) -> Option<std::result::Result<&str, std::str::Utf8Error>> {
        self.data.get(key).map(|bytes| std::str::from_utf8(bytes))
    }
}
