//! Import collaborators: building a client for the remote cluster and
//! applying the import manifest through it

mod apply;
mod client;

pub use apply::*;
pub use client::*;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{BootstrapCredential, ImportManifest};

/// Builds a client for the remote cluster from the bootstrap credential
#[async_trait]
pub trait ClientFactory: Send + Sync {
    type Client: Send + Sync;

    /// Fails with [`crate::Error::Connectivity`] when the credential cannot produce a client
    async fn from_credential(&self, credential: &BootstrapCredential) -> Result<Self::Client>;
}

/// Applies an import manifest to the remote cluster
#[async_trait]
pub trait ImportExecutor: Send + Sync {
    type Client: Send + Sync;

    /// Fails with [`crate::Error::Import`] when the remote cluster rejects the manifest
    async fn apply(&self, client: &Self::Client, manifest: &ImportManifest) -> Result<()>;
}
