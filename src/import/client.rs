//! Remote cluster client construction from the auto-import secret
//!
//! The secret carries either a full kubeconfig under `kubeconfig`, or a
//! bearer `token` together with the API `server` URL.

use std::time::Duration;

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;

use super::ClientFactory;
use crate::error::{Error, Result};
use crate::model::BootstrapCredential;

pub const KUBECONFIG_KEY: &str = "kubeconfig";
pub const TOKEN_KEY: &str = "token";
pub const SERVER_KEY: &str = "server";

const IMPORT_CONTEXT: &str = "auto-import";

/// Builds a [`kube::Client`] from the credential's kubeconfig or token
#[derive(Clone, Debug)]
pub struct KubeconfigClientFactory {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl KubeconfigClientFactory {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

impl Default for KubeconfigClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(60))
    }
}

fn utf8_value<'a>(credential: &'a BootstrapCredential, key: &str) -> Result<Option<&'a str>> {
    credential
        .get(key)
        .map(|bytes| {
            std::str::from_utf8(bytes).map_err(|e| {
                Error::connectivity(format!(
                    "key '{}' in secret {} is not valid UTF-8: {}",
                    key,
                    credential.key(),
                    e
                ))
            })
        })
        .transpose()
}

/// Extract a kubeconfig from the credential
pub fn kubeconfig_from_credential(credential: &BootstrapCredential) -> Result<Kubeconfig> {
    if let Some(raw) = utf8_value(credential, KUBECONFIG_KEY)? {
        return Kubeconfig::from_yaml(raw).map_err(|e| {
            Error::connectivity(format!("invalid kubeconfig in secret {}: {}", credential.key(), e))
        });
    }

    let token = utf8_value(credential, TOKEN_KEY)?;
    let server = utf8_value(credential, SERVER_KEY)?;
    let (Some(token), Some(server)) = (token, server) else {
        return Err(Error::connectivity(format!(
            "secret {} must contain '{}' or both '{}' and '{}'",
            credential.key(),
            KUBECONFIG_KEY,
            TOKEN_KEY,
            SERVER_KEY
        )));
    };

    let kubeconfig = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": IMPORT_CONTEXT,
            "cluster": { "server": server.trim(), "insecure-skip-tls-verify": true },
        }],
        "users": [{
            "name": IMPORT_CONTEXT,
            "user": { "token": token.trim() },
        }],
        "contexts": [{
            "name": IMPORT_CONTEXT,
            "context": { "cluster": IMPORT_CONTEXT, "user": IMPORT_CONTEXT },
        }],
        "current-context": IMPORT_CONTEXT,
    });
    serde_json::from_value(kubeconfig)
        .map_err(|e| Error::connectivity(format!("unable to build kubeconfig: {}", e)))
}

#[async_trait]
impl ClientFactory for KubeconfigClientFactory {
    type Client = Client;

    async fn from_credential(&self, credential: &BootstrapCredential) -> Result<Client> {
        let kubeconfig = kubeconfig_from_credential(credential)?;
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                Error::connectivity(format!(
                    "failed to load kubeconfig from secret {}: {}",
                    credential.key(),
                    e
                ))
            })?;
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);

        Client::try_from(config)
            .map_err(|e| Error::connectivity(format!("failed to create client: {}", e)))
    }
}
