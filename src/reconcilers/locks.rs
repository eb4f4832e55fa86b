//! Per-identity mutual exclusion
//!
//! kube-runtime already serializes passes per object key. This guard keeps
//! the same guarantee when the reconciler is driven by anything else.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::ClusterIdentity;

type LockMap = HashMap<ClusterIdentity, Arc<AsyncMutex<()>>>;

/// Async lock per [`ClusterIdentity`]; entries are dropped once unused
#[derive(Clone, Default)]
pub struct IdentityLocks {
    entries: Arc<Mutex<LockMap>>,
}

/// Held for the duration of one pass
pub struct IdentityGuard {
    identity: ClusterIdentity,
    entry: Arc<AsyncMutex<()>>,
    entries: Arc<Mutex<LockMap>>,
    _guard: OwnedMutexGuard<()>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, identity: &ClusterIdentity) -> IdentityGuard {
        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(identity.clone()).or_default())
        };
        let guard = Arc::clone(&entry).lock_owned().await;

        IdentityGuard {
            identity: identity.clone(),
            entry,
            entries: Arc::clone(&self.entries),
            _guard: guard,
        }
    }

    /// Number of identities currently tracked
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // References: the map, `self.entry`, and the owned guard. Any more means a waiter.
        if Arc::strong_count(&self.entry) <= 3 {
            entries.remove(&self.identity);
        }
    }
}
