//! In-memory collaborators for driving the reconciler without a cluster

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use auto_import_controller::import::{ClientFactory, ImportExecutor};
use auto_import_controller::model::{
    BootstrapCredential, ClusterIdentity, ClusterRecord, ImportManifest, AUTO_IMPORT_RETRY_KEY,
};
use auto_import_controller::reconcilers::AutoImportReconciler;
use auto_import_controller::recorder::{AuditEvent, Recorder};
use auto_import_controller::store::ResourceStore;
use auto_import_controller::{Error, Result};

// ============================================================================
// Resource store
// ============================================================================

/// Write operations a test can make fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Write {
    UpdateCredential,
    DeleteCredential,
    UpdateClusterStatus,
}

#[derive(Default)]
struct StoreState {
    clusters: HashMap<ClusterIdentity, ClusterRecord>,
    credentials: HashMap<ClusterIdentity, BootstrapCredential>,
    manifests: HashMap<ClusterIdentity, ImportManifest>,
    faults: HashMap<Write, fn() -> Error>,
    hooks: HashMap<Write, Hook>,
    writes: Vec<Write>,
    next_version: u64,
}

impl StoreState {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn fault(&mut self, write: Write) -> Result<()> {
        self.writes.push(write);
        if let Some(hook) = self.hooks.get(&write) {
            hook();
        }
        match self.faults.get(&write) {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

/// Versioned in-memory store with optimistic concurrency on every write
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_cluster(&self, mut cluster: ClusterRecord) {
        let mut state = self.state.lock().unwrap();
        cluster.resource_version = Some(state.bump());
        state.clusters.insert(cluster.identity.clone(), cluster);
    }

    pub fn insert_credential(&self, mut credential: BootstrapCredential) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        credential.uid = Some(format!("uid-{}", version));
        credential.resource_version = Some(version);
        state
            .credentials
            .insert(credential.identity.clone(), credential);
    }

    pub fn insert_manifest(&self, manifest: ImportManifest) {
        let mut state = self.state.lock().unwrap();
        state.manifests.insert(manifest.identity.clone(), manifest);
    }

    pub fn fail(&self, write: Write, make: fn() -> Error) {
        self.state.lock().unwrap().faults.insert(write, make);
    }

    /// Run `hook` as `write` starts. It runs under the store lock and must not call back into the store.
    pub fn before(&self, write: Write, hook: impl Fn() + Send + Sync + 'static) {
        self.state.lock().unwrap().hooks.insert(write, Arc::new(hook));
    }

    pub fn remove_cluster(&self, identity: &ClusterIdentity) {
        self.state.lock().unwrap().clusters.remove(identity);
    }

    pub fn remove_credential(&self, identity: &ClusterIdentity) {
        self.state.lock().unwrap().credentials.remove(identity);
    }

    pub fn cluster(&self, identity: &ClusterIdentity) -> Option<ClusterRecord> {
        self.state.lock().unwrap().clusters.get(identity).cloned()
    }

    pub fn credential(&self, identity: &ClusterIdentity) -> Option<BootstrapCredential> {
        self.state.lock().unwrap().credentials.get(identity).cloned()
    }

    /// Retry counter currently stored, as text
    pub fn retry_counter(&self, identity: &ClusterIdentity) -> Option<String> {
        self.credential(identity)
            .and_then(|c| c.get(AUTO_IMPORT_RETRY_KEY).map(|v| String::from_utf8_lossy(v).into_owned()))
    }

    /// Every write attempted so far, failed ones included
    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }
}

fn conflict(what: &str) -> Error {
    Error::Conflict(format!("the object {} has been modified", what))
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_cluster(&self, identity: &ClusterIdentity) -> Result<Option<ClusterRecord>> {
        Ok(self.cluster(identity))
    }

    async fn get_credential(
        &self,
        identity: &ClusterIdentity,
    ) -> Result<Option<BootstrapCredential>> {
        Ok(self.credential(identity))
    }

    async fn get_manifest(&self, identity: &ClusterIdentity) -> Result<Option<ImportManifest>> {
        Ok(self.state.lock().unwrap().manifests.get(identity).cloned())
    }

    async fn update_credential(&self, credential: &BootstrapCredential) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.fault(Write::UpdateCredential)?;

        let Some(stored) = state.credentials.get(&credential.identity) else {
            return Err(Error::NotFound(credential.key()));
        };
        if stored.resource_version != credential.resource_version {
            return Err(conflict(&credential.key()));
        }
        let mut updated = credential.clone();
        updated.resource_version = Some(state.bump());
        state.credentials.insert(updated.identity.clone(), updated);
        Ok(())
    }

    async fn delete_credential(&self, credential: &BootstrapCredential) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.fault(Write::DeleteCredential)?;

        let stored_uid = state
            .credentials
            .get(&credential.identity)
            .map(|stored| stored.uid.clone());
        match stored_uid {
            None => Ok(()),
            Some(uid) if uid != credential.uid => Err(conflict(&credential.key())),
            Some(_) => {
                state.credentials.remove(&credential.identity);
                Ok(())
            }
        }
    }

    async fn update_cluster_status(&self, cluster: &ClusterRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.fault(Write::UpdateClusterStatus)?;

        let Some(stored) = state.clusters.get(&cluster.identity) else {
            return Err(Error::NotFound(cluster.identity.to_string()));
        };
        if stored.resource_version != cluster.resource_version {
            return Err(conflict(cluster.identity.as_str()));
        }
        let mut updated = cluster.clone();
        updated.resource_version = Some(state.bump());
        state.clusters.insert(updated.identity.clone(), updated);
        Ok(())
    }
}

// ============================================================================
// Import collaborators
// ============================================================================

/// Client handed from the factory to the executor
#[derive(Debug)]
pub struct FakeClient {
    pub cluster: ClusterIdentity,
}

/// Factory that either connects or fails with a connectivity error
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn connecting() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for ScriptedFactory {
    type Client = FakeClient;

    async fn from_credential(&self, credential: &BootstrapCredential) -> Result<FakeClient> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(Error::connectivity(message.clone())),
            None => Ok(FakeClient {
                cluster: credential.identity.clone(),
            }),
        }
    }
}

/// Side effect injected into a collaborator call
pub type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub enum ApplyOutcome {
    Succeed,
    Fail(String),
    /// Cancel the pass while the apply is in flight and never finish
    CancelDuring(CancellationToken),
    /// Never finish
    Hang,
    /// Run the hook, then play back the inner outcome
    Then(Hook, Box<ApplyOutcome>),
}

impl ApplyOutcome {
    pub fn after(hook: impl Fn() + Send + Sync + 'static, outcome: ApplyOutcome) -> Self {
        ApplyOutcome::Then(Arc::new(hook), Box::new(outcome))
    }
}

/// Executor that plays back one outcome for every apply
#[derive(Clone)]
pub struct ScriptedExecutor {
    outcome: Arc<Mutex<ApplyOutcome>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedExecutor {
    pub fn new(outcome: ApplyOutcome) -> Self {
        Self {
            outcome: Arc::new(Mutex::new(outcome)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set(&self, outcome: ApplyOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImportExecutor for ScriptedExecutor {
    type Client = FakeClient;

    async fn apply(&self, client: &FakeClient, manifest: &ImportManifest) -> Result<()> {
        assert_eq!(client.cluster, manifest.identity);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut outcome = self.outcome.lock().unwrap().clone();
        loop {
            match outcome {
                ApplyOutcome::Then(hook, next) => {
                    hook();
                    outcome = *next;
                }
                ApplyOutcome::Succeed => return Ok(()),
                ApplyOutcome::Fail(message) => return Err(Error::import(message)),
                ApplyOutcome::CancelDuring(token) => {
                    token.cancel();
                    return std::future::pending().await;
                }
                ApplyOutcome::Hang => return std::future::pending().await,
            }
        }
    }
}

// ============================================================================
// Recorder
// ============================================================================

#[derive(Clone, Default)]
pub struct CapturingRecorder {
    events: Arc<Mutex<Vec<(ClusterIdentity, AuditEvent)>>>,
}

impl CapturingRecorder {
    pub fn events(&self) -> Vec<(ClusterIdentity, AuditEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<&'static str> {
        self.events().into_iter().map(|(_, e)| e.reason).collect()
    }
}

impl Recorder for CapturingRecorder {
    fn event(&self, identity: &ClusterIdentity, event: AuditEvent) {
        self.events.lock().unwrap().push((identity.clone(), event));
    }
}

// ============================================================================
// Harness
// ============================================================================

pub type TestReconciler =
    AutoImportReconciler<MemoryStore, ScriptedFactory, ScriptedExecutor, CapturingRecorder>;

/// Reconciler plus handles onto each of its collaborators
pub struct Harness {
    pub reconciler: TestReconciler,
    pub store: MemoryStore,
    pub factory: ScriptedFactory,
    pub executor: ScriptedExecutor,
    pub recorder: CapturingRecorder,
    pub identity: ClusterIdentity,
}

impl Harness {
    pub fn new(factory: ScriptedFactory, outcome: ApplyOutcome) -> Self {
        let store = MemoryStore::new();
        let executor = ScriptedExecutor::new(outcome);
        let recorder = CapturingRecorder::default();
        let reconciler = AutoImportReconciler::new(
            store.clone(),
            factory.clone(),
            executor.clone(),
            recorder.clone(),
        );
        Self {
            reconciler,
            store,
            factory,
            executor,
            recorder,
            identity: ClusterIdentity::new("cluster1"),
        }
    }

    /// Cluster, credential with `retry` as its counter, and the import manifest
    pub fn seeded(outcome: ApplyOutcome, retry: &str) -> Self {
        let harness = Self::new(ScriptedFactory::connecting(), outcome);
        harness.seed_cluster();
        harness.seed_credential(retry);
        harness.seed_manifest();
        harness
    }

    pub fn seed_cluster(&self) {
        self.store
            .insert_cluster(ClusterRecord::new(self.identity.clone()));
    }

    pub fn seed_credential(&self, retry: &str) {
        self.store.insert_credential(
            BootstrapCredential::new(self.identity.clone())
                .with_data(AUTO_IMPORT_RETRY_KEY, retry)
                .with_data("token", "t0ken")
                .with_data("server", "https://cluster1.example.com:6443"),
        );
    }

    pub fn seed_manifest(&self) {
        self.store.insert_manifest(
            ImportManifest::new(self.identity.clone())
                .with_data("crds.yaml", "")
                .with_data("import.yaml", "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: agent\n"),
        );
    }

    pub async fn reconcile(&self) -> Result<auto_import_controller::reconcilers::ReconcileOutcome> {
        self.reconciler
            .reconcile(&self.identity, &CancellationToken::new())
            .await
    }
}
