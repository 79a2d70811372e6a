//! Fake database fleet and secret store wrappers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use credplane::credentials::Credential;
use credplane::database::{CredentialProber, DatabaseError, ProbeOutcome, UserManager};
use credplane::inventory::InstanceRecord;
use credplane::secrets::{InMemorySecretStore, SecretStore, SecretsError, StoredSecret};

/// State of one fake instance.
#[derive(Debug, Clone, Default)]
pub struct FakeInstance {
    pub reachable: bool,
    /// Current password of the managed user; `None` when the user is missing
    pub password: Option<String>,
    /// Delay applied to every probe, for ordering tests
    pub probe_delay: Duration,
}

impl FakeInstance {
    pub fn missing_user() -> Self {
        Self { reachable: true, ..Default::default() }
    }

    pub fn with_password(password: &str) -> Self {
        Self { reachable: true, password: Some(password.to_string()), ..Default::default() }
    }

    pub fn unreachable() -> Self {
        Self { reachable: false, ..Default::default() }
    }
}

/// In-memory fleet implementing both database capabilities.
#[derive(Debug, Default)]
pub struct FakeFleet {
    instances: Mutex<HashMap<String, FakeInstance>>,
    probes: Mutex<Vec<String>>,
    mutations: Mutex<Vec<(String, &'static str)>>,
    fail_mutations: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFleet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(self: &Arc<Self>, id: &str, instance: FakeInstance) -> Arc<Self> {
        self.instances.lock().unwrap().insert(id.to_string(), instance);
        self.clone()
    }

    pub fn password(&self, id: &str) -> Option<String> {
        self.instances.lock().unwrap().get(id).and_then(|i| i.password.clone())
    }

    pub fn probed(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<(String, &'static str)> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn fail_mutations(&self) {
        self.fail_mutations.store(true, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn state(&self, id: &str) -> FakeInstance {
        self.instances.lock().unwrap().get(id).cloned().unwrap_or_default()
    }

    fn mutate(&self, instance: &InstanceRecord, credential: &Credential, kind: &'static str) -> Result<(), DatabaseError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(DatabaseError::connection(&instance.identifier, "injected failure"));
        }
        let password = credential
            .password()
            .ok_or_else(|| DatabaseError::invalid_input("password", "missing"))?
            .expose_secret()
            .to_string();

        let mut instances = self.instances.lock().unwrap();
        let state = instances.entry(instance.identifier.clone()).or_default();
        let exists = state.password.is_some();
        if (kind == "CREATE USER" && exists) || (kind == "ALTER USER" && !exists) {
            return Err(DatabaseError::invalid_input("user", format!("{} in wrong state", kind)));
        }
        state.password = Some(password);
        drop(instances);
        self.mutations.lock().unwrap().push((instance.identifier.clone(), kind));
        Ok(())
    }
}

#[async_trait]
impl CredentialProber for FakeFleet {
    async fn probe(&self, instance: &InstanceRecord, credential: &Credential, cancel: &CancellationToken) -> ProbeOutcome {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let state = self.state(&instance.identifier);
        tokio::select! {
            _ = tokio::time::sleep(state.probe_delay) => {}
            _ = cancel.cancelled() => {}
        }
        self.probes.lock().unwrap().push(instance.identifier.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            return ProbeOutcome::connection_error("cancelled");
        }
        if !state.reachable {
            return ProbeOutcome::connection_error("connection refused");
        }
        match (&state.password, credential.password()) {
            (None, _) => ProbeOutcome::UserMissing,
            (Some(actual), Some(candidate)) if actual == candidate.expose_secret() => ProbeOutcome::Authenticated,
            (Some(_), _) => ProbeOutcome::AuthenticationFailed,
        }
    }
}

#[async_trait]
impl UserManager for FakeFleet {
    async fn create_user(&self, instance: &InstanceRecord, credential: &Credential, _: &CancellationToken) -> Result<(), DatabaseError> {
        self.mutate(instance, credential, "CREATE USER")
    }

    async fn alter_user_password(
        &self,
        instance: &InstanceRecord,
        credential: &Credential,
        _: &CancellationToken,
    ) -> Result<(), DatabaseError> {
        self.mutate(instance, credential, "ALTER USER")
    }
}

/// Memory store that can be told to reject reads or writes.
#[derive(Default)]
pub struct FailingSecretStore {
    pub inner: InMemorySecretStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FailingSecretStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Write attempts, successful or not.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for FailingSecretStore {
    async fn get_secret(&self, id: &str) -> credplane::secrets::Result<Option<StoredSecret>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SecretsError::access_denied(format!("GetSecretValue on {}", id)));
        }
        self.inner.get_secret(id).await
    }

    async fn create_secret(&self, id: &str, value: &str) -> credplane::secrets::Result<String> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SecretsError::access_denied(format!("CreateSecret on {}", id)));
        }
        self.inner.create_secret(id, value).await
    }

    async fn put_secret_value(&self, id: &str, value: &str) -> credplane::secrets::Result<String> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SecretsError::access_denied(format!("PutSecretValue on {}", id)));
        }
        self.inner.put_secret_value(id, value).await
    }

    fn backend_name(&self) -> &'static str {
        "failing-memory"
    }
}
