//! The per-instance provisioning state machine.
//!
//! ```text
//! Classify ──replica──────────────────────────────► Record
//!    │
//!    ▼
//!  Probe ──► Decide ──skip / no-op / unreachable──► Record
//!               │
//!               ▼
//!             Apply (password, user statement, secret upsert) ──► Record
//! ```
//!
//! Each instance runs its own machine. Machines share nothing but the
//! collaborators, which are read-only, and the report, which only receives
//! finished entries. Instances are driven through a bounded `futures` stream
//! so the report keeps inventory order whatever the concurrency.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::decision::{classify, decide, Decision, RunMode};
use super::error::ProvisionError;
use super::report::{ReportEntry, RunReport};
use crate::credentials::{password_from_payload, Credential, PasswordGenerator, SecretId};
use crate::database::{CredentialProber, ProbeOutcome, UserManager};
use crate::errors::Result;
use crate::inventory::{InstanceInventory, InstanceRecord};
use crate::instance_span;
use crate::observability::ProvisioningMetrics;
use crate::secrets::{SecretSynchronizer, SecretString, SecretsError};

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub username: String,
    pub secret_id_template: String,
    pub concurrency: usize,
}

impl RunConfig {
    pub fn new(mode: RunMode, username: impl Into<String>) -> Self {
        Self {
            mode,
            username: username.into(),
            secret_id_template: "secret/{instance}".to_string(),
            concurrency: 1,
        }
    }

    pub fn with_secret_id_template(mut self, template: impl Into<String>) -> Self {
        self.secret_id_template = template.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Everything the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub inventory: InstanceInventory,
    pub prober: Arc<dyn CredentialProber>,
    pub users: Arc<dyn UserManager>,
    pub secrets: SecretSynchronizer,
    pub generator: PasswordGenerator,
}

/// What the secret store held for the instance before probing.
enum StoredCredential {
    Absent,
    Password(SecretString),
    /// A secret exists but holds no recognisable password
    Unusable,
    ReadFailed(SecretsError),
}

/// States of one instance's machine. Each carries what the next step needs.
enum State {
    Classify,
    Probe,
    Decide { probe: ProbeOutcome, stored: StoredCredential },
    Apply { decision: Decision, probe: ProbeOutcome, password: Option<SecretString> },
    Record(ReportEntry),
}

/// Converges a fleet to the desired managed credential.
pub struct ProvisioningEngine {
    config: RunConfig,
    parts: Collaborators,
    metrics: ProvisioningMetrics,
}

impl ProvisioningEngine {
    pub fn new(config: RunConfig, parts: Collaborators) -> Self {
        Self { config, parts, metrics: ProvisioningMetrics::new() }
    }

    pub fn mode(&self) -> RunMode {
        self.config.mode
    }

    /// Run every instance the inventory lists.
    ///
    /// Only a discovery failure aborts the run; everything else is recorded
    /// against the instance it happened on.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let instances = self.parts.inventory.list().await?;
        tracing::info!(
            mode = %self.config.mode,
            instances = instances.len(),
            concurrency = self.config.concurrency,
            "Starting provisioning run"
        );
        Ok(self.run_instances(&instances, cancel).await)
    }

    /// Run the given instances, recording results in input order.
    pub async fn run_instances(&self, instances: &[InstanceRecord], cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::new(self.config.mode);
        let entries: Vec<ReportEntry> = stream::iter(instances)
            .map(|instance| self.provision(instance, cancel))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        for entry in entries {
            report.record(entry);
        }
        report.finish();

        let summary = report.summary();
        tracing::info!(
            total = summary.total,
            skipped = summary.skipped,
            unchanged = summary.unchanged,
            created = summary.created,
            updated = summary.updated,
            errored = summary.errored,
            "Provisioning run finished"
        );
        report
    }

    async fn provision(&self, instance: &InstanceRecord, cancel: &CancellationToken) -> ReportEntry {
        let span = instance_span!(instance.identifier, self.config.mode, engine = %instance.engine);
        async {
            let entry = self.drive(instance, cancel).await;
            tracing::Span::current().record("decision", entry.decision.as_str());
            self.log_entry(&entry);
            entry
        }
        .instrument(span)
        .await
    }

    fn secret_id(&self, instance: &InstanceRecord) -> SecretId {
        SecretId::derive(&self.config.secret_id_template, &instance.identifier, &self.config.username)
    }

    async fn drive(&self, instance: &InstanceRecord, cancel: &CancellationToken) -> ReportEntry {
        let mut state = State::Classify;
        loop {
            state = match state {
                State::Classify => match classify(instance) {
                    Some(decision) => State::Record(ReportEntry::new(&instance.identifier, decision)),
                    None => State::Probe,
                },
                State::Probe => self.probe(instance, cancel).await,
                State::Decide { probe, stored } => self.decide(instance, probe, stored, cancel),
                State::Apply { decision, probe, password } => {
                    self.apply(instance, decision, probe, password, cancel).await
                }
                State::Record(entry) => {
                    self.metrics.record_decision(entry.decision);
                    if let Some(error) = &entry.error {
                        self.metrics.record_error(error);
                    }
                    return entry;
                }
            };
        }
    }

    async fn probe(&self, instance: &InstanceRecord, cancel: &CancellationToken) -> State {
        let secret_id = self.secret_id(instance);
        let stored = match self.parts.secrets.current(&secret_id, cancel).await {
            Ok(None) => StoredCredential::Absent,
            Ok(Some(secret)) => match password_from_payload(&secret.value) {
                Some(password) => StoredCredential::Password(password),
                None => StoredCredential::Unusable,
            },
            Err(e) => StoredCredential::ReadFailed(e),
        };

        let mut candidate = Credential::new(&self.config.username, secret_id);
        if let StoredCredential::Password(password) = &stored {
            candidate = candidate.with_password(password.clone());
        }

        let probe = self.parts.prober.probe(instance, &candidate, cancel).await;
        self.metrics.record_probe(&probe);
        tracing::debug!(probe = %probe, "Probed managed user");

        State::Decide { probe, stored }
    }

    fn decide(
        &self,
        instance: &InstanceRecord,
        probe: ProbeOutcome,
        stored: StoredCredential,
        cancel: &CancellationToken,
    ) -> State {
        let decision = decide(self.config.mode, &probe);
        let record = |error: Option<ProvisionError>, probe: ProbeOutcome| {
            State::Record(ReportEntry::new(&instance.identifier, decision).with_probe(probe).with_error(error))
        };

        let unreachable = match &probe {
            ProbeOutcome::ConnectionError(_) if cancel.is_cancelled() => {
                Some(ProvisionError::Cancelled { stage: "probe" })
            }
            ProbeOutcome::ConnectionError(reason) => Some(ProvisionError::connection(reason.clone())),
            _ => None,
        };

        // force always generates a fresh password, so only default-mode creates look at the stored one
        let adopting = decision == Decision::CreateUser && self.config.mode != RunMode::Force;
        let (stored_error, password) = match stored {
            StoredCredential::ReadFailed(e) => (Some(ProvisionError::SecretStore(e)), None),
            StoredCredential::Unusable if adopting => (
                Some(ProvisionError::SecretStore(SecretsError::invalid_value(
                    self.secret_id(instance).as_str(),
                    "existing secret holds no password; re-run with force",
                ))),
                None,
            ),
            // create adopts an already stored password so the secret stays valid
            StoredCredential::Password(password) if adopting => (None, Some(password)),
            _ => (None, None),
        };

        if !decision.is_apply() {
            return record(unreachable.or(stored_error), probe);
        }
        if let Some(error) = stored_error {
            return record(Some(error), probe);
        }
        if cancel.is_cancelled() {
            return record(Some(ProvisionError::Cancelled { stage: "apply" }), probe);
        }

        State::Apply { decision, probe, password }
    }

    async fn apply(
        &self,
        instance: &InstanceRecord,
        decision: Decision,
        probe: ProbeOutcome,
        password: Option<SecretString>,
        cancel: &CancellationToken,
    ) -> State {
        let entry = ReportEntry::new(&instance.identifier, decision).with_probe(probe);
        let password = password.unwrap_or_else(|| self.parts.generator.generate());
        let credential = Credential::new(&self.config.username, self.secret_id(instance)).with_password(password);

        let mutation = match decision {
            Decision::ForceUpdateUser => self.parts.users.alter_user_password(instance, &credential, cancel).await,
            _ => self.parts.users.create_user(instance, &credential, cancel).await,
        };
        if let Err(e) = mutation {
            return State::Record(entry.with_error(Some(ProvisionError::DatabaseMutation(e))));
        }

        let force = self.config.mode == RunMode::Force;
        match self.parts.secrets.upsert(&credential, instance, force, cancel).await {
            Ok(outcome) => State::Record(entry.with_secret(outcome)),
            Err(e) => State::Record(entry.with_error(Some(ProvisionError::SecretDrift(e)))),
        }
    }

    fn log_entry(&self, entry: &ReportEntry) {
        let probe = entry.probe.as_ref().map(ProbeOutcome::as_str).unwrap_or("none");
        let version = entry.secret.as_ref().map(|s| s.version_id.as_str()).unwrap_or("-");

        match &entry.error {
            Some(error) if error.is_drift() => tracing::error!(
                instance = %entry.instance,
                decision = %entry.decision,
                probe,
                error = %error,
                "Database password changed but secret not updated; re-run with --force to reconcile"
            ),
            Some(error) => tracing::error!(
                instance = %entry.instance,
                decision = %entry.decision,
                probe,
                error = %error,
                retryable = error.is_transient(),
                "Instance failed"
            ),
            None if entry.probe == Some(ProbeOutcome::AuthenticationFailed) => tracing::warn!(
                instance = %entry.instance,
                decision = %entry.decision,
                probe,
                "Managed user exists but the stored password does not authenticate"
            ),
            None => tracing::info!(
                instance = %entry.instance,
                decision = %entry.decision,
                probe,
                secret_version = version,
                "Instance done"
            ),
        }
    }
}
