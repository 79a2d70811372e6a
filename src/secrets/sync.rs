//! Idempotent credential persistence.
//!
//! [`SecretSynchronizer::upsert`] is the only path by which the provisioning
//! engine writes credential material:
//!
//! | secret exists | `force` | result |
//! |---|---|---|
//! | no  | any   | created (first version) |
//! | yes | false | untouched, existing version returned |
//! | yes | true  | new version written, old one superseded |
//!
//! Every remote call is bounded by the configured timeout and aborts when the
//! run's cancellation token fires.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::client::SecretStore;
use super::error::{Result, SecretsError};
use super::types::StoredSecret;
use crate::credentials::{password_from_payload, render_payload, Credential, SecretId};
use crate::inventory::InstanceRecord;
use crate::utils::{bounded, duration_ms, Bounded};

fn holds_password(stored: &StoredSecret, credential: &Credential) -> bool {
    match (password_from_payload(&stored.value), credential.password()) {
        (Some(stored), Some(ours)) => stored.expose_secret() == ours.expose_secret(),
        _ => false,
    }
}

/// What an upsert did to the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Unchanged,
    Updated,
}

/// Outcome of [`SecretSynchronizer::upsert`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub action: SyncAction,
    pub version_id: String,
}

/// Writes credentials to a [`SecretStore`] under their derived secret ids.
#[derive(Clone)]
pub struct SecretSynchronizer {
    store: Arc<dyn SecretStore>,
    timeout: Duration,
}

impl SecretSynchronizer {
    pub fn new(store: Arc<dyn SecretStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    async fn call<F, T>(&self, operation: &str, cancel: &CancellationToken, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match bounded(fut, self.timeout, cancel).await {
            Bounded::Completed(result) => result,
            Bounded::TimedOut => Err(SecretsError::timeout(operation, duration_ms(self.timeout))),
            Bounded::Cancelled => Err(SecretsError::cancelled(operation)),
        }
    }

    /// Read the current stored value for a secret id.
    pub async fn current(
        &self,
        secret_id: &SecretId,
        cancel: &CancellationToken,
    ) -> Result<Option<StoredSecret>> {
        self.call("get_secret", cancel, self.store.get_secret(secret_id.as_str())).await
    }

    /// Persist `credential` for `instance`.
    pub async fn upsert(
        &self,
        credential: &Credential,
        instance: &InstanceRecord,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let id = credential.secret_id().as_str();
        let existing = self.current(credential.secret_id(), cancel).await?;

        match existing {
            None => {
                let payload = render_payload(None, credential, instance)?;
                let created = self
                    .call(
                        "create_secret",
                        cancel,
                        self.store.create_secret(id, payload.expose_secret()),
                    )
                    .await;

                match created {
                    Ok(version_id) => {
                        tracing::debug!(secret_id = %id, version = %version_id, "Created secret");
                        Ok(SyncOutcome { action: SyncAction::Created, version_id })
                    }
                    Err(create_err) => {
                        // a concurrent writer may have created it first
                        match self.current(credential.secret_id(), cancel).await {
                            Ok(Some(stored)) if !force && holds_password(&stored, credential) => {
                                Ok(SyncOutcome { action: SyncAction::Unchanged, version_id: stored.version_id })
                            }
                            Ok(Some(_)) if !force => Err(create_err),
                            Ok(Some(stored)) => self.overwrite(credential, instance, &stored, cancel).await,
                            _ => Err(create_err),
                        }
                    }
                }
            }
            Some(stored) if !force => {
                tracing::debug!(secret_id = %id, version = %stored.version_id, "Secret exists, leaving untouched");
                Ok(SyncOutcome { action: SyncAction::Unchanged, version_id: stored.version_id })
            }
            Some(stored) => self.overwrite(credential, instance, &stored, cancel).await,
        }
    }

    async fn overwrite(
        &self,
        credential: &Credential,
        instance: &InstanceRecord,
        stored: &StoredSecret,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let id = credential.secret_id().as_str();
        let payload = render_payload(Some(&stored.value), credential, instance)?;
        let version_id = self
            .call("put_secret_value", cancel, self.store.put_secret_value(id, payload.expose_secret()))
            .await?;

        tracing::debug!(
            secret_id = %id,
            previous_version = %stored.version_id,
            version = %version_id,
            "Wrote new secret version"
        );
        Ok(SyncOutcome { action: SyncAction::Updated, version_id })
    }
}
