//! Per-instance provisioning failures.
//!
//! None of these abort a run: each is recorded against its instance in the
//! [`RunReport`](super::RunReport) and the remaining instances carry on.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::database::DatabaseError;
use crate::secrets::SecretsError;

#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The instance could not be reached; nothing was changed
    #[error("connection failed: {reason}")]
    Connection { reason: String },

    /// A user-management statement failed; no secret was written
    #[error("database mutation failed: {0}")]
    DatabaseMutation(#[from] DatabaseError),

    /// The secret store failed before anything was changed
    #[error("secret store failed: {0}")]
    SecretStore(#[source] SecretsError),

    /// The database password was changed but the secret write failed; the
    /// stored secret is stale until a forced re-run
    #[error("secret store failed after the database was changed: {0}")]
    SecretDrift(#[source] SecretsError),

    /// The run was cancelled before this instance converged
    #[error("cancelled before {stage}")]
    Cancelled { stage: &'static str },
}

impl ProvisionError {
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection { reason: reason.into() }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::DatabaseMutation(_) => "database_mutation",
            Self::SecretStore(_) => "secret_store",
            Self::SecretDrift(_) => "secret_drift",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_drift(&self) -> bool {
        matches!(self, Self::SecretDrift(_))
    }

    /// Whether a plain re-run is likely to succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::DatabaseMutation(e) => e.is_connection_failure(),
            Self::SecretStore(e) | Self::SecretDrift(e) => e.is_transient(),
            Self::Cancelled { .. } => false,
        }
    }
}

impl Serialize for ProvisionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ProvisionError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
