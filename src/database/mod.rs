//! # Database Access
//!
//! The two capabilities the provisioning engine needs from an instance:
//!
//! - [`CredentialProber`]: log in as the managed user and report a
//!   [`ProbeOutcome`]
//! - [`UserManager`]: create the managed user or change its password
//!
//! Both are traits so the engine can be driven against fakes in tests; the
//! PostgreSQL implementation lives in [`postgres`].

pub mod error;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::credentials::Credential;
use crate::inventory::InstanceRecord;

pub use error::DatabaseError;
pub use postgres::{quote_identifier, quote_literal, PostgresAdmin};

/// Result of trying to authenticate as the managed user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum ProbeOutcome {
    /// Login with the candidate password succeeded
    Authenticated,
    /// The user exists but the candidate password was rejected or unknown
    AuthenticationFailed,
    /// The user does not exist on the instance
    UserMissing,
    /// The instance could not be reached or the admin login failed
    ConnectionError(String),
}

impl ProbeOutcome {
    pub fn connection_error(reason: impl Into<String>) -> Self {
        Self::ConnectionError(reason.into())
    }

    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::AuthenticationFailed => "authentication_failed",
            Self::UserMissing => "user_missing",
            Self::ConnectionError(_) => "connection_error",
        }
    }

    /// True when the managed user is known to exist.
    pub fn user_exists(&self) -> bool {
        matches!(self, Self::Authenticated | Self::AuthenticationFailed)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionError(reason) => write!(f, "connection_error ({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Verifies a credential against a live instance.
///
/// Implementations open at most a few transient connections, bound each by a
/// timeout, and close every one of them before returning.
#[async_trait]
pub trait CredentialProber: Send + Sync {
    async fn probe(
        &self,
        instance: &InstanceRecord,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> ProbeOutcome;
}

/// Issues user-management statements against an instance.
#[async_trait]
pub trait UserManager: Send + Sync {
    /// Create the managed user with the credential's password.
    async fn create_user(
        &self,
        instance: &InstanceRecord,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> error::Result<()>;

    /// Set a new password on an existing user.
    async fn alter_user_password(
        &self,
        instance: &InstanceRecord,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> error::Result<()>;
}
