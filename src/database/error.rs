//! Errors raised while changing users on a database instance.

use thiserror::Error;

/// User-management failure on one instance.
///
/// Messages name the statement kind, never the statement text, because the
/// text carries the password.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Could not open the administrative session
    #[error("Cannot connect to {instance}: {message}")]
    Connection { instance: String, message: String },

    /// A user-management statement failed
    #[error("{statement} failed on {instance}: {source}")]
    Statement {
        instance: String,
        statement: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A value cannot be embedded in a statement
    #[error("Invalid {what}: {reason}")]
    InvalidInput { what: &'static str, reason: String },

    #[error("{operation} on {instance} timed out after {duration_ms}ms")]
    Timeout { instance: String, operation: &'static str, duration_ms: u64 },

    #[error("{operation} on {instance} cancelled")]
    Cancelled { instance: String, operation: &'static str },
}

impl DatabaseError {
    pub fn connection(instance: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection { instance: instance.into(), message: message.into() }
    }

    pub fn statement(instance: impl Into<String>, statement: &'static str, source: sqlx::Error) -> Self {
        Self::Statement { instance: instance.into(), statement, source }
    }

    pub fn invalid_input(what: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput { what, reason: reason.into() }
    }

    /// True if the failure happened before any statement reached the server.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { operation: "connect", .. })
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
