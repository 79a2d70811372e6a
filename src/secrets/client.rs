//! Core secret store trait.

use async_trait::async_trait;

use super::error::Result;
use super::types::StoredSecret;

/// Trait for secret store backends.
///
/// Mirrors the three calls every supported backend offers: read the current
/// version, create a secret that does not exist yet, and write a new version
/// of an existing secret. Version ids are opaque strings defined by the
/// backend.
///
/// # Security Considerations
///
/// - Implementations MUST NOT log secret values
/// - Network communication MUST use TLS
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read the current version of a secret.
    ///
    /// Returns `Ok(None)` when no secret exists under `id`.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::AccessDenied`](super::SecretsError::AccessDenied) if the caller lacks permission
    /// - [`SecretsError::ConnectionFailed`](super::SecretsError::ConnectionFailed) if the store is unreachable
    async fn get_secret(&self, id: &str) -> Result<Option<StoredSecret>>;

    /// Create a new secret and return the id of its first version.
    ///
    /// Fails if a secret already exists under `id`.
    async fn create_secret(&self, id: &str, value: &str) -> Result<String>;

    /// Write a new version of an existing secret and return its version id.
    ///
    /// The previous version is superseded; retention is up to the store.
    async fn put_secret_value(&self, id: &str, value: &str) -> Result<String>;

    /// Short backend name used in logs.
    fn backend_name(&self) -> &'static str;
}
