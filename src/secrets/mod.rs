//! Secret store abstraction for credential material.
//!
//! The [`SecretStore`] trait is the narrow surface every backend offers
//! (read current version, create, write new version). On top of it the
//! [`SecretSynchronizer`] implements the idempotent upsert the provisioning
//! engine relies on.
//!
//! # Supported Backends
//!
//! - **Memory**: versioned in-process store for embedding and tests
//! - **HashiCorp Vault**: KV v2 engine, version id = KV version number
//! - **AWS Secrets Manager**: behind the `aws` feature
//!
//! # Security Considerations
//!
//! - Secret values travel as [`SecretString`], which redacts itself in
//!   `Debug`, `Display` and `Serialize`
//! - Errors carry secret ids, never values

#[cfg(feature = "aws")]
pub mod aws;
pub mod client;
pub mod error;
pub mod memory;
pub mod sync;
pub mod types;
pub mod vault;

use std::sync::Arc;

#[cfg(feature = "aws")]
pub use aws::AwsSecretStore;
pub use client::SecretStore;
pub use error::{Result, SecretsError};
pub use memory::InMemorySecretStore;
pub use sync::{SecretSynchronizer, SyncAction, SyncOutcome};
pub use types::{SecretString, StoredSecret};
pub use vault::{VaultConfig, VaultSecretStore};

use crate::config::{SecretBackendKind, SecretsConfig};

/// Build the secret store selected in configuration.
pub async fn build_secret_store(config: &SecretsConfig) -> Result<Arc<dyn SecretStore>> {
    let store: Arc<dyn SecretStore> = match config.backend {
        SecretBackendKind::Memory => {
            tracing::warn!("Using in-memory secret store; credentials will not outlive this process");
            Arc::new(InMemorySecretStore::new())
        }
        SecretBackendKind::Vault => Arc::new(VaultSecretStore::new(config.vault.clone()).await?),
        #[cfg(feature = "aws")]
        SecretBackendKind::Aws => {
            let sdk_config = crate::config::aws::load_sdk_config(config.aws_region.as_deref()).await;
            Arc::new(AwsSecretStore::new(&sdk_config))
        }
        #[cfg(not(feature = "aws"))]
        SecretBackendKind::Aws => {
            return Err(SecretsError::config_error(
                "secrets.backend = aws requires building with the `aws` feature",
            ))
        }
    };
    Ok(store)
}
