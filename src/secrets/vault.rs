//! HashiCorp Vault secret store backed by the KV v2 engine.
//!
//! Each credential is stored at `<mount>/<secret id>` as a map with a single
//! `value` field holding the JSON payload. The KV v2 version number is used
//! as the version id, so a forced overwrite yields `"2"`, `"3"`, and so on.
//! Writes use KV v2 check-and-set, so a racing writer surfaces as
//! [`SecretsError::Conflict`] instead of a silent extra version.
//!
//! # Example
//!
//! ```rust,ignore
//! use credplane::secrets::{VaultConfig, VaultSecretStore};
//!
//! let store = VaultSecretStore::new(VaultConfig {
//!     address: "https://vault.example.com".to_string(),
//!     token: Some("vault-token".into()),
//!     namespace: None,
//!     mount_path: "secret".to_string(),
//! }).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vaultrs::api::kv2::requests::SetSecretRequestOptions;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use super::client::SecretStore;
use super::error::{Result, SecretsError};
use super::types::{SecretString, StoredSecret};

/// Field name under which the payload is stored in each KV entry.
const VALUE_FIELD: &str = "value";

/// Configuration for connecting to Vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault server address, e.g. `https://vault.example.com:8200`
    pub address: String,

    /// Authentication token. Falls back to `VAULT_TOKEN` when unset.
    pub token: Option<SecretString>,

    /// Vault Enterprise namespace
    pub namespace: Option<String>,

    /// KV v2 mount path
    pub mount_path: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            mount_path: "secret".to_string(),
        }
    }
}

/// Vault KV v2 secret store.
pub struct VaultSecretStore {
    client: VaultClient,
    mount_path: String,
}

impl VaultSecretStore {
    /// Builds a client and checks that Vault answers its health endpoint.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::ConfigError`] if the configuration is invalid
    /// - [`SecretsError::ConnectionFailed`] if Vault is unreachable
    pub async fn new(config: VaultConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(SecretsError::config_error("Vault address cannot be empty"));
        }

        let token = match config.token {
            Some(token) => token,
            None => std::env::var("VAULT_TOKEN").map(SecretString::new).map_err(|_| {
                SecretsError::config_error("Vault token not configured and VAULT_TOKEN not set")
            })?,
        };

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder
            .address(&config.address)
            .token(token.expose_secret());

        if let Some(namespace) = config.namespace {
            settings_builder.namespace(Some(namespace));
        }

        let settings = settings_builder.build().map_err(|e| {
            SecretsError::config_error(format!("Invalid Vault configuration: {}", e))
        })?;

        let client = VaultClient::new(settings).map_err(|e| {
            SecretsError::connection_failed(format!("Failed to create Vault client: {}", e))
        })?;

        match vaultrs::sys::health(&client).await {
            Ok(_) => {
                tracing::info!(address = %config.address, "Connected to Vault");
            }
            Err(e) => {
                tracing::error!(error = %e, address = %config.address, "Failed to connect to Vault");
                return Err(SecretsError::connection_failed(format!(
                    "Vault health check failed: {}",
                    e
                )));
            }
        }

        Ok(Self { client, mount_path: config.mount_path })
    }

    async fn current_version(&self, id: &str) -> Result<Option<u64>> {
        match kv2::read_metadata(&self.client, &self.mount_path, id).await {
            Ok(metadata) => Ok(Some(metadata.current_version)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(map_client_error(id, e)),
        }
    }

    /// Check-and-set write: `cas = 0` only succeeds when the key is new,
    /// otherwise `cas` must equal the current version.
    async fn write(&self, id: &str, value: &str, cas: u64) -> Result<String> {
        let cas = u32::try_from(cas)
            .map_err(|_| SecretsError::backend_error(format!("Version {} of '{}' out of range", cas, id)))?;
        let mut data = HashMap::new();
        data.insert(VALUE_FIELD.to_string(), value.to_string());

        let metadata = kv2::set_with_options(&self.client, &self.mount_path, id, &data, SetSecretRequestOptions { cas })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, secret_id = %id, "Failed to write secret to Vault");
                map_client_error(id, e)
            })?;

        Ok(metadata.version.to_string())
    }
}

fn is_not_found(error: &ClientError) -> bool {
    matches!(error, ClientError::APIError { code: 404, .. })
}

fn is_cas_mismatch(error: &ClientError) -> bool {
    match error {
        ClientError::APIError { code: 400, errors } => errors.iter().any(|e| e.contains("check-and-set")),
        _ => false,
    }
}

fn map_client_error(id: &str, error: ClientError) -> SecretsError {
    if is_cas_mismatch(&error) {
        return SecretsError::conflict(id, "secret was written concurrently");
    }
    match error {
        ClientError::APIError { code: 404, .. } => SecretsError::not_found(id),
        ClientError::APIError { code: 403, .. } => {
            SecretsError::access_denied(format!("Vault denied access to '{}'", id))
        }
        ClientError::APIError { code, errors } if code >= 500 => SecretsError::connection_failed(
            format!("Vault returned {} for '{}': {}", code, id, errors.join("; ")),
        ),
        other => SecretsError::backend_error(format!("Vault request for '{}' failed: {}", id, other)),
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn get_secret(&self, id: &str) -> Result<Option<StoredSecret>> {
        let Some(version) = self.current_version(id).await? else {
            return Ok(None);
        };

        let data: HashMap<String, String> =
            match kv2::read_version(&self.client, &self.mount_path, id, version).await {
                Ok(data) => data,
                // current version soft-deleted
                Err(e) if is_not_found(&e) => return Ok(None),
                Err(e) => return Err(map_client_error(id, e)),
            };

        let value = data.get(VALUE_FIELD).cloned().ok_or_else(|| {
            SecretsError::invalid_value(id, format!("missing '{}' field", VALUE_FIELD))
        })?;

        Ok(Some(StoredSecret::new(value, version.to_string())))
    }

    async fn create_secret(&self, id: &str, value: &str) -> Result<String> {
        // a soft-deleted current version may be written over; anything live is a conflict
        let cas = match self.current_version(id).await? {
            None => 0,
            Some(version) if self.get_secret(id).await?.is_none() => version,
            Some(_) => return Err(SecretsError::conflict(id, "secret already exists")),
        };
        let version = self.write(id, value, cas).await?;
        tracing::info!(secret_id = %id, mount_path = %self.mount_path, version = %version, "Created secret in Vault");
        Ok(version)
    }

    async fn put_secret_value(&self, id: &str, value: &str) -> Result<String> {
        let Some(current) = self.current_version(id).await? else {
            return Err(SecretsError::not_found(id));
        };
        let version = self.write(id, value, current).await?;
        tracing::info!(secret_id = %id, mount_path = %self.mount_path, version = %version, "Wrote new secret version to Vault");
        Ok(version)
    }

    fn backend_name(&self) -> &'static str {
        "vault"
    }
}
