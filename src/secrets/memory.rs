//! In-process secret store.
//!
//! Keeps every version of every secret in memory with sequential version ids
//! (`v1`, `v2`, ...). Starts empty, so it holds no admin credentials; it
//! backs library embedding and tests, and `credplane run` refuses it.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::client::SecretStore;
use super::error::{Result, SecretsError};
use super::types::{SecretString, StoredSecret};

#[derive(Debug, Default)]
struct Versions {
    values: Vec<SecretString>,
}

impl Versions {
    fn current(&self) -> Option<StoredSecret> {
        self.values
            .last()
            .map(|value| StoredSecret::new(value.clone(), version_id(self.values.len())))
    }
}

fn version_id(n: usize) -> String {
    format!("v{}", n)
}

/// Versioned in-memory secret store.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, Versions>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a secret with an initial value, replacing any history.
    pub async fn insert(&self, id: impl Into<String>, value: impl Into<SecretString>) {
        let mut secrets = self.secrets.write().await;
        secrets.insert(id.into(), Versions { values: vec![value.into()] });
    }

    /// Number of versions written for `id` (0 if absent).
    pub async fn version_count(&self, id: &str) -> usize {
        self.secrets.read().await.get(id).map_or(0, |v| v.values.len())
    }

    /// Ids of all stored secrets, sorted.
    pub async fn secret_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.secrets.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(SecretsError::invalid_key(id, "secret id cannot be empty"));
    }
    Ok(())
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_secret(&self, id: &str) -> Result<Option<StoredSecret>> {
        validate_id(id)?;
        Ok(self.secrets.read().await.get(id).and_then(Versions::current))
    }

    async fn create_secret(&self, id: &str, value: &str) -> Result<String> {
        validate_id(id)?;
        let mut secrets = self.secrets.write().await;
        if secrets.contains_key(id) {
            return Err(SecretsError::conflict(id, "secret already exists"));
        }
        secrets.insert(id.to_string(), Versions { values: vec![SecretString::new(value)] });
        Ok(version_id(1))
    }

    async fn put_secret_value(&self, id: &str, value: &str) -> Result<String> {
        validate_id(id)?;
        let mut secrets = self.secrets.write().await;
        let versions = secrets.get_mut(id).ok_or_else(|| SecretsError::not_found(id))?;
        versions.values.push(SecretString::new(value));
        Ok(version_id(versions.values.len()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
