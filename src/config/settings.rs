//! # Configuration Settings
//!
//! Defines the configuration structure for credplane.

use crate::credentials::{PasswordPolicy, INSTANCE_PLACEHOLDER, POSTGRES_SYMBOLS};
use crate::errors::{CredplaneError, Result};
use crate::inventory::InstanceDescriptor;
use crate::secrets::VaultConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// What to provision and how
    #[validate(nested)]
    pub provisioning: ProvisioningConfig,

    /// Database connection settings
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Secret store settings
    #[validate(nested)]
    pub secrets: SecretsConfig,

    /// Where instances come from
    #[validate(nested)]
    pub inventory: InventoryConfig,

    /// Logging settings
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(CredplaneError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Checks the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        if !self.provisioning.secret_id_template.contains(INSTANCE_PLACEHOLDER) {
            return Err(CredplaneError::validation_field(
                "secret id template must contain {instance}",
                "provisioning.secret_id_template",
            ));
        }

        if !self.database.admin_secret_template.contains(INSTANCE_PLACEHOLDER) {
            return Err(CredplaneError::validation_field(
                "admin secret template must contain {instance}",
                "database.admin_secret_template",
            ));
        }

        if self.database.admin_username == self.provisioning.username {
            return Err(CredplaneError::validation_field(
                "managed username cannot be the admin username",
                "provisioning.username",
            ));
        }

        if self.inventory.source == InventorySource::Static && self.inventory.instances.is_empty() {
            return Err(CredplaneError::validation_field(
                "static inventory requires at least one instance",
                "inventory.instances",
            ));
        }

        self.provisioning.password_policy()?;

        Ok(())
    }
}

/// Provisioning behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Managed database user
    #[validate(length(min = 1, max = 63, message = "Username must be 1-63 characters"))]
    pub username: String,

    /// Secret id template; `{instance}` and `{username}` are expanded
    #[validate(length(min = 1, message = "Secret id template cannot be empty"))]
    pub secret_id_template: String,

    /// Generated password length
    #[validate(range(min = 16, max = 128, message = "Password length must be between 16 and 128"))]
    pub password_length: usize,

    /// Symbols allowed in generated passwords
    pub password_symbols: String,

    /// Instances processed at once
    #[validate(range(min = 1, max = 64, message = "Concurrency must be between 1 and 64"))]
    pub concurrency: usize,

    /// Grant the managed user all privileges on the instance database
    pub grant_database_privileges: bool,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            username: "app_service".to_string(),
            secret_id_template: "secret/{instance}".to_string(),
            password_length: 24,
            password_symbols: POSTGRES_SYMBOLS.to_string(),
            concurrency: 4,
            grant_database_privileges: true,
        }
    }
}

impl ProvisioningConfig {
    /// Password policy described by this section
    pub fn password_policy(&self) -> Result<PasswordPolicy> {
        PasswordPolicy::new(self.password_length, &self.password_symbols)
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Administrative login used for user management
    #[validate(length(min = 1, message = "Admin username cannot be empty"))]
    pub admin_username: String,

    /// Secret id holding the admin password; `{instance}` is expanded
    #[validate(length(min = 1, message = "Admin secret template cannot be empty"))]
    pub admin_secret_template: String,

    /// Database to connect to when the instance advertises none
    #[validate(length(min = 1, message = "Default database cannot be empty"))]
    pub default_database: String,

    /// Connect and login timeout in seconds
    #[validate(range(min = 1, max = 60, message = "Connect timeout must be between 1 and 60 seconds"))]
    pub connect_timeout_seconds: u64,

    /// Require TLS for database connections
    pub require_tls: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".to_string(),
            admin_secret_template: "{instance}-db-admin-Password".to_string(),
            default_database: "postgres".to_string(),
            connect_timeout_seconds: 5,
            require_tls: false,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Secret store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackendKind {
    #[default]
    Memory,
    Vault,
    Aws,
}

/// Secret store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SecretsConfig {
    pub backend: SecretBackendKind,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 120, message = "Request timeout must be between 1 and 120 seconds"))]
    pub request_timeout_seconds: u64,

    /// Vault settings, used when `backend = vault`
    pub vault: VaultConfig,

    /// AWS region, used when `backend = aws`
    pub aws_region: Option<String>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: SecretBackendKind::Memory,
            request_timeout_seconds: 10,
            vault: VaultConfig::default(),
            aws_region: None,
        }
    }
}

impl SecretsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Inventory source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InventorySource {
    #[default]
    Static,
    Aws,
}

/// Inventory configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct InventoryConfig {
    pub source: InventorySource,

    /// Engine families that are provisioned; others are ignored
    #[validate(length(min = 1, message = "At least one engine must be supported"))]
    pub engines: Vec<String>,

    /// Instances for the static source
    pub instances: Vec<InstanceDescriptor>,

    /// AWS region, used when `source = aws`
    pub aws_region: Option<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            source: InventorySource::Static,
            engines: vec!["postgres".to_string(), "aurora-postgresql".to_string()],
            instances: Vec::new(),
            aws_region: None,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit JSON log lines
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logs: false }
    }
}
