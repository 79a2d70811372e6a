//! # Configuration Management
//!
//! Configuration is layered: built-in defaults, then an optional YAML or TOML
//! file, then environment variables prefixed with `CREDPLANE` using `__` as
//! the section separator:
//!
//! ```text
//! CREDPLANE__PROVISIONING__USERNAME=svc_orders
//! CREDPLANE__SECRETS__BACKEND=vault
//! CREDPLANE__INVENTORY__ENGINES=postgres,aurora-postgresql
//! ```

#[cfg(feature = "aws")]
pub mod aws;
pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, InventoryConfig, InventorySource, ObservabilityConfig,
    ProvisioningConfig, SecretBackendKind, SecretsConfig,
};

use crate::errors::Result;
use std::path::Path;

pub const ENV_PREFIX: &str = "CREDPLANE";

/// Load and validate configuration from an optional file and the environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("inventory.engines")
            .try_parsing(true),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
