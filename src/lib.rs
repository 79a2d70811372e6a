//! # credplane
//!
//! Provisions and rotates database login credentials across a fleet of
//! managed instances and keeps the resulting secrets in a central store.
//!
//! ## Architecture
//!
//! ```text
//! Instance Inventory ──► Provisioning Engine (one state machine per instance)
//!                            │
//!            ┌───────────────┼────────────────┬──────────────────┐
//!            ▼               ▼                ▼                  ▼
//!     Credential Prober  Password Generator  User Manager  Secret Synchronizer
//! ```
//!
//! Runs are idempotent: a second default-mode run against an unchanged fleet
//! changes nothing. Replicas are never touched. Check mode never mutates.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use credplane::credentials::PasswordGenerator;
//! use credplane::database::PostgresAdmin;
//! use credplane::config::AppConfig;
//! use credplane::inventory::{InstanceInventory, StaticControlPlane};
//! use credplane::provisioning::{Collaborators, ProvisioningEngine, RunConfig, RunMode};
//! use credplane::secrets::{InMemorySecretStore, SecretSynchronizer};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> credplane::Result<()> {
//! let config = AppConfig::default();
//! let secrets = SecretSynchronizer::new(Arc::new(InMemorySecretStore::new()), Duration::from_secs(10));
//! let postgres = Arc::new(PostgresAdmin::new(&config.database, true, secrets.clone()));
//! let engine = ProvisioningEngine::new(
//!     RunConfig::new(RunMode::Check, "app_service"),
//!     Collaborators {
//!         inventory: InstanceInventory::new(Arc::new(StaticControlPlane::default()), vec!["postgres".into()]),
//!         prober: postgres.clone(),
//!         users: postgres,
//!         secrets,
//!         generator: PasswordGenerator::default(),
//!     },
//! );
//! let report = engine.run(&CancellationToken::new()).await?;
//! std::process::exit(i32::from(report.exit_code()));
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod credentials;
pub mod database;
pub mod errors;
pub mod inventory;
pub mod observability;
pub mod provisioning;
pub mod secrets;
pub mod utils;

pub use errors::{CredplaneError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
