//! Common test utilities for all integration tests.
//!
//! Provides an in-memory database fleet and secret store wrappers so the
//! provisioning engine can be driven end to end without live services.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod fleet;

use std::sync::Arc;
use std::time::Duration;

use credplane::credentials::PasswordGenerator;
use credplane::inventory::{InstanceDescriptor, InstanceInventory, StaticControlPlane};
use credplane::provisioning::{Collaborators, ProvisioningEngine, RunConfig, RunMode};
use credplane::secrets::{SecretStore, SecretSynchronizer};

pub use fleet::{FailingSecretStore, FakeFleet, FakeInstance};

pub const USERNAME: &str = "app_service";

pub fn primary(id: &str) -> InstanceDescriptor {
    InstanceDescriptor {
        identifier: Some(id.to_string()),
        host: Some(format!("{}.db.internal", id)),
        port: Some(5432),
        engine: Some("postgres".to_string()),
        database_name: Some("app".to_string()),
        source_instance: None,
    }
}

pub fn replica(id: &str, source: &str) -> InstanceDescriptor {
    InstanceDescriptor { source_instance: Some(source.to_string()), ..primary(id) }
}

/// Build an engine over `descriptors` backed by `fleet` and `store`.
pub fn engine(
    mode: RunMode,
    descriptors: Vec<InstanceDescriptor>,
    fleet: &Arc<FakeFleet>,
    store: Arc<dyn SecretStore>,
) -> ProvisioningEngine {
    engine_with_concurrency(mode, descriptors, fleet, store, 4)
}

pub fn engine_with_concurrency(
    mode: RunMode,
    descriptors: Vec<InstanceDescriptor>,
    fleet: &Arc<FakeFleet>,
    store: Arc<dyn SecretStore>,
    concurrency: usize,
) -> ProvisioningEngine {
    let inventory = InstanceInventory::new(
        Arc::new(StaticControlPlane::new(descriptors)),
        vec!["postgres".to_string(), "aurora-postgresql".to_string()],
    );
    ProvisioningEngine::new(
        RunConfig::new(mode, USERNAME).with_concurrency(concurrency),
        Collaborators {
            inventory,
            prober: fleet.clone(),
            users: fleet.clone(),
            secrets: SecretSynchronizer::new(store, Duration::from_secs(2)),
            generator: PasswordGenerator::default(),
        },
    )
}
