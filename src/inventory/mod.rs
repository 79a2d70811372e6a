//! # Instance Inventory
//!
//! Enumerates the database instances a run operates on and classifies each
//! one as primary or read replica.
//!
//! A [`ControlPlane`] returns raw [`InstanceDescriptor`]s in its own
//! enumeration order. [`InstanceInventory::list`] drops engines the tool does
//! not manage, validates the rest into immutable [`InstanceRecord`]s and keeps
//! the order it was given.

#[cfg(feature = "aws")]
pub mod aws;
pub mod static_source;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::{InventoryConfig, InventorySource};
use crate::errors::{CredplaneError, Result};

#[cfg(feature = "aws")]
pub use aws::RdsControlPlane;
pub use static_source::StaticControlPlane;

/// Network endpoint of a database instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Snapshot of one database instance, fetched once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub identifier: String,
    pub endpoint: Endpoint,
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_instance: Option<String>,
}

impl InstanceRecord {
    /// An instance is a replica iff it names a source instance.
    pub fn is_replica(&self) -> bool {
        self.source_instance.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Instance as reported by a control plane, before validation.
///
/// Every field is optional because control planes omit fields for instances
/// that are still being created or deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub identifier: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub engine: Option<String>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub source_instance: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl TryFrom<InstanceDescriptor> for InstanceRecord {
    type Error = CredplaneError;

    fn try_from(descriptor: InstanceDescriptor) -> Result<Self> {
        let identifier = non_empty(descriptor.identifier)
            .ok_or_else(|| CredplaneError::discovery("instance descriptor has no identifier"))?;

        let malformed =
            |what: &str| CredplaneError::discovery(format!("instance '{}' {}", identifier, what));

        let host = non_empty(descriptor.host).ok_or_else(|| malformed("has no endpoint address"))?;
        let port = descriptor
            .port
            .ok_or_else(|| malformed("has no endpoint port"))
            .and_then(|p| {
                u16::try_from(p)
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| malformed(&format!("has invalid port {}", p)))
            })?;
        let engine = non_empty(descriptor.engine).ok_or_else(|| malformed("has no engine"))?;

        Ok(Self {
            identifier,
            endpoint: Endpoint { host, port },
            engine,
            database_name: non_empty(descriptor.database_name),
            source_instance: non_empty(descriptor.source_instance),
        })
    }
}

/// Source of instance descriptors.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Enumerate every instance visible to the caller.
    async fn list_instances(&self) -> Result<Vec<InstanceDescriptor>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Read-only view over a control plane restricted to supported engines.
#[derive(Clone)]
pub struct InstanceInventory {
    control_plane: Arc<dyn ControlPlane>,
    engines: Vec<String>,
}

impl InstanceInventory {
    pub fn new(control_plane: Arc<dyn ControlPlane>, engines: Vec<String>) -> Self {
        let engines = engines.into_iter().map(|e| e.to_ascii_lowercase()).collect();
        Self { control_plane, engines }
    }

    fn supports(&self, engine: &str) -> bool {
        self.engines.iter().any(|e| e.eq_ignore_ascii_case(engine))
    }

    /// List managed instances in control-plane order.
    ///
    /// Fails with a discovery error when enumeration fails or any supported
    /// instance is malformed; there is nothing to iterate in either case.
    pub async fn list(&self) -> Result<Vec<InstanceRecord>> {
        let descriptors = self.control_plane.list_instances().await?;
        let total = descriptors.len();

        let mut records = Vec::with_capacity(total);
        for descriptor in descriptors {
            if let Some(engine) = descriptor.engine.as_deref() {
                if !self.supports(engine) {
                    tracing::info!(
                        instance = descriptor.identifier.as_deref().unwrap_or("<unnamed>"),
                        engine,
                        "Skipping instance with unsupported engine"
                    );
                    continue;
                }
            }
            records.push(InstanceRecord::try_from(descriptor)?);
        }

        tracing::debug!(
            control_plane = self.control_plane.name(),
            discovered = total,
            managed = records.len(),
            "Listed instances"
        );
        Ok(records)
    }
}

/// Build the control plane selected in configuration.
pub async fn build_control_plane(config: &InventoryConfig) -> Result<Arc<dyn ControlPlane>> {
    match config.source {
        InventorySource::Static => Ok(Arc::new(StaticControlPlane::new(config.instances.clone()))),
        #[cfg(feature = "aws")]
        InventorySource::Aws => {
            let sdk_config = crate::config::aws::load_sdk_config(config.aws_region.as_deref()).await;
            Ok(Arc::new(RdsControlPlane::new(&sdk_config)))
        }
        #[cfg(not(feature = "aws"))]
        InventorySource::Aws => Err(CredplaneError::config(
            "inventory.source = aws requires building with the `aws` feature",
        )),
    }
}
