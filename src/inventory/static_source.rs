//! Control plane backed by instances declared in configuration.

use async_trait::async_trait;

use super::{ControlPlane, InstanceDescriptor};
use crate::errors::Result;

/// Returns a fixed list of descriptors in declaration order.
#[derive(Debug, Clone, Default)]
pub struct StaticControlPlane {
    instances: Vec<InstanceDescriptor>,
}

impl StaticControlPlane {
    pub fn new(instances: Vec<InstanceDescriptor>) -> Self {
        Self { instances }
    }
}

#[async_trait]
impl ControlPlane for StaticControlPlane {
    async fn list_instances(&self) -> Result<Vec<InstanceDescriptor>> {
        Ok(self.instances.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
