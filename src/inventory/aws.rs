//! AWS RDS control plane.
//!
//! Only compiled with the `aws` feature. Uses `DescribeDBInstances` through
//! the SDK paginator so large accounts are enumerated completely, in the
//! order RDS returns them.

use async_trait::async_trait;
use aws_sdk_rds::error::DisplayErrorContext;
use aws_sdk_rds::types::DbInstance;

use super::{ControlPlane, InstanceDescriptor};
use crate::errors::{CredplaneError, Result};

/// Enumerates RDS instances in the configured region.
#[derive(Debug, Clone)]
pub struct RdsControlPlane {
    client: aws_sdk_rds::Client,
}

impl RdsControlPlane {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self { client: aws_sdk_rds::Client::new(sdk_config) }
    }
}

impl From<&DbInstance> for InstanceDescriptor {
    fn from(instance: &DbInstance) -> Self {
        let endpoint = instance.endpoint();
        Self {
            identifier: instance.db_instance_identifier().map(str::to_string),
            host: endpoint.and_then(|e| e.address()).map(str::to_string),
            port: endpoint.and_then(|e| e.port()).map(i64::from),
            engine: instance.engine().map(str::to_string),
            database_name: instance.db_name().map(str::to_string),
            source_instance: instance.read_replica_source_db_instance_identifier().map(str::to_string),
        }
    }
}

#[async_trait]
impl ControlPlane for RdsControlPlane {
    async fn list_instances(&self) -> Result<Vec<InstanceDescriptor>> {
        let mut pages = self.client.describe_db_instances().into_paginator().send();
        let mut descriptors = Vec::new();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                CredplaneError::discovery_with_source(
                    format!("DescribeDBInstances failed: {}", DisplayErrorContext(&e)),
                    Box::new(e),
                )
            })?;
            descriptors.extend(page.db_instances().iter().map(InstanceDescriptor::from));
        }

        Ok(descriptors)
    }

    fn name(&self) -> &'static str {
        "aws-rds"
    }
}
