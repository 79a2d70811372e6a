//! # Observability
//!
//! Structured logging and provisioning counters.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::{describe_metrics, ProvisioningMetrics};

use crate::config::ObservabilityConfig;

/// Initialize logging and register metric descriptions
pub fn init_observability(config: &ObservabilityConfig, verbose: bool) {
    init_logging(config, verbose);
    describe_metrics();

    tracing::debug!(
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "Observability initialized"
    );
}
