//! # Provisioning Metrics
//!
//! Counters emitted through the `metrics` facade. Nothing is exported unless
//! the embedding process installs a recorder.

use metrics::{counter, describe_counter};

use crate::database::ProbeOutcome;
use crate::provisioning::{Decision, ProvisionError};

pub const DECISIONS_TOTAL: &str = "credplane_decisions_total";
pub const INSTANCE_ERRORS_TOTAL: &str = "credplane_instance_errors_total";
pub const PROBE_OUTCOMES_TOTAL: &str = "credplane_probe_outcomes_total";

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(DECISIONS_TOTAL, "Provisioning decisions by kind");
    describe_counter!(INSTANCE_ERRORS_TOTAL, "Instances that ended a run errored, by error kind");
    describe_counter!(PROBE_OUTCOMES_TOTAL, "Credential probe outcomes");
}

/// Records provisioning activity
#[derive(Debug, Clone, Default)]
pub struct ProvisioningMetrics;

impl ProvisioningMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_probe(&self, outcome: &ProbeOutcome) {
        counter!(PROBE_OUTCOMES_TOTAL, "outcome" => outcome.as_str()).increment(1);
    }

    pub fn record_decision(&self, decision: Decision) {
        counter!(DECISIONS_TOTAL, "decision" => decision.as_str()).increment(1);
    }

    pub fn record_error(&self, error: &ProvisionError) {
        counter!(INSTANCE_ERRORS_TOTAL, "kind" => error.kind()).increment(1);
    }
}
