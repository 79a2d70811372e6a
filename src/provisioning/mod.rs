//! # Provisioning Engine
//!
//! Decides, per instance, whether to skip, leave alone, create or force-update
//! the managed user, and drives the database and secret store to match.
//!
//! - [`decision`]: run modes and the pure decision table
//! - [`engine`]: the per-instance state machine and run orchestration
//! - [`report`]: the ordered run report and exit status
//! - [`error`]: per-instance failures folded into the report

pub mod decision;
pub mod engine;
pub mod error;
pub mod report;

pub use decision::{classify, decide, Decision, RunMode};
pub use engine::{Collaborators, ProvisioningEngine, RunConfig};
pub use error::ProvisionError;
pub use report::{ReportDocument, ReportEntry, RunReport, RunSummary};
