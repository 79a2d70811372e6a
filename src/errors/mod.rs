//! # Error Handling
//!
//! Crate-level error types for credplane. Errors that abort a whole run
//! (discovery, configuration) live here; per-instance failures are modelled
//! separately in [`crate::provisioning::ProvisionError`] so that one bad
//! instance is folded into the run report instead of propagating.

pub mod types;

pub use types::{CredplaneError, Result};
