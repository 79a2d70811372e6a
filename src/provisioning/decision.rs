//! Run modes and the per-instance decision table.

use serde::Serialize;
use std::fmt;

use crate::database::ProbeOutcome;
use crate::errors::{CredplaneError, Result};
use crate::inventory::InstanceRecord;

/// How a run treats instances. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Create missing users, leave existing ones alone
    #[default]
    Default,
    /// Probe only, never mutate
    Check,
    /// Regenerate and overwrite every reachable primary
    Force,
}

impl RunMode {
    /// Build a mode from the `--check` and `--force` flags.
    pub fn from_flags(check: bool, force: bool) -> Result<Self> {
        match (check, force) {
            (true, true) => Err(CredplaneError::validation("check and force modes are mutually exclusive")),
            (true, false) => Ok(Self::Check),
            (false, true) => Ok(Self::Force),
            (false, false) => Ok(Self::Default),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Check => "check",
            Self::Force => "force",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the engine decided for one instance in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    SkipReplica,
    SkipCheckMode,
    NoOpUserExists,
    CreateUser,
    ForceUpdateUser,
    /// Probe could not reach the instance; nothing was attempted
    Unreachable,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SkipReplica => "skip_replica",
            Self::SkipCheckMode => "skip_check_mode",
            Self::NoOpUserExists => "noop_user_exists",
            Self::CreateUser => "create_user",
            Self::ForceUpdateUser => "force_update_user",
            Self::Unreachable => "unreachable",
        }
    }

    /// True for decisions that mutate the instance and the secret store.
    pub fn is_apply(&self) -> bool {
        matches!(self, Self::CreateUser | Self::ForceUpdateUser)
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::SkipReplica | Self::SkipCheckMode)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision reached before probing, if any.
pub fn classify(instance: &InstanceRecord) -> Option<Decision> {
    instance.is_replica().then_some(Decision::SkipReplica)
}

/// Decision for a primary given the run mode and the probe outcome.
pub fn decide(mode: RunMode, probe: &ProbeOutcome) -> Decision {
    match (mode, probe) {
        (RunMode::Check, _) => Decision::SkipCheckMode,
        (_, ProbeOutcome::ConnectionError(_)) => Decision::Unreachable,
        (_, ProbeOutcome::UserMissing) => Decision::CreateUser,
        (RunMode::Force, ProbeOutcome::Authenticated | ProbeOutcome::AuthenticationFailed) => {
            Decision::ForceUpdateUser
        }
        (RunMode::Default, ProbeOutcome::Authenticated | ProbeOutcome::AuthenticationFailed) => {
            Decision::NoOpUserExists
        }
    }
}
