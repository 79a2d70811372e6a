//! Run report: one entry per instance, in inventory order.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::decision::{Decision, RunMode};
use super::error::ProvisionError;
use crate::database::ProbeOutcome;
use crate::secrets::SyncOutcome;

/// Outcome of provisioning one instance.
#[derive(Debug, Serialize)]
pub struct ReportEntry {
    pub instance: String,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProvisionError>,
}

impl ReportEntry {
    pub fn new(instance: impl Into<String>, decision: Decision) -> Self {
        Self { instance: instance.into(), decision, probe: None, secret: None, error: None }
    }

    pub fn with_probe(mut self, probe: ProbeOutcome) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_secret(mut self, secret: SyncOutcome) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn with_error(mut self, error: Option<ProvisionError>) -> Self {
        self.error = error;
        self
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }
}

/// Counts by final state. Every entry lands in exactly one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub created: usize,
    pub updated: usize,
    pub errored: usize,
}

/// Append-only record of a run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    mode: RunMode,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new(mode: RunMode) -> Self {
        Self { mode, started_at: Utc::now(), finished_at: None, entries: Vec::new() }
    }

    /// Stamp the end of the run. Later calls keep the first stamp.
    pub fn finish(&mut self) {
        self.finished_at.get_or_insert_with(Utc::now);
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn record(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn entry(&self, instance: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.instance == instance)
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(ReportEntry::is_errored)
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary { total: self.entries.len(), ..Default::default() };
        for entry in &self.entries {
            let bucket = if entry.is_errored() {
                &mut summary.errored
            } else {
                match entry.decision {
                    Decision::SkipReplica | Decision::SkipCheckMode => &mut summary.skipped,
                    Decision::NoOpUserExists => &mut summary.unchanged,
                    Decision::CreateUser => &mut summary.created,
                    Decision::ForceUpdateUser => &mut summary.updated,
                    Decision::Unreachable => &mut summary.errored,
                }
            };
            *bucket += 1;
        }
        summary
    }

    /// Process exit status for this run: 0 when clean, 1 when any instance errored.
    pub fn exit_code(&self) -> u8 {
        u8::from(self.has_errors())
    }

    /// Serializable view including the summary.
    pub fn document(&self) -> ReportDocument<'_> {
        ReportDocument {
            mode: self.mode,
            started_at: self.started_at,
            finished_at: self.finished_at,
            summary: self.summary(),
            instances: &self.entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: RunSummary,
    pub instances: &'a [ReportEntry],
}
