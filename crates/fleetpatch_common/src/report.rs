//! Run reporting - per-pass counters and notices.
//!
//! Every decision point (skip, create, update, failure) increments a
//! counter and may add a notice; the report is emitted once at the end of
//! each pass. There is no interactive surface.

use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub pass: String,
    pub machines_seen: usize,
    pub skipped_no_policy: usize,
    pub skipped_wrong_os: usize,
    pub skipped_no_updates: usize,
    pub schedules_created: usize,
    pub configurations_reconciled: usize,
    pub lookup_failures: usize,
    pub upsert_failures: usize,
    pub telemetry_partial: bool,
    pub notices: Vec<String>,
}

impl RunReport {
    pub fn new(pass: impl Into<String>) -> Self {
        Self {
            pass: pass.into(),
            ..Default::default()
        }
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        self.notices.push(message.into());
    }

    /// Emit the report through the log stream.
    pub fn emit(&self) {
        info!(
            pass = %self.pass,
            machines_seen = self.machines_seen,
            skipped_no_policy = self.skipped_no_policy,
            skipped_wrong_os = self.skipped_wrong_os,
            skipped_no_updates = self.skipped_no_updates,
            schedules_created = self.schedules_created,
            configurations_reconciled = self.configurations_reconciled,
            lookup_failures = self.lookup_failures,
            upsert_failures = self.upsert_failures,
            telemetry_partial = self.telemetry_partial,
            "pass complete"
        );
        for notice in &self.notices {
            info!(pass = %self.pass, "{}", notice);
        }
    }
}
