//! Progress observers for the merge pipeline.
//!
//! Progress reporting is kept out of the merge and publish code paths: callers
//! hand in a `ProgressObserver` and decide where the events go.

use std::sync::Mutex;

use tracing::{debug, info};

use super::engine::MergeStats;
use crate::core::{RunPath, RunState};

/// Records between two replay progress events.
pub const PROGRESS_INTERVAL: usize = 100;

/// Receives pipeline progress events. Every method has a no-op default.
pub trait ProgressObserver {
    fn on_fetch_start(&self, _run: &RunPath) {}

    fn on_fetch_complete(&self, _run: &RunPath, _records: usize, _state: RunState) {}

    /// A record for `step` replaced an earlier one with an older timestamp.
    fn on_step_replaced(&self, _step: i64) {}

    fn on_merge_complete(&self, _stats: &MergeStats) {}

    fn on_run_created(&self, _name: &str, _location: &str) {}

    /// Called every `PROGRESS_INTERVAL` records and once after the last one.
    fn on_replay_progress(&self, _logged: usize, _total: usize) {}

    fn on_run_finished(&self, _name: &str, _state: RunState) {}
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Observer that turns events into `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_fetch_start(&self, run: &RunPath) {
        info!(run = %run, "downloading history");
    }

    fn on_fetch_complete(&self, run: &RunPath, records: usize, state: RunState) {
        info!(run = %run, records, state = %state, "downloaded history");
    }

    fn on_step_replaced(&self, step: i64) {
        debug!(step, "step duplicated, keeping later version");
    }

    fn on_merge_complete(&self, stats: &MergeStats) {
        info!(
            total = stats.total_records,
            unique = stats.unique_steps,
            duplicates = stats.duplicates,
            without_step = stats.records_without_step,
            "merged histories"
        );
        if let Some((lo, hi)) = stats.step_range {
            info!("step range: {lo} -> {hi}");
        }
    }

    fn on_run_created(&self, name: &str, location: &str) {
        info!(name, location, "created merged run");
    }

    fn on_replay_progress(&self, logged: usize, total: usize) {
        info!("logged {logged}/{total} records");
    }

    fn on_run_finished(&self, name: &str, state: RunState) {
        info!(name, state = %state, "finished merged run");
    }
}

/// Observer that keeps every event as a line of text; used by tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_fetch_start(&self, run: &RunPath) {
        self.push(format!("fetch_start {run}"));
    }

    fn on_fetch_complete(&self, run: &RunPath, records: usize, state: RunState) {
        self.push(format!("fetch_complete {run} {records} {state}"));
    }

    fn on_step_replaced(&self, step: i64) {
        self.push(format!("replaced {step}"));
    }

    fn on_merge_complete(&self, stats: &MergeStats) {
        self.push(format!(
            "merge_complete unique={} duplicates={}",
            stats.unique_steps, stats.duplicates
        ));
    }

    fn on_run_created(&self, name: &str, _location: &str) {
        self.push(format!("created {name}"));
    }

    fn on_replay_progress(&self, logged: usize, total: usize) {
        self.push(format!("replay {logged}/{total}"));
    }

    fn on_run_finished(&self, name: &str, state: RunState) {
        self.push(format!("finished {name} {state}"));
    }
}
