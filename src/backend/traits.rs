//! Collaborator traits for the tracking backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::MergeResult;
use crate::core::{Record, RunHistory, RunPath, RunState};

/// Request to open a destination run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub entity: String,
    pub project: String,
    pub name: String,
    pub config: Map<String, Value>,
}

/// Handle to a run opened by a `RunPublisher`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub path: RunPath,
    pub name: String,
    /// Where the run can be viewed (URL or filesystem path).
    pub location: String,
}

/// Retrieves source run histories.
pub trait HistoryFetcher: Send + Sync {
    /// Returns the backend name (e.g., "local", "mock").
    fn name(&self) -> &str;

    /// Fetch a run's metadata and its records in the backend's native order.
    ///
    /// # Errors
    /// `MergeError::Fetch` on any transport, authorization or not-found failure.
    fn fetch(&self, run: &RunPath) -> MergeResult<RunHistory>;
}

/// Creates the destination run and writes records into it.
pub trait RunPublisher: Send + Sync {
    /// Open a new run.
    fn create_run(&self, run: &NewRun) -> MergeResult<RunHandle>;

    /// Append one record to an open run.
    fn log(&self, handle: &RunHandle, record: &Record) -> MergeResult<()>;

    /// Close the run with the given terminal state.
    fn finish(&self, handle: &RunHandle, state: RunState) -> MergeResult<()>;
}
