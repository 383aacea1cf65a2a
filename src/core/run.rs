//! Run identity, lifecycle state, and fetched history.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::Record;
use crate::{MergeError, MergeResult};

/// Fully qualified run identifier: `entity/project/run_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunPath {
    pub entity: String,
    pub project: String,
    pub run_id: String,
}

impl RunPath {
    pub fn new(
        entity: impl Into<String>,
        project: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        RunPath {
            entity: entity.into(),
            project: project.into(),
            run_id: run_id.into(),
        }
    }

    /// Parse `entity/project/run_id`.
    pub fn parse(s: &str) -> MergeResult<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [entity, project, run_id]
                if !entity.is_empty() && !project.is_empty() && !run_id.is_empty() =>
            {
                Ok(RunPath::new(*entity, *project, *run_id))
            }
            _ => Err(MergeError::Config(format!(
                "run path must look like entity/project/run_id, got '{s}'"
            ))),
        }
    }
}

impl fmt::Display for RunPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.entity, self.project, self.run_id)
    }
}

/// Lifecycle state reported by the tracking backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Crashed,
    Finished,
    Failed,
    Killed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Crashed => "crashed",
            RunState::Finished => "finished",
            RunState::Failed => "failed",
            RunState::Killed => "killed",
        }
    }

    /// Whether the run can no longer receive records.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source run as fetched from the backend: metadata plus records in the
/// backend's native order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    pub run_id: String,
    pub name: String,
    pub state: RunState,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl RunHistory {
    pub fn new(run_id: impl Into<String>, name: impl Into<String>, state: RunState) -> Self {
        RunHistory {
            run_id: run_id.into(),
            name: name.into(),
            state,
            config: Map::new(),
            records: Vec::new(),
            location: None,
        }
    }

    /// Set the run config.
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Set the records.
    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Smallest and largest step among records that carry one.
    pub fn step_range(&self) -> Option<(i64, i64)> {
        self.records
            .iter()
            .filter_map(Record::step)
            .fold(None, |acc, s| match acc {
                None => Some((s, s)),
                Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_path_parse_and_display() {
        let p = RunPath::parse("djhenny/nanochat/url355b1").unwrap();
        assert_eq!(p.entity, "djhenny");
        assert_eq!(p.project, "nanochat");
        assert_eq!(p.run_id, "url355b1");
        assert_eq!(p.to_string(), "djhenny/nanochat/url355b1");
    }

    #[test]
    fn test_run_path_parse_rejects_malformed() {
        assert!(RunPath::parse("only-one").is_err());
        assert!(RunPath::parse("a/b").is_err());
        assert!(RunPath::parse("a//c").is_err());
        assert!(RunPath::parse("a/b/c/d").is_err());
    }

    #[test]
    fn test_run_state_wire_format() {
        let s = serde_json::to_string(&RunState::Crashed).unwrap();
        assert_eq!(s, "\"crashed\"");
        let back: RunState = serde_json::from_str("\"finished\"").unwrap();
        assert_eq!(back, RunState::Finished);
        assert!(serde_json::from_str::<RunState>("\"paused\"").is_err());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Crashed.is_terminal());
    }

    #[test]
    fn test_step_range_ignores_records_without_step() {
        let history = RunHistory::new("r1", "train", RunState::Crashed).with_records(vec![
            Record::new().with("step", 5),
            Record::new().with("loss", 1.0),
            Record::new().with("step", 2),
            Record::new().with("step", 9),
        ]);
        assert_eq!(history.step_range(), Some((2, 9)));
        assert_eq!(history.record_count(), 4);

        let empty = RunHistory::new("r2", "train", RunState::Running);
        assert_eq!(empty.step_range(), None);
    }
}
