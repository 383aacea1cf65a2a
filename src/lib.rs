pub mod backend;
pub mod config;
pub mod core;
pub mod engine;
pub mod merge;
pub mod merge_cmd;
pub mod storage;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::merge::MergeStats;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to fetch run {run}: {reason}")]
    Fetch { run: String, reason: String },
    #[error("no record in {runs} run(s) carried a step key, nothing to publish")]
    EmptyMerge { runs: usize },
    #[error("failed to publish merged run {run}: {reason}")]
    Publish { run: String, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl MergeError {
    pub fn fetch(run: impl ToString, reason: impl ToString) -> Self {
        MergeError::Fetch { run: run.to_string(), reason: reason.to_string() }
    }

    pub fn publish(run: impl ToString, reason: impl ToString) -> Self {
        MergeError::Publish { run: run.to_string(), reason: reason.to_string() }
    }
}

pub type MergeResult<T> = Result<T, MergeError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRunInfo {
    pub run_id: String,
    pub name: String,
    pub state: crate::core::RunState,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationInfo {
    pub run_id: String,
    pub name: String,
    pub location: String,
    pub records_logged: usize,
}

/// Machine-readable summary of one merge invocation (written with `--json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub timestamp: String,
    pub entity: String,
    pub project: String,
    pub sources: Vec<SourceRunInfo>,
    pub stats: MergeStats,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
}

// Shared helpers
pub fn now_string() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".to_string())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> MergeResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| MergeError::Message(e.to_string()))?;
        }
    }
    let json = serde_json::to_vec_pretty(value).map_err(|e| MergeError::Message(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| MergeError::Message(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_run() {
        let err = MergeError::fetch("acme/nanochat/url355b1", "not found");
        assert_eq!(err.to_string(), "failed to fetch run acme/nanochat/url355b1: not found");

        let err = MergeError::EmptyMerge { runs: 2 };
        assert!(err.to_string().contains("2 run(s)"));
    }

    #[test]
    fn test_now_string_is_rfc3339() {
        let ts = now_string();
        assert!(ts.len() >= 20);
        assert_eq!(&ts[10..11], "T");
        assert!(ts.ends_with('Z'));
    }
}
