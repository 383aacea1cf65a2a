//! Directory-backed run store.
//!
//! Layout:
//!
//! ```text
//! <root>/<entity>/<project>/<run_id>/run.json       run metadata
//! <root>/<entity>/<project>/<run_id>/history.jsonl  one record per line
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::{Record, RunHistory, RunPath, RunState};
use crate::storage::HistoryJsonl;
use crate::{MergeError, MergeResult};

use super::traits::{HistoryFetcher, NewRun, RunHandle, RunPublisher};

const RUN_FILE: &str = "run.json";
const HISTORY_FILE: &str = "history.jsonl";

/// Contents of `run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunMeta {
    id: String,
    name: String,
    state: RunState,
    #[serde(default)]
    config: Map<String, Value>,
}

/// Run store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        LocalStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the given run.
    pub fn run_dir(&self, run: &RunPath) -> PathBuf {
        self.root.join(&run.entity).join(&run.project).join(&run.run_id)
    }

    fn read_meta(&self, run: &RunPath) -> Result<RunMeta, String> {
        let path = self.run_dir(run).join(RUN_FILE);
        let s = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        serde_json::from_str(&s).map_err(|e| format!("failed to parse {}: {e}", path.display()))
    }

    fn write_meta(&self, run: &RunPath, meta: &RunMeta) -> Result<(), String> {
        let path = self.run_dir(run).join(RUN_FILE);
        let json = serde_json::to_vec_pretty(meta).map_err(|e| e.to_string())?;
        std::fs::write(&path, json).map_err(|e| format!("failed to write {}: {e}", path.display()))
    }

    /// Store a complete run under `entity/project`, replacing any previous one
    /// with the same id. Used to seed stores and by tests.
    pub fn write_run(&self, entity: &str, project: &str, history: &RunHistory) -> MergeResult<RunPath> {
        let run = RunPath::new(entity, project, &history.run_id);
        let dir = self.run_dir(&run);
        std::fs::create_dir_all(&dir).map_err(|e| MergeError::Message(e.to_string()))?;

        let meta = RunMeta {
            id: history.run_id.clone(),
            name: history.name.clone(),
            state: history.state,
            config: history.config.clone(),
        };
        self.write_meta(&run, &meta).map_err(MergeError::Message)?;

        let jsonl = dir.join(HISTORY_FILE);
        if jsonl.exists() {
            std::fs::remove_file(&jsonl).map_err(|e| MergeError::Message(e.to_string()))?;
        }
        HistoryJsonl::new(&jsonl).append_all(&history.records)?;
        Ok(run)
    }

    /// Run ids stored under `entity/project`, sorted.
    pub fn list_runs(&self, entity: &str, project: &str) -> MergeResult<Vec<String>> {
        let dir = self.root.join(entity).join(project);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| MergeError::Message(e.to_string()))?;
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().join(RUN_FILE).exists())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn fresh_run_id(&self, entity: &str, project: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let base = format!("{:x}", nanos);
        let mut id = base.clone();
        let mut n = 1;
        while self.run_dir(&RunPath::new(entity, project, &id)).exists() {
            id = format!("{base}-{n}");
            n += 1;
        }
        id
    }
}

impl HistoryFetcher for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    fn fetch(&self, run: &RunPath) -> MergeResult<RunHistory> {
        let dir = self.run_dir(run);
        if !dir.join(RUN_FILE).exists() {
            return Err(MergeError::fetch(run, format!("run not found in {}", self.root.display())));
        }
        let meta = self.read_meta(run).map_err(|e| MergeError::fetch(run, e))?;

        let jsonl = HistoryJsonl::new(dir.join(HISTORY_FILE));
        let records = if jsonl.exists() {
            jsonl.read_all().map_err(|e| MergeError::fetch(run, e))?
        } else {
            debug!(run = %run, "no history file, treating as empty");
            Vec::new()
        };

        Ok(RunHistory {
            run_id: meta.id,
            name: meta.name,
            state: meta.state,
            config: meta.config,
            records,
            location: Some(dir.display().to_string()),
        })
    }
}

impl RunPublisher for LocalStore {
    fn create_run(&self, run: &NewRun) -> MergeResult<RunHandle> {
        let run_id = self.fresh_run_id(&run.entity, &run.project);
        let path = RunPath::new(&run.entity, &run.project, &run_id);
        let dir = self.run_dir(&path);
        std::fs::create_dir_all(&dir).map_err(|e| MergeError::publish(&run.name, e))?;

        let meta = RunMeta {
            id: run_id,
            name: run.name.clone(),
            state: RunState::Running,
            config: run.config.clone(),
        };
        self.write_meta(&path, &meta)
            .map_err(|e| MergeError::publish(&path, e))?;
        std::fs::File::create(dir.join(HISTORY_FILE)).map_err(|e| MergeError::publish(&path, e))?;

        Ok(RunHandle {
            location: dir.display().to_string(),
            path,
            name: run.name.clone(),
        })
    }

    fn log(&self, handle: &RunHandle, record: &Record) -> MergeResult<()> {
        HistoryJsonl::new(self.run_dir(&handle.path).join(HISTORY_FILE))
            .append(record)
            .map_err(|e| MergeError::publish(&handle.path, e))
    }

    fn finish(&self, handle: &RunHandle, state: RunState) -> MergeResult<()> {
        let mut meta = self
            .read_meta(&handle.path)
            .map_err(|e| MergeError::publish(&handle.path, e))?;
        meta.state = state;
        self.write_meta(&handle.path, &meta)
            .map_err(|e| MergeError::publish(&handle.path, e))
    }
}
