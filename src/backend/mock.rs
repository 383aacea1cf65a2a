//! Mock backend for testing.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::core::{Record, RunHistory, RunPath, RunState};
use crate::{MergeError, MergeResult};

use super::traits::{HistoryFetcher, NewRun, RunHandle, RunPublisher};

/// Configuration for mock backend responses.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Name to report
    pub name: String,
    /// Source runs, keyed by run id
    pub runs: HashMap<String, RunHistory>,
    /// Run ids whose fetch should fail
    pub fetch_fails: HashSet<String>,
    /// Whether create_run should fail
    pub create_fails: bool,
    /// 1-based index of the log call that should fail
    pub log_fails_on: Option<usize>,
    /// Whether finish should fail
    pub finish_fails: bool,
}

impl MockConfig {
    /// Create a new mock config with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        MockConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a source run.
    pub fn with_run(mut self, run: RunHistory) -> Self {
        self.runs.insert(run.run_id.clone(), run);
        self
    }

    /// Make fetching `run_id` fail.
    pub fn fetch_fails(mut self, run_id: impl Into<String>) -> Self {
        self.fetch_fails.insert(run_id.into());
        self
    }

    /// Make create_run fail.
    pub fn create_fails(mut self) -> Self {
        self.create_fails = true;
        self
    }

    /// Make the `n`-th log call (1-based) fail.
    pub fn log_fails_on(mut self, n: usize) -> Self {
        self.log_fails_on = Some(n);
        self
    }

    /// Make finish fail.
    pub fn finish_fails(mut self) -> Self {
        self.finish_fails = true;
        self
    }
}

/// Calls observed by a `MockBackend`.
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    pub fetched: Vec<String>,
    pub created: Vec<NewRun>,
    pub logged: Vec<Record>,
    pub finished: Vec<(String, RunState)>,
    log_attempts: usize,
}

/// Mock backend for unit testing.
///
/// Serves configured histories and records every publish call without touching
/// any storage.
pub struct MockBackend {
    config: MockConfig,
    calls: Mutex<MockCalls>,
}

impl MockBackend {
    /// Create a new mock backend with the given configuration.
    pub fn new(config: MockConfig) -> Self {
        MockBackend {
            config,
            calls: Mutex::new(MockCalls::default()),
        }
    }

    /// Create a mock backend serving the given runs.
    pub fn with_runs(runs: impl IntoIterator<Item = RunHistory>) -> Self {
        let config = runs
            .into_iter()
            .fold(MockConfig::new("mock"), |cfg, run| cfg.with_run(run));
        Self::new(config)
    }

    /// Snapshot of the calls made so far.
    pub fn calls(&self) -> MockCalls {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockCalls> {
        // recover from poisoning
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HistoryFetcher for MockBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn fetch(&self, run: &RunPath) -> MergeResult<RunHistory> {
        self.lock().fetched.push(run.run_id.clone());
        if self.config.fetch_fails.contains(&run.run_id) {
            return Err(MergeError::fetch(run, "mock fetch failed"));
        }
        self.config
            .runs
            .get(&run.run_id)
            .cloned()
            .ok_or_else(|| MergeError::fetch(run, "run not found"))
    }
}

impl RunPublisher for MockBackend {
    fn create_run(&self, run: &NewRun) -> MergeResult<RunHandle> {
        if self.config.create_fails {
            return Err(MergeError::publish(&run.name, "mock create failed"));
        }
        let mut calls = self.lock();
        calls.created.push(run.clone());
        let run_id = format!("mock-{}", calls.created.len());
        let path = RunPath::new(&run.entity, &run.project, &run_id);
        Ok(RunHandle {
            location: format!("mock://{path}"),
            path,
            name: run.name.clone(),
        })
    }

    fn log(&self, handle: &RunHandle, record: &Record) -> MergeResult<()> {
        let mut calls = self.lock();
        calls.log_attempts += 1;
        if self.config.log_fails_on == Some(calls.log_attempts) {
            return Err(MergeError::publish(
                &handle.path,
                format!("mock log failed on record {}", calls.log_attempts),
            ));
        }
        calls.logged.push(record.clone());
        Ok(())
    }

    fn finish(&self, handle: &RunHandle, state: RunState) -> MergeResult<()> {
        self.lock().finished.push((handle.path.run_id.clone(), state));
        if self.config.finish_fails {
            return Err(MergeError::publish(&handle.path, "mock finish failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn new_run() -> NewRun {
        NewRun {
            entity: "e".into(),
            project: "p".into(),
            name: "x-merged".into(),
            config: Map::new(),
        }
    }

    #[test]
    fn test_mock_fetch() {
        let backend = MockBackend::with_runs([RunHistory::new("r1", "train", RunState::Crashed)]);
        let history = backend.fetch(&RunPath::new("e", "p", "r1")).unwrap();
        assert_eq!(history.name, "train");
        assert!(backend.fetch(&RunPath::new("e", "p", "missing")).is_err());
        assert_eq!(backend.calls().fetched, vec!["r1", "missing"]);
    }

    #[test]
    fn test_mock_fetch_fails() {
        let config = MockConfig::new("mock")
            .with_run(RunHistory::new("r1", "train", RunState::Crashed))
            .fetch_fails("r1");
        let backend = MockBackend::new(config);
        let err = backend.fetch(&RunPath::new("e", "p", "r1")).unwrap_err();
        assert!(matches!(err, MergeError::Fetch { .. }));
    }

    #[test]
    fn test_mock_log_fails_on_nth_call() {
        let backend = MockBackend::new(MockConfig::new("mock").log_fails_on(2));
        let handle = backend.create_run(&new_run()).unwrap();
        assert_eq!(handle.location, "mock://e/p/mock-1");

        let r = Record::new().with("step", 1);
        assert!(backend.log(&handle, &r).is_ok());
        assert!(backend.log(&handle, &r).is_err());
        assert!(backend.log(&handle, &r).is_ok());
        assert_eq!(backend.calls().logged.len(), 2);
    }

    #[test]
    fn test_mock_finish_is_recorded_even_when_failing() {
        let backend = MockBackend::new(MockConfig::new("mock").finish_fails());
        let handle = backend.create_run(&new_run()).unwrap();
        assert!(backend.finish(&handle, RunState::Finished).is_err());
        assert_eq!(
            backend.calls().finished,
            vec![("mock-1".to_string(), RunState::Finished)]
        );
    }
}
