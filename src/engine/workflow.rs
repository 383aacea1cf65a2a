//! Merge pipeline orchestration.
//!
//! Composes a `HistoryFetcher` (download) and a `RunPublisher` (create, log,
//! finish) around the merge engine:
//!
//! 1. fetch every source run, one at a time, aborting on the first failure
//! 2. merge the histories in memory
//! 3. open the destination run, replay the merged records, and finish it
//!
//! Step 3 always finishes a run it managed to create, whether or not the
//! replay succeeded.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::backend::{HistoryFetcher, NewRun, RunHandle, RunPublisher};
use crate::config::MergeConfig;
use crate::core::{RunHistory, RunPath, RunState, destination_config, destination_name};
use crate::merge::{MergedHistory, PROGRESS_INTERVAL, ProgressObserver, merge_with_observer};
use crate::storage::HistoryJsonl;
use crate::{
    DestinationInfo, MergeError, MergeReport, MergeResult, SourceRunInfo, now_string,
};

/// Knobs for `run_merge` that do not change what gets merged.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Fetch and merge, but create no destination run.
    pub dry_run: bool,
    /// Also write the merged history to this JSONL file (replaced if present).
    pub export: Option<PathBuf>,
}

/// Fetch `runs` sequentially, stopping at the first failure.
pub fn fetch_all(
    fetcher: &dyn HistoryFetcher,
    runs: &[RunPath],
    observer: &dyn ProgressObserver,
) -> MergeResult<Vec<RunHistory>> {
    debug!(backend = fetcher.name(), runs = runs.len(), "fetching source runs");
    let mut histories = Vec::with_capacity(runs.len());
    for run in runs {
        observer.on_fetch_start(run);
        let history = fetcher.fetch(run)?;
        observer.on_fetch_complete(run, history.record_count(), history.state);
        histories.push(history);
    }
    Ok(histories)
}

/// Describe the destination run for `histories`: name and config come from the
/// last source run, with merge metadata overlaid on the config.
pub fn plan_destination(config: &MergeConfig, histories: &[RunHistory]) -> MergeResult<NewRun> {
    let name = destination_name(histories, config.name.as_deref());
    let run_config = destination_config(histories);
    match (name, run_config) {
        (Some(name), Some(run_config)) => Ok(NewRun {
            entity: config.entity.clone(),
            project: config.project.clone(),
            name,
            config: run_config,
        }),
        _ => Err(MergeError::Message("no source runs to derive a destination from".into())),
    }
}

/// Create a run, hand it to `f`, then finish it exactly once.
///
/// The run is finished as `Finished` when `f` succeeds and `Failed` otherwise.
/// An error from `f` takes precedence over an error from `finish`.
pub fn with_run<T>(
    publisher: &dyn RunPublisher,
    new_run: &NewRun,
    observer: &dyn ProgressObserver,
    f: impl FnOnce(&RunHandle) -> MergeResult<T>,
) -> MergeResult<(RunHandle, T)> {
    let handle = publisher.create_run(new_run)?;
    observer.on_run_created(&handle.name, &handle.location);

    let result = f(&handle);
    let state = if result.is_ok() { RunState::Finished } else { RunState::Failed };
    let finished = publisher.finish(&handle, state);
    observer.on_run_finished(&handle.name, state);

    match (result, finished) {
        (Ok(value), Ok(())) => Ok((handle, value)),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(finish_err)) => {
            warn!(run = %handle.path, error = %finish_err, "failed to finish run after replay error");
            Err(e)
        }
    }
}

/// Log every merged record into `handle`, in step order, with reserved keys
/// other than `_timestamp` stripped. Returns the number of records logged.
pub fn replay(
    publisher: &dyn RunPublisher,
    handle: &RunHandle,
    merged: &MergedHistory,
    observer: &dyn ProgressObserver,
) -> MergeResult<usize> {
    let total = merged.len();
    for (i, record) in merged.records().iter().enumerate() {
        publisher.log(handle, &record.for_replay())?;
        let logged = i + 1;
        if logged % PROGRESS_INTERVAL == 0 || logged == total {
            observer.on_replay_progress(logged, total);
        }
    }
    Ok(total)
}

/// Publish `merged` as a new run. Consumes the merged history.
pub fn publish_merged(
    publisher: &dyn RunPublisher,
    config: &MergeConfig,
    histories: &[RunHistory],
    merged: MergedHistory,
    observer: &dyn ProgressObserver,
) -> MergeResult<(RunHandle, usize)> {
    let new_run = plan_destination(config, histories)?;
    info!(name = %new_run.name, records = merged.len(), "creating merged run");
    with_run(publisher, &new_run, observer, |handle| {
        replay(publisher, handle, &merged, observer)
    })
}

/// Run the whole pipeline for `config`.
///
/// # Errors
/// - `MergeError::Config` if the config is incomplete
/// - `MergeError::Fetch` on the first source run that cannot be fetched
/// - `MergeError::EmptyMerge` if no record carried a step
/// - `MergeError::Publish` if the destination could not be created or written
pub fn run_merge(
    fetcher: &dyn HistoryFetcher,
    publisher: &dyn RunPublisher,
    config: &MergeConfig,
    options: &MergeOptions,
    observer: &dyn ProgressObserver,
) -> MergeResult<MergeReport> {
    config.validate()?;

    let histories = fetch_all(fetcher, &config.run_paths(), observer)?;
    let merged = merge_with_observer(&histories, observer);
    if merged.is_empty() {
        return Err(MergeError::EmptyMerge { runs: histories.len() });
    }

    let sources = histories
        .iter()
        .map(|h| SourceRunInfo {
            run_id: h.run_id.clone(),
            name: h.name.clone(),
            state: h.state,
            records: h.record_count(),
        })
        .collect();

    let mut report = MergeReport {
        timestamp: now_string(),
        entity: config.entity.clone(),
        project: config.project.clone(),
        sources,
        stats: merged.stats().clone(),
        dry_run: options.dry_run,
        destination: None,
        export_path: None,
    };

    if let Some(path) = &options.export {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| MergeError::Message(e.to_string()))?;
        }
        let written = HistoryJsonl::new(path).append_all(merged.records())?;
        info!(path = %path.display(), records = written, "exported merged history");
        report.export_path = Some(path.clone());
    }

    if options.dry_run {
        info!("dry run, not creating a merged run");
        return Ok(report);
    }

    let (handle, logged) = publish_merged(publisher, config, &histories, merged, observer)?;
    report.destination = Some(DestinationInfo {
        run_id: handle.path.run_id,
        name: handle.name,
        location: handle.location,
        records_logged: logged,
    });
    Ok(report)
}
