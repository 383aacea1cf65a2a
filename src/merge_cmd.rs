//! CLI command handlers for `merge`, `inspect` and `list`.

use std::path::PathBuf;

use tracing::info;

use crate::backend::{HistoryFetcher, LocalStore};
use crate::config::MergeConfig;
use crate::core::Record;
use crate::engine::{MergeOptions, run_merge};
use crate::merge::TracingObserver;
use crate::{MergeReport, MergeResult, write_json};

/// Run the `merge` command against the local store named in `config`.
///
/// Prints the destination run's location on success (or a summary for a dry
/// run) and writes the `MergeReport` to `json_out` if given.
pub fn merge(
    config: MergeConfig,
    options: MergeOptions,
    json_out: Option<PathBuf>,
) -> MergeResult<MergeReport> {
    info!(
        entity = %config.entity,
        project = %config.project,
        runs = config.run_ids.len(),
        store = %config.store.display(),
        "merging runs"
    );
    let store = LocalStore::new(&config.store);
    let report = run_merge(&store, &store, &config, &options, &TracingObserver)?;

    match &report.destination {
        Some(dest) => {
            println!(
                "Merged {} run(s) into {} ({} records)",
                report.sources.len(),
                dest.name,
                dest.records_logged
            );
            println!("View merged run: {}", dest.location);
        }
        None => {
            println!(
                "Dry run: {} run(s) would merge into {} unique steps ({} duplicates removed)",
                report.sources.len(),
                report.stats.unique_steps,
                report.stats.duplicates
            );
        }
    }
    if let Some(path) = &report.export_path {
        println!("Exported merged history to {}", path.display());
    }

    if let Some(path) = json_out {
        write_json(&path, &report)?;
        info!(path = %path.display(), "wrote merge report");
    }
    Ok(report)
}

/// Run the `inspect` command: fetch each configured run and print a summary.
pub fn inspect(config: MergeConfig) -> MergeResult<()> {
    config.validate()?;
    let store = LocalStore::new(&config.store);
    for run in config.run_paths() {
        let history = store.fetch(&run)?;
        let without_step = history.records.iter().filter(|r| r.step().is_none()).count();
        let steps = match history.step_range() {
            Some((lo, hi)) => format!("{lo}..={hi}"),
            None => "-".to_string(),
        };
        let last_timestamp = history
            .records
            .iter()
            .filter_map(Record::timestamp)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));
        println!(
            "{} name={} state={} records={} without_step={} steps={} last_timestamp={}",
            run,
            history.name,
            history.state,
            history.record_count(),
            without_step,
            steps,
            last_timestamp.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

/// Run the `list` command: print configured runs in merge order, then every
/// run the store holds for the entity/project.
pub fn list(config: MergeConfig) -> MergeResult<()> {
    config.validate()?;
    println!("Entity: {}", config.entity);
    println!("Project: {}", config.project);
    println!("Runs to merge ({}):", config.run_ids.len());
    for (i, id) in config.run_ids.iter().enumerate() {
        println!("  {}. {}", i + 1, id);
    }
    let store = LocalStore::new(&config.store);
    let available = store.list_runs(&config.entity, &config.project)?;
    println!("Runs in {} ({}):", store.root().display(), available.len());
    for id in available {
        let marker = if config.run_ids.contains(&id) { "*" } else { " " };
        println!(" {marker} {id}");
    }
    Ok(())
}
