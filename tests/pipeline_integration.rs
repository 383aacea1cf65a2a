//! Integration tests for the merge pipeline against the mock backend.

use serde_json::{Map, Value, json};

use run_merge::MergeError;
use run_merge::backend::{MockBackend, MockConfig};
use run_merge::config::MergeConfig;
use run_merge::core::{Record, RunHistory, RunState, TIMESTAMP_KEY};
use run_merge::engine::{MergeOptions, run_merge};
use run_merge::merge::{NoopObserver, RecordingObserver};

fn config_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// A run segment holding `steps`, each with timestamp `base + step`.
fn segment(id: &str, name: &str, steps: std::ops::RangeInclusive<i64>, base: i64) -> RunHistory {
    let records = steps
        .map(|s| {
            Record::new()
                .with("step", s)
                .with("loss", 1.0 / (s as f64 + 1.0))
                .with(TIMESTAMP_KEY, base + s)
                .with("_runtime", s)
                .with("_step", s)
        })
        .collect();
    RunHistory::new(id, name, RunState::Crashed).with_records(records)
}

fn config(runs: &[&str]) -> MergeConfig {
    MergeConfig::new("djhenny", "nanochat", runs.iter().copied())
}

#[test]
fn test_merge_publishes_deduplicated_history() {
    let backend = MockBackend::with_runs([
        segment("url355b1", "d20", 1..=10, 0),
        segment("h9whxpg8", "d20", 8..=20, 1000),
        segment("jla51cre", "d20", 18..=25, 2000),
    ]);
    let cfg = config(&["url355b1", "h9whxpg8", "jla51cre"]);

    let report = run_merge(&backend, &backend, &cfg, &MergeOptions::default(), &NoopObserver)
        .expect("merge should succeed");

    assert_eq!(report.stats.unique_steps, 25);
    assert_eq!(report.stats.duplicates, 3 + 3);
    assert_eq!(report.sources.len(), 3);

    let calls = backend.calls();
    assert_eq!(calls.fetched, vec!["url355b1", "h9whxpg8", "jla51cre"]);
    assert_eq!(calls.logged.len(), 25);
    let steps: Vec<i64> = calls.logged.iter().filter_map(Record::step).collect();
    assert_eq!(steps, (1..=25).collect::<Vec<_>>());

    // overlap steps come from the later segment
    let step_9 = &calls.logged[8];
    assert_eq!(step_9.timestamp(), Some(1009.0));
    let step_19 = &calls.logged[18];
    assert_eq!(step_19.timestamp(), Some(2019.0));

    assert_eq!(calls.finished, vec![("mock-1".to_string(), RunState::Finished)]);
    let dest = report.destination.expect("destination");
    assert_eq!(dest.name, "d20-merged");
    assert_eq!(dest.records_logged, 25);
    assert_eq!(dest.location, "mock://djhenny/nanochat/mock-1");
}

#[test]
fn test_replayed_records_keep_only_timestamp_reserved_key() {
    let backend = MockBackend::with_runs([segment("a", "d20", 1..=3, 0)]);

    run_merge(&backend, &backend, &config(&["a"]), &MergeOptions::default(), &NoopObserver)
        .unwrap();

    for record in backend.calls().logged {
        let mut keys: Vec<&str> = record.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["_timestamp", "loss", "step"]);
    }
}

#[test]
fn test_destination_config_from_last_run_with_metadata() {
    let first = segment("a", "first", 1..=2, 0).with_config(config_map(json!({"lr": 0.02, "depth": 20})));
    let last = segment("b", "second", 3..=4, 0).with_config(config_map(json!({"lr": 0.01})));
    let backend = MockBackend::with_runs([first, last]);

    run_merge(&backend, &backend, &config(&["a", "b"]), &MergeOptions::default(), &NoopObserver)
        .unwrap();

    let created = &backend.calls().created[0];
    assert_eq!(created.name, "second-merged");
    assert_eq!(created.entity, "djhenny");
    assert_eq!(created.project, "nanochat");
    assert_eq!(
        Value::Object(created.config.clone()),
        json!({
            "lr": 0.01,
            "_merged": true,
            "_merged_from_runs": ["a", "b"],
            "_merged_run_count": 2
        })
    );
}

#[test]
fn test_name_override() {
    let backend = MockBackend::with_runs([segment("a", "d20", 1..=2, 0)]);
    let mut cfg = config(&["a"]);
    cfg.name = Some("d20-full".into());

    let report = run_merge(&backend, &backend, &cfg, &MergeOptions::default(), &NoopObserver).unwrap();

    assert_eq!(report.destination.unwrap().name, "d20-full");
}

#[test]
fn test_fetch_failure_aborts_before_publish() {
    let config_mock = MockConfig::new("mock")
        .with_run(segment("a", "d20", 1..=5, 0))
        .with_run(segment("c", "d20", 6..=9, 0))
        .fetch_fails("b");
    let backend = MockBackend::new(config_mock);

    let err = run_merge(&backend, &backend, &config(&["a", "b", "c"]), &MergeOptions::default(), &NoopObserver)
        .unwrap_err();

    assert!(matches!(err, MergeError::Fetch { ref run, .. } if run == "djhenny/nanochat/b"));
    let calls = backend.calls();
    assert_eq!(calls.fetched, vec!["a", "b"]);
    assert!(calls.created.is_empty());
    assert!(calls.finished.is_empty());
}

#[test]
fn test_empty_merge_is_an_error() {
    let no_step = RunHistory::new("a", "d20", RunState::Crashed)
        .with_records(vec![Record::new().with("loss", 0.4)]);
    let empty = RunHistory::new("b", "d20", RunState::Running);
    let backend = MockBackend::with_runs([no_step, empty]);

    let err = run_merge(&backend, &backend, &config(&["a", "b"]), &MergeOptions::default(), &NoopObserver)
        .unwrap_err();

    assert!(matches!(err, MergeError::EmptyMerge { runs: 2 }));
    assert!(backend.calls().created.is_empty());
}

#[test]
fn test_publish_failure_still_finishes_once() {
    let config_mock = MockConfig::new("mock")
        .with_run(segment("a", "d20", 1..=10, 0))
        .log_fails_on(5);
    let backend = MockBackend::new(config_mock);
    let obs = RecordingObserver::new();

    let err = run_merge(&backend, &backend, &config(&["a"]), &MergeOptions::default(), &obs)
        .unwrap_err();

    assert!(matches!(err, MergeError::Publish { .. }));
    assert!(err.to_string().contains("record 5"));
    let calls = backend.calls();
    assert_eq!(calls.logged.len(), 4);
    assert_eq!(calls.finished, vec![("mock-1".to_string(), RunState::Failed)]);

    // finish happened before the error reached the caller
    let events = obs.events();
    assert_eq!(events.last().map(String::as_str), Some("finished d20-merged failed"));
}

#[test]
fn test_create_failure_does_not_finish() {
    let config_mock = MockConfig::new("mock")
        .with_run(segment("a", "d20", 1..=3, 0))
        .create_fails();
    let backend = MockBackend::new(config_mock);

    let err = run_merge(&backend, &backend, &config(&["a"]), &MergeOptions::default(), &NoopObserver)
        .unwrap_err();

    assert!(matches!(err, MergeError::Publish { .. }));
    assert!(backend.calls().finished.is_empty());
}

#[test]
fn test_dry_run_creates_nothing() {
    let backend = MockBackend::with_runs([segment("a", "d20", 1..=3, 0), segment("b", "d20", 3..=4, 10)]);
    let options = MergeOptions { dry_run: true, export: None };

    let report = run_merge(&backend, &backend, &config(&["a", "b"]), &options, &NoopObserver).unwrap();

    assert!(report.dry_run);
    assert!(report.destination.is_none());
    assert_eq!(report.stats.unique_steps, 4);
    assert!(backend.calls().created.is_empty());
}

#[test]
fn test_invalid_config_fetches_nothing() {
    let backend = MockBackend::with_runs([segment("a", "d20", 1..=3, 0)]);
    let cfg = MergeConfig::new("djhenny", "", ["a"]);

    let err = run_merge(&backend, &backend, &cfg, &MergeOptions::default(), &NoopObserver).unwrap_err();

    assert!(matches!(err, MergeError::Config(_)));
    assert!(backend.calls().fetched.is_empty());
}

#[test]
fn test_observer_event_sequence() {
    let backend = MockBackend::with_runs([segment("a", "d20", 1..=2, 0), segment("b", "d20", 2..=3, 10)]);
    let obs = RecordingObserver::new();

    run_merge(&backend, &backend, &config(&["a", "b"]), &MergeOptions::default(), &obs).unwrap();

    assert_eq!(
        obs.events(),
        vec![
            "fetch_start djhenny/nanochat/a",
            "fetch_complete djhenny/nanochat/a 2 crashed",
            "fetch_start djhenny/nanochat/b",
            "fetch_complete djhenny/nanochat/b 2 crashed",
            "replaced 2",
            "merge_complete unique=3 duplicates=1",
            "created d20-merged",
            "replay 3/3",
            "finished d20-merged finished",
        ]
    );
}
