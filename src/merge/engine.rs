//! Step-keyed deduplication of run histories.
//!
//! Records from every source run are keyed by their integer `step`. When two
//! records share a step, the one with the strictly greater `_timestamp` wins
//! (missing timestamps count as 0); on a tie the record seen first is kept.
//! Records without a step are skipped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::observer::{NoopObserver, ProgressObserver};
use crate::core::{Record, RunHistory};

/// Diagnostics for one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub input_runs: usize,
    pub total_records: usize,
    pub records_with_step: usize,
    pub records_without_step: usize,
    pub unique_steps: usize,
    /// `records_with_step - unique_steps`
    pub duplicates: usize,
    /// Duplicates that displaced an earlier record.
    pub replaced: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_range: Option<(i64, i64)>,
}

/// Canonical history: one record per distinct step, ascending by step.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedHistory {
    records: Vec<Record>,
    stats: MergeStats,
}

impl MergedHistory {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Steps of the merged records, in output order.
    pub fn steps(&self) -> Vec<i64> {
        self.records.iter().filter_map(Record::step).collect()
    }
}

struct Slot<'a> {
    record: &'a Record,
    timestamp: f64,
}

/// Merge `histories` in the given order without progress reporting.
pub fn merge(histories: &[RunHistory]) -> MergedHistory {
    merge_with_observer(histories, &NoopObserver)
}

/// Merge `histories` in the given order, reporting replaced steps and the final
/// stats to `observer`.
///
/// The order only matters for equal timestamps: the earlier history wins.
pub fn merge_with_observer(
    histories: &[RunHistory],
    observer: &dyn ProgressObserver,
) -> MergedHistory {
    let mut by_step: BTreeMap<i64, Slot<'_>> = BTreeMap::new();
    let mut stats = MergeStats {
        input_runs: histories.len(),
        ..MergeStats::default()
    };

    for history in histories {
        for record in &history.records {
            stats.total_records += 1;
            let Some(step) = record.step() else {
                stats.records_without_step += 1;
                continue;
            };
            stats.records_with_step += 1;
            let timestamp = record.timestamp().unwrap_or(0.0);

            match by_step.get_mut(&step) {
                Some(slot) => {
                    // strict: an equal timestamp keeps the stored record
                    if timestamp > slot.timestamp {
                        slot.record = record;
                        slot.timestamp = timestamp;
                        stats.replaced += 1;
                        observer.on_step_replaced(step);
                    }
                }
                None => {
                    by_step.insert(step, Slot { record, timestamp });
                }
            }
        }
    }

    stats.unique_steps = by_step.len();
    stats.duplicates = stats.records_with_step - stats.unique_steps;
    stats.step_range = match (by_step.keys().next(), by_step.keys().next_back()) {
        (Some(lo), Some(hi)) => Some((*lo, *hi)),
        _ => None,
    };

    let records: Vec<Record> = by_step.into_values().map(|slot| slot.record.clone()).collect();
    observer.on_merge_complete(&stats);

    MergedHistory { records, stats }
}
