//! Merge metadata attached to the destination run's config.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::run::RunHistory;

/// Config key marking a run as the product of a merge.
pub const MERGED_KEY: &str = "_merged";
/// Config key listing the source run ids, in merge order.
pub const MERGED_FROM_KEY: &str = "_merged_from_runs";
/// Config key holding the number of source runs.
pub const MERGED_COUNT_KEY: &str = "_merged_run_count";
/// Suffix appended to the last source run's name.
pub const MERGED_NAME_SUFFIX: &str = "-merged";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeMetadata {
    pub source_run_ids: Vec<String>,
    pub source_run_count: usize,
    pub merged: bool,
}

impl MergeMetadata {
    pub fn from_sources(histories: &[RunHistory]) -> Self {
        let source_run_ids: Vec<String> = histories.iter().map(|h| h.run_id.clone()).collect();
        MergeMetadata {
            source_run_count: source_run_ids.len(),
            source_run_ids,
            merged: true,
        }
    }

    /// Overlay the metadata keys onto `config`, replacing any previous values.
    pub fn apply(&self, config: &mut Map<String, Value>) {
        config.insert(MERGED_KEY.to_string(), Value::Bool(self.merged));
        config.insert(
            MERGED_FROM_KEY.to_string(),
            Value::Array(self.source_run_ids.iter().cloned().map(Value::String).collect()),
        );
        config.insert(MERGED_COUNT_KEY.to_string(), Value::from(self.source_run_count));
    }
}

/// Config for the destination run: the last source's config plus merge metadata.
///
/// Returns `None` when there are no sources.
pub fn destination_config(histories: &[RunHistory]) -> Option<Map<String, Value>> {
    let latest = histories.last()?;
    let mut config = latest.config.clone();
    MergeMetadata::from_sources(histories).apply(&mut config);
    Some(config)
}

/// Name for the destination run: `name_override` if set, else `<last name>-merged`.
pub fn destination_name(histories: &[RunHistory], name_override: Option<&str>) -> Option<String> {
    if let Some(name) = name_override.filter(|n| !n.trim().is_empty()) {
        return Some(name.to_string());
    }
    histories
        .last()
        .map(|h| format!("{}{}", h.name, MERGED_NAME_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunState;
    use serde_json::json;

    fn history(id: &str, name: &str, config: Value) -> RunHistory {
        let Value::Object(map) = config else { panic!("config must be an object") };
        RunHistory::new(id, name, RunState::Crashed).with_config(map)
    }

    #[test]
    fn test_destination_config_uses_last_run() {
        let runs = vec![
            history("a", "d20", json!({"lr": 0.1, "batch": 32})),
            history("b", "d20", json!({"lr": 0.05})),
        ];
        let cfg = destination_config(&runs).unwrap();
        assert_eq!(cfg.get("lr"), Some(&json!(0.05)));
        assert!(cfg.get("batch").is_none());
        assert_eq!(cfg.get(MERGED_KEY), Some(&json!(true)));
        assert_eq!(cfg.get(MERGED_FROM_KEY), Some(&json!(["a", "b"])));
        assert_eq!(cfg.get(MERGED_COUNT_KEY), Some(&json!(2)));
    }

    #[test]
    fn test_destination_config_empty() {
        assert!(destination_config(&[]).is_none());
    }

    #[test]
    fn test_destination_name() {
        let runs = vec![
            history("a", "first", json!({})),
            history("b", "second", json!({})),
        ];
        assert_eq!(destination_name(&runs, None).as_deref(), Some("second-merged"));
        assert_eq!(destination_name(&runs, Some("custom")).as_deref(), Some("custom"));
        assert_eq!(destination_name(&runs, Some("  ")).as_deref(), Some("second-merged"));
        assert_eq!(destination_name(&[], None), None);
    }
}
