//! Engine module: orchestrates fetchers and publishers around the merge.
//!
//! # Boundaries
//!
//! - `HistoryFetcher` only downloads; it knows nothing about merging.
//! - `merge` is pure: histories in, merged history out, events to an observer.
//! - `RunPublisher` only creates, logs and finishes runs.
//! - The `workflow` functions compose the three and own the finish guarantee.

pub mod workflow;

// Re-export key types for convenience
pub use workflow::{
    MergeOptions, fetch_all, plan_destination, publish_merged, replay, run_merge, with_run,
};
