//! Merge engine: step-keyed deduplication and ordering of run histories.

pub mod engine;
pub mod observer;

// Re-export key types
pub use engine::{MergeStats, MergedHistory, merge, merge_with_observer};
pub use observer::{
    NoopObserver, PROGRESS_INTERVAL, ProgressObserver, RecordingObserver, TracingObserver,
};
