//! Core types for run-merge.
//!
//! This module contains the record, run, and merge-metadata types shared by the
//! merge engine and the backends.

pub mod metadata;
pub mod record;
pub mod run;

// Re-export key types for convenience
pub use metadata::{MergeMetadata, destination_config, destination_name};
pub use record::{RESERVED_PREFIX, Record, STEP_KEY, TIMESTAMP_KEY, is_reserved_key};
pub use run::{RunHistory, RunPath, RunState};
