//! Storage layer for history records.
//!
//! This module provides JSONL persistence for `Record` streams, used by the
//! local run store and by `merge --export`.

pub mod jsonl;

// Re-export key types
pub use jsonl::HistoryJsonl;
