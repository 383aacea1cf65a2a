//! Tracking backend abstraction.
//!
//! `HistoryFetcher` and `RunPublisher` are the two collaborator contracts the
//! merge pipeline talks to. `LocalStore` implements both over a directory tree;
//! `MockBackend` serves canned runs for tests.

pub mod local;
pub mod mock;
pub mod traits;

// Re-export key types
pub use local::LocalStore;
pub use mock::{MockBackend, MockCalls, MockConfig};
pub use traits::{HistoryFetcher, NewRun, RunHandle, RunPublisher};
