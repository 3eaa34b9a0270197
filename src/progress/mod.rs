//! Reading progress tracking
//!
//! Validates progress ticks and session transitions before they reach the
//! repositories in [`crate::db`].

mod sessions;
mod stats;
mod tracker;

pub use sessions::{EndSessionRequest, SessionRecorder, StartSessionRequest};
pub use stats::ReadingStats;
pub use tracker::{ProgressTracker, ProgressUpdate};
