//! Progress reporting for upload runs.
//!
//! The orchestrator reports one unit of progress per settled file through
//! [`ProgressCallback`], which keeps it independent of any rendering
//! backend (an `indicatif` bar in the CLI, nothing at all in tests).

use std::sync::Arc;

/// Receives progress updates from an upload run.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// by every worker of a run.
pub trait ProgressCallback: Send + Sync {
    /// Set the total number of files in the run.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` files.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
