//! Progress hooks for the tagging and summarizing stages.
//!
//! The pipeline crates only talk to [`ProgressCallback`]; the CLI decides
//! whether that means an `indicatif` bar or nothing at all.

use std::sync::Arc;

/// Receives progress from a pipeline stage.
///
/// Tagging reports rows per chunk, summarizing reports one unit per
/// suburb. `Send + Sync` so one instance can sit behind an [`Arc`].
pub trait ProgressCallback: Send + Sync {
    /// Total units of work, once known.
    fn set_total(&self, total: u64);

    /// Advance by `delta` units.
    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// Stage finished; `msg` replaces the running message.
    fn finish(&self, msg: String);
}

/// Discards every update. Used by tests and non-interactive callers.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
