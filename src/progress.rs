//! Progress-callback trait for analysis lifecycle events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to observe a
//! request as it moves from normalization through submission and polling.
//!
//! # Example
//!
//! ```rust
//! use screenshot_insight::{AnalysisConfig, AnalysisProgressCallback, RemoteStatus};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct PollCounter {
//!     polls: AtomicU32,
//! }
//!
//! impl AnalysisProgressCallback for PollCounter {
//!     fn on_poll(&self, attempt: u32, max_attempts: u32, status: RemoteStatus) {
//!         self.polls.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("poll {attempt}/{max_attempts}: {status:?}");
//!     }
//! }
//!
//! let counter = Arc::new(PollCounter { polls: AtomicU32::new(0) });
//! let config = AnalysisConfig::builder()
//!     .progress_callback(counter as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{JobHandle, JobStatus, RemoteStatus};
use crate::pipeline::normalize::NormalizeStage;
use std::sync::Arc;

/// Called by the pipeline at each lifecycle milestone.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once the image fits the encoded-size budget.
    fn on_normalized(&self, original_bytes: usize, normalized_bytes: usize, stage: NormalizeStage) {
        let _ = (original_bytes, normalized_bytes, stage);
    }

    /// Called when the submission endpoint returns a job handle.
    fn on_submitted(&self, handle: &JobHandle) {
        let _ = handle;
    }

    /// Called after every status query that returned a report.
    ///
    /// # Arguments
    /// * `attempt`: 1-indexed attempt number
    /// * `max_attempts`: the attempt budget
    /// * `status`: what the status service reported
    fn on_poll(&self, attempt: u32, max_attempts: u32, status: RemoteStatus) {
        let _ = (attempt, max_attempts, status);
    }

    /// Called once with the terminal state.
    fn on_complete(&self, status: JobStatus) {
        let _ = status;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        polls: AtomicU32,
        completed: Mutex<Option<JobStatus>>,
    }

    impl AnalysisProgressCallback for TrackingCallback {
        fn on_poll(&self, _attempt: u32, _max: u32, _status: RemoteStatus) {
            self.polls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_complete(&self, status: JobStatus) {
            *self.completed.lock().unwrap() = Some(status);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_normalized(1_000_000, 200_000, NormalizeStage::Resized { cap: 500 });
        cb.on_submitted(&JobHandle::new("arn:aws:states:x"));
        cb.on_poll(1, 30, RemoteStatus::Running);
        cb.on_complete(JobStatus::Succeeded);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_poll(1, 3, RemoteStatus::Running);
        tracker.on_poll(2, 3, RemoteStatus::Succeeded);
        tracker.on_complete(JobStatus::Succeeded);

        assert_eq!(tracker.polls.load(Ordering::SeqCst), 2);
        assert_eq!(*tracker.completed.lock().unwrap(), Some(JobStatus::Succeeded));
    }
}
