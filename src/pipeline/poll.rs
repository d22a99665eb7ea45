//! Poll loop: turn a running remote job into exactly one terminal outcome.
//!
//! ```text
//!            ┌──────── RUNNING / unknown ────────┐
//!            │   (sleep interval, attempt += 1)  │
//!            ▼                                   │
//!   query status ────────────────────────────────┘
//!      │ SUCCEEDED ──▶ parse output ──▶ Succeeded | OutputParseError
//!      │ FAILED / TIMED_OUT / ABORTED ──▶ RemoteFailure
//!      │ query error ──▶ TransportError   (attempt budget not consumed further)
//!      │ budget spent ──▶ PollExhausted
//!      └ token cancelled ──▶ Cancelled    (checked during query and sleep)
//! ```
//!
//! There is no sleep after the final attempt: once the budget is spent the
//! loop returns immediately.

use crate::output::{AnalysisResult, JobHandle, JobOutcome, RemoteStatus};
use crate::pipeline::status::{JobStatusSource, StatusReport};
use crate::progress::ProgressCallback;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed-interval polling with an attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

/// Poll `handle` until it reaches a terminal state.
///
/// Returns the outcome and the number of status queries issued.
pub async fn poll_job(
    source: &dyn JobStatusSource,
    handle: &JobHandle,
    policy: PollPolicy,
    progress: Option<&ProgressCallback>,
    cancel: &CancellationToken,
) -> (JobOutcome, u32) {
    for attempt in 1..=policy.max_attempts {
        let queried = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (JobOutcome::Cancelled, attempt - 1),
            r = source.describe(handle) => r,
        };

        let report = match queried {
            Ok(report) => report,
            Err(e) => {
                warn!("Error polling job {}: {}", handle, e);
                return (
                    JobOutcome::TransportError {
                        detail: e.to_string(),
                    },
                    attempt,
                );
            }
        };

        if let Some(cb) = progress {
            cb.on_poll(attempt, policy.max_attempts, report.status);
        }

        if let Some(outcome) = terminal_outcome(&report) {
            return (outcome, attempt);
        }

        debug!(
            "Job {} still {:?} (attempt {}/{})",
            handle, report.status, attempt, policy.max_attempts
        );

        if attempt < policy.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (JobOutcome::Cancelled, attempt),
                _ = sleep(policy.interval) => {}
            }
        }
    }

    warn!(
        "Job {} still running after {} attempts",
        handle, policy.max_attempts
    );
    (
        JobOutcome::PollExhausted {
            attempts: policy.max_attempts,
        },
        policy.max_attempts,
    )
}

/// `Some` when the report ends polling.
fn terminal_outcome(report: &StatusReport) -> Option<JobOutcome> {
    match report.status {
        RemoteStatus::Running | RemoteStatus::Unknown => None,
        RemoteStatus::Succeeded => Some(parse_output(report.output.as_deref())),
        failed => {
            let kind = failed.failure_kind()?;
            let detail = report.error_detail();
            warn!("Analysis workflow {}: {}", kind, detail);
            Some(JobOutcome::RemoteFailure { kind, detail })
        }
    }
}

/// Parse a successful job's output. A missing output counts as `{}`.
///
/// Anything that is not a JSON object is an [`JobOutcome::OutputParseError`]:
/// a finished workflow with unusable output is not a success.
pub fn parse_output(output: Option<&str>) -> JobOutcome {
    let raw = output.unwrap_or("{}");
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => {
            info!("Analysis workflow succeeded");
            JobOutcome::Succeeded(AnalysisResult::from_output(map))
        }
        Ok(other) => JobOutcome::OutputParseError {
            detail: format!("expected a JSON object, got {}", json_kind(&other)),
        },
        Err(e) => {
            warn!("Error parsing workflow output: {}", e);
            JobOutcome::OutputParseError {
                detail: e.to_string(),
            }
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
