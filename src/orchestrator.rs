//! Job orchestration: validated payload in, one terminal [`JobOutcome`] out.
//!
//! ```text
//! validate ──✗──▶ Err(EmptyPayload | PayloadTooLarge)      (no network call)
//!    │
//! SUBMITTING ──✗──▶ TRANSPORT_ERROR                         (never polls)
//!    │ executionArn
//! POLLING ──▶ SUCCEEDED | FAILED | TIMED_OUT | ABORTED
//!           | TRANSPORT_ERROR | POLL_EXHAUSTED | CANCELLED
//! ```
//!
//! Each call to [`Orchestrator::run`] owns its own handle and shares no
//! mutable state with other calls, so one orchestrator can serve concurrent
//! requests.

use crate::config::{AnalysisConfig, STATUS_ENDPOINT_ENV};
use crate::error::AnalysisError;
use crate::output::{JobOutcome, JobRun};
use crate::pipeline::encode::validate_payload;
use crate::pipeline::poll::{poll_job, PollPolicy};
use crate::pipeline::status::{HttpStatusSource, JobStatusSource};
use crate::pipeline::submit::submit_job;
use crate::progress::ProgressCallback;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Submits payloads and polls them to completion.
pub struct Orchestrator {
    client: reqwest::Client,
    submit_endpoint: String,
    status: Arc<dyn JobStatusSource>,
    policy: PollPolicy,
    payload_limit: usize,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    /// Build from config, resolving the status source.
    ///
    /// # Errors
    /// * [`AnalysisError::EndpointNotConfigured`]: no submission endpoint
    /// * [`AnalysisError::StatusSourceNotConfigured`]: no way to query status
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let submit_endpoint = config
            .submit_endpoint
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or(AnalysisError::EndpointNotConfigured)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AnalysisError::Internal(format!("HTTP client: {e}")))?;

        let status = resolve_status_source(config, &client)?;

        Ok(Self {
            client,
            submit_endpoint,
            status,
            policy: PollPolicy {
                interval: config.poll_interval(),
                max_attempts: config.max_poll_attempts,
            },
            payload_limit: config.budget.payload,
            progress: config.progress_callback.clone(),
        })
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Validate, submit and poll one base64 payload.
    ///
    /// # Errors
    /// Only payload-validation failures are returned as `Err`; they are
    /// rejected before any network call. Every other failure is a terminal
    /// [`JobOutcome`] inside the returned [`JobRun`].
    pub async fn run(
        &self,
        image_base64: &str,
        cancel: &CancellationToken,
    ) -> Result<JobRun, AnalysisError> {
        validate_payload(image_base64, self.payload_limit)?;
        let start = Instant::now();

        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = submit_job(&self.client, &self.submit_endpoint, image_base64) => Some(r),
        };

        let handle = match submitted {
            None => return Ok(self.finish(None, JobOutcome::Cancelled, 0, start)),
            Some(Err(e)) => {
                warn!("Submission failed: {}", e);
                let outcome = JobOutcome::TransportError {
                    detail: e.to_string(),
                };
                return Ok(self.finish(None, outcome, 0, start));
            }
            Some(Ok(handle)) => handle,
        };

        if let Some(ref cb) = self.progress {
            cb.on_submitted(&handle);
        }

        let (outcome, attempts) = poll_job(
            self.status.as_ref(),
            &handle,
            self.policy,
            self.progress.as_ref(),
            cancel,
        )
        .await;

        Ok(self.finish(Some(handle), outcome, attempts, start))
    }

    fn finish(
        &self,
        handle: Option<crate::output::JobHandle>,
        outcome: JobOutcome,
        poll_attempts: u32,
        start: Instant,
    ) -> JobRun {
        let status = outcome.status();
        info!(
            "Job {} finished {} after {} polls",
            handle.as_ref().map(|h| h.as_str()).unwrap_or("<none>"),
            status,
            poll_attempts
        );
        if let Some(ref cb) = self.progress {
            cb.on_complete(status);
        }
        JobRun {
            handle,
            outcome,
            poll_attempts,
            remote_duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Resolve the status source, from most-specific to least-specific:
///
/// 1. **Pre-built source** (`config.status_source`): used as-is.
/// 2. **Configured endpoint** (`config.status_endpoint`).
/// 3. **Environment** (`SHOT_INSIGHT_STATUS_ENDPOINT`).
fn resolve_status_source(
    config: &AnalysisConfig,
    client: &reqwest::Client,
) -> Result<Arc<dyn JobStatusSource>, AnalysisError> {
    if let Some(ref source) = config.status_source {
        return Ok(Arc::clone(source));
    }

    let endpoint = config
        .status_endpoint
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var(STATUS_ENDPOINT_ENV).ok().filter(|s| !s.is_empty()));

    match endpoint {
        Some(url) => Ok(Arc::new(HttpStatusSource::with_client(client.clone(), url))),
        None => Err(AnalysisError::StatusSourceNotConfigured {
            hint: format!("Set --status-endpoint or {STATUS_ENDPOINT_ENV}."),
        }),
    }
}
