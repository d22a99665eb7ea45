//! Error types for the screenshot-insight library.
//!
//! Every failure is terminal for the request that hit it: nothing here is
//! retried internally apart from re-polling a job that is still running.
//! The variants fall into three groups:
//!
//! * **Local**: the input could not be read, decoded, or squeezed under the
//!   size budget, or the payload failed validation. No network call was made.
//! * **Remote outcome**: the workflow ran and reported
//!   FAILED / TIMED_OUT / ABORTED ([`AnalysisError::RemoteFailure`]).
//! * **Undetermined outcome**: the job could not be submitted, its status
//!   could not be read, or it "succeeded" with output we cannot parse
//!   ([`AnalysisError::Transport`], [`AnalysisError::OutputParse`]).
//!
//! Callers that only care about "did the workflow itself fail?" can use
//! [`AnalysisError::is_remote_failure`].

use crate::output::RemoteFailureKind;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the screenshot-insight library.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input image was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Input image exists but could not be read.
    #[error("Failed to read image '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Normalization errors ──────────────────────────────────────────────
    /// The bytes are not an image we can decode.
    #[error("Could not decode image: {detail}\nSupported formats: PNG, JPEG.")]
    ImageDecode { detail: String },

    /// Every degradation stage ran and the PNG is still over budget.
    #[error(
        "Image could not be reduced below {limit} bytes \
         (smallest attempt: {size} bytes after {attempts} encodes).\n\
         Try cropping the screenshot or using a smaller one."
    )]
    BudgetExceeded {
        size: usize,
        limit: usize,
        attempts: usize,
    },

    // ── Payload validation errors ─────────────────────────────────────────
    /// Nothing to send.
    #[error("No image data provided")]
    EmptyPayload,

    /// The base64 payload is larger than the wire ceiling.
    #[error("Image too large ({size} bytes). Maximum allowed is {limit} bytes.")]
    PayloadTooLarge { size: usize, limit: usize },

    // ── Remote service errors ─────────────────────────────────────────────
    /// The submission request failed or returned a non-success status.
    #[error("Job submission failed: {detail}")]
    Submission { detail: String },

    /// The submission call succeeded but carried no job handle.
    #[error("No execution ARN received from the submission endpoint")]
    MissingJobHandle,

    /// A status query failed at the transport level.
    #[error("Job status query failed: {detail}")]
    StatusQuery { detail: String },

    /// Terminal: the job's outcome could not be determined.
    #[error("Transport error: {detail}")]
    Transport { detail: String },

    /// Terminal: the workflow ran and reported failure.
    #[error("Analysis {status}: {detail}")]
    RemoteFailure {
        status: RemoteFailureKind,
        detail: String,
    },

    /// Terminal: the workflow succeeded but its output is not usable JSON.
    #[error("Invalid JSON output from analysis workflow: {detail}")]
    OutputParse { detail: String },

    /// Terminal: the job was still running when the attempt budget ran out.
    #[error("Maximum polling attempts reached ({attempts})")]
    PollExhausted { attempts: u32 },

    /// Terminal: the caller cancelled the request.
    #[error("Analysis cancelled before the job reached a terminal state")]
    Cancelled,

    // ── Config errors ─────────────────────────────────────────────────────
    /// No submission endpoint was configured.
    #[error("No submission endpoint configured.\nSet --endpoint or SHOT_INSIGHT_ENDPOINT.")]
    EndpointNotConfigured,

    /// No way to query job status was configured.
    #[error("No job status source configured.\n{hint}")]
    StatusSourceNotConfigured { hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the report file.
    #[error("Failed to write report file '{path}': {source}")]
    ReportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// `true` when the remote workflow itself ran and failed.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, AnalysisError::RemoteFailure { .. })
    }

    /// `true` when the request was rejected before any network call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            AnalysisError::InputNotFound { .. }
                | AnalysisError::InputReadFailed { .. }
                | AnalysisError::ImageDecode { .. }
                | AnalysisError::BudgetExceeded { .. }
                | AnalysisError::EmptyPayload
                | AnalysisError::PayloadTooLarge { .. }
        )
    }
}
