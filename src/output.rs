//! Output types: job lifecycle states and the structured analysis result.

use crate::error::AnalysisError;
use crate::pipeline::normalize::NormalizedImage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Top-level keys of the workflow output.
pub const VISUAL_ANALYSIS_KEY: &str = "visual_analysis";
pub const ACTIVITY_PATTERN_KEY: &str = "activity_pattern";
pub const PRODUCTIVITY_ASSESSMENT_KEY: &str = "productivity_assessment";

// ── Job lifecycle ────────────────────────────────────────────────────────

/// Opaque identifier for one in-flight remote execution (`executionArn`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status string reported by the job-status service.
///
/// Anything the service reports that we do not recognise is treated as
/// still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl RemoteStatus {
    /// The failure kind for FAILED / TIMED_OUT / ABORTED, `None` otherwise.
    pub fn failure_kind(self) -> Option<RemoteFailureKind> {
        match self {
            RemoteStatus::Failed => Some(RemoteFailureKind::Failed),
            RemoteStatus::TimedOut => Some(RemoteFailureKind::TimedOut),
            RemoteStatus::Aborted => Some(RemoteFailureKind::Aborted),
            _ => None,
        }
    }
}

/// The three ways a workflow can run and fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteFailureKind {
    Failed,
    TimedOut,
    Aborted,
}

impl fmt::Display for RemoteFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteFailureKind::Failed => "FAILED",
            RemoteFailureKind::TimedOut => "TIMED_OUT",
            RemoteFailureKind::Aborted => "ABORTED",
        })
    }
}

/// Lifecycle state of one analysis job. Every state except `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
    TransportError,
    PollExhausted,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        self != JobStatus::Running
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::TimedOut => "TIMED_OUT",
            JobStatus::Aborted => "ABORTED",
            JobStatus::TransportError => "ERROR",
            JobStatus::PollExhausted => "TIMEOUT",
            JobStatus::Cancelled => "CANCELLED",
        })
    }
}

/// Terminal outcome of the submit + poll state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The workflow finished and its output parsed.
    Succeeded(AnalysisResult),
    /// The workflow ran and reported FAILED / TIMED_OUT / ABORTED.
    RemoteFailure {
        kind: RemoteFailureKind,
        detail: String,
    },
    /// The workflow reported success but its output is not a JSON object.
    OutputParseError { detail: String },
    /// Submission or a status query failed; the real outcome is unknown.
    TransportError { detail: String },
    /// Still running after the whole attempt budget.
    PollExhausted { attempts: u32 },
    /// The caller's cancellation token fired.
    Cancelled,
}

impl JobOutcome {
    /// The lifecycle state this outcome corresponds to.
    ///
    /// An unparseable success reports [`JobStatus::TransportError`] ("ERROR"),
    /// never [`JobStatus::Succeeded`].
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded(_) => JobStatus::Succeeded,
            JobOutcome::RemoteFailure { kind, .. } => match kind {
                RemoteFailureKind::Failed => JobStatus::Failed,
                RemoteFailureKind::TimedOut => JobStatus::TimedOut,
                RemoteFailureKind::Aborted => JobStatus::Aborted,
            },
            JobOutcome::OutputParseError { .. } | JobOutcome::TransportError { .. } => {
                JobStatus::TransportError
            }
            JobOutcome::PollExhausted { .. } => JobStatus::PollExhausted,
            JobOutcome::Cancelled => JobStatus::Cancelled,
        }
    }

    /// Human-readable error message, `None` on success.
    pub fn error_message(&self) -> Option<String> {
        match self {
            JobOutcome::Succeeded(_) => None,
            other => other.clone().into_result().err().map(|e| e.to_string()),
        }
    }

    /// Convert into the caller-facing result: the three sections on success,
    /// exactly one [`AnalysisError`] variant per failure state otherwise.
    pub fn into_result(self) -> Result<AnalysisResult, AnalysisError> {
        match self {
            JobOutcome::Succeeded(result) => Ok(result),
            JobOutcome::RemoteFailure { kind, detail } => Err(AnalysisError::RemoteFailure {
                status: kind,
                detail,
            }),
            JobOutcome::OutputParseError { detail } => Err(AnalysisError::OutputParse { detail }),
            JobOutcome::TransportError { detail } => Err(AnalysisError::Transport { detail }),
            JobOutcome::PollExhausted { attempts } => {
                Err(AnalysisError::PollExhausted { attempts })
            }
            JobOutcome::Cancelled => Err(AnalysisError::Cancelled),
        }
    }
}

/// One full pass through the orchestrator.
#[derive(Debug, Clone)]
pub struct JobRun {
    /// `None` when submission never produced a handle.
    pub handle: Option<JobHandle>,
    pub outcome: JobOutcome,
    /// Status queries issued (0 if the job never entered polling).
    pub poll_attempts: u32,
    pub remote_duration_ms: u64,
}

// ── Analysis result ──────────────────────────────────────────────────────

/// One sub-document of the workflow output.
///
/// `Empty` means the workflow produced nothing for this section; `Present`
/// holds whatever it produced, uninterpreted. Serialises as `{}` when empty
/// so the caller-facing mapping always has all three keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Section {
    #[default]
    Empty,
    Present(Value),
}

impl Section {
    /// Missing keys, `null`, and `{}` all count as empty.
    pub fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Section::Empty,
            Some(Value::Object(map)) if map.is_empty() => Section::Empty,
            Some(v) => Section::Present(v),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Section::Empty)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Section::Empty => None,
            Section::Present(v) => Some(v),
        }
    }
}

impl Serialize for Section {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Section::Empty => Map::new().serialize(serializer),
            Section::Present(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Section {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Section::from_value(Option::<Value>::deserialize(deserializer)?))
    }
}

/// The three independently-optional sub-documents of a successful analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub visual_analysis: Section,
    #[serde(default)]
    pub activity_pattern: Section,
    #[serde(default)]
    pub productivity_assessment: Section,
}

impl AnalysisResult {
    /// Pull the three named sections out of the parsed workflow output.
    /// Missing keys become [`Section::Empty`]; other keys are ignored.
    pub fn from_output(mut output: Map<String, Value>) -> Self {
        Self {
            visual_analysis: Section::from_value(output.remove(VISUAL_ANALYSIS_KEY)),
            activity_pattern: Section::from_value(output.remove(ACTIVITY_PATTERN_KEY)),
            productivity_assessment: Section::from_value(
                output.remove(PRODUCTIVITY_ASSESSMENT_KEY),
            ),
        }
    }

    /// `true` when the workflow returned nothing in any section.
    pub fn is_empty(&self) -> bool {
        self.visual_analysis.is_empty()
            && self.activity_pattern.is_empty()
            && self.productivity_assessment.is_empty()
    }
}

/// Persisted report: the result plus when it was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub timestamp: DateTime<Utc>,
    pub analysis_results: AnalysisResult,
}

impl AnalysisReport {
    pub fn new(analysis_results: AnalysisResult) -> Self {
        Self {
            timestamp: Utc::now(),
            analysis_results,
        }
    }
}

/// Timing and attempt counters for one `analyze*` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub original_bytes: usize,
    pub normalized_bytes: usize,
    pub payload_bytes: usize,
    pub poll_attempts: u32,
    pub normalize_duration_ms: u64,
    pub remote_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Successful output of [`crate::analyze::analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    pub job: JobHandle,
    pub result: AnalysisResult,
    pub image: NormalizedImage,
    pub stats: AnalysisStats,
}
