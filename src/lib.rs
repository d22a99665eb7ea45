//! # screenshot-insight
//!
//! Submit screenshots to a remote analysis workflow and wait for a structured
//! result.
//!
//! The remote endpoint enforces a hard payload ceiling, so every screenshot
//! is first squeezed into a PNG of at most 250 000 bytes, trading fidelity
//! for guaranteed delivery. The job is then launched asynchronously and
//! polled on a fixed interval until it reaches a terminal state.
//!
//! ## Pipeline Overview
//!
//! ```text
//! screenshot
//!  │
//!  ├─ 1. Normalize  decode → crop → fit 500² → 400²/300²/200² → grayscale
//!  ├─ 2. Encode     PNG → base64, checked against the 262 000-byte wire limit
//!  ├─ 3. Submit     POST {"input": "{\"image_data\": ...}"} → executionArn
//!  ├─ 4. Poll       status every 2 s, at most 30 times, cancellable
//!  └─ 5. Result     visual_analysis / activity_pattern / productivity_assessment
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use screenshot_insight::{analyze, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::builder()
//!         .submit_endpoint("https://example.com/prod/track")
//!         .status_endpoint("https://example.com/prod/status")
//!         .build()?;
//!     let output = analyze("screen.png", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.result)?);
//!     eprintln!("{} polls, {}ms", output.stats.poll_attempts, output.stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `shot-insight` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! screenshot-insight = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod sections;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_bytes, analyze_normalized, analyze_sync, analyze_to_file,
    analyze_with_cancel, inspect, prepare, write_report,
};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, SizeBudget};
pub use error::AnalysisError;
pub use orchestrator::Orchestrator;
pub use output::{
    AnalysisOutput, AnalysisReport, AnalysisResult, AnalysisStats, JobHandle, JobOutcome, JobRun,
    JobStatus, RemoteFailureKind, RemoteStatus, Section,
};
pub use pipeline::normalize::{ImageInfo, NormalizeStage, NormalizedImage, Normalizer};
pub use pipeline::status::{HttpStatusSource, JobStatusSource, StatusReport};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use tokio_util::sync::CancellationToken;
