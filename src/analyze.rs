//! Top-level entry points.
//!
//! [`analyze`] and friends run the whole pipeline: read → normalize →
//! encode → submit → poll → result. [`prepare`] and [`inspect`] stop before
//! the network and need no endpoint configuration.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::orchestrator::Orchestrator;
use crate::output::{AnalysisOutput, AnalysisReport, AnalysisStats};
use crate::pipeline::encode::encode_image;
use crate::pipeline::normalize::{describe_image, ImageInfo, NormalizedImage, Normalizer};
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Analyze a screenshot on disk.
///
/// # Errors
/// Returns `Err(AnalysisError)` for every non-success terminal state; see
/// [`crate::output::JobOutcome::into_result`] for the mapping.
pub async fn analyze(
    path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    let bytes = read_input(path.as_ref()).await?;
    analyze_bytes(&bytes, config).await
}

/// Analyze screenshot bytes already in memory.
///
/// # Example
/// ```rust,no_run
/// use screenshot_insight::{analyze_bytes, AnalysisConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("screen.png")?;
/// let config = AnalysisConfig::builder()
///     .submit_endpoint("https://example.com/prod/track")
///     .status_endpoint("https://example.com/prod/status")
///     .build()?;
/// let output = analyze_bytes(&bytes, &config).await?;
/// println!("{}", serde_json::to_string_pretty(&output.result)?);
/// # Ok(())
/// # }
/// ```
pub async fn analyze_bytes(
    bytes: &[u8],
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    analyze_with_cancel(bytes, config, &CancellationToken::new()).await
}

/// Like [`analyze_bytes`], but stops with [`AnalysisError::Cancelled`] as
/// soon as `cancel` fires, including mid-sleep between polls.
pub async fn analyze_with_cancel(
    bytes: &[u8],
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<AnalysisOutput, AnalysisError> {
    let total_start = Instant::now();

    // Resolve endpoints first so a misconfiguration fails before any CPU work.
    let orchestrator = Orchestrator::from_config(config)?;

    let normalize_start = Instant::now();
    let image = normalize_blocking(bytes.to_vec(), config).await?;
    let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;
    info!(
        "Normalized {} → {} bytes ({}) in {}ms",
        image.original_bytes,
        image.len(),
        image.stage,
        normalize_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_normalized(image.original_bytes, image.len(), image.stage);
    }

    submit_normalized(&orchestrator, image, normalize_duration_ms, total_start, cancel).await
}

/// Submit an image already produced by [`prepare`], skipping normalization.
///
/// `image.bytes` must still satisfy the wire ceiling; it is validated before
/// any network call like every other payload.
pub async fn analyze_normalized(
    image: NormalizedImage,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<AnalysisOutput, AnalysisError> {
    let total_start = Instant::now();
    let orchestrator = Orchestrator::from_config(config)?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_normalized(image.original_bytes, image.len(), image.stage);
    }
    submit_normalized(&orchestrator, image, 0, total_start, cancel).await
}

/// Encode, run the job, and assemble the output.
async fn submit_normalized(
    orchestrator: &Orchestrator,
    image: NormalizedImage,
    normalize_duration_ms: u64,
    total_start: Instant,
    cancel: &CancellationToken,
) -> Result<AnalysisOutput, AnalysisError> {
    let payload = encode_image(&image.bytes);
    let payload_bytes = payload.len();
    let run = orchestrator.run(&payload, cancel).await?;

    let poll_attempts = run.poll_attempts;
    let remote_duration_ms = run.remote_duration_ms;
    let handle = run.handle;
    let result = run.outcome.into_result()?;
    let job = handle.ok_or_else(|| {
        AnalysisError::Internal("job succeeded without a handle".to_string())
    })?;

    let stats = AnalysisStats {
        original_bytes: image.original_bytes,
        normalized_bytes: image.len(),
        payload_bytes,
        poll_attempts,
        normalize_duration_ms,
        remote_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Analysis complete: job {}, {} polls, {}ms total",
        job, stats.poll_attempts, stats.total_duration_ms
    );

    Ok(AnalysisOutput {
        job,
        result,
        image,
        stats,
    })
}

/// Analyze a screenshot and write the report to a JSON file.
///
/// The report is `{"timestamp": ..., "analysis_results": {...}}`. Uses an
/// atomic write (temp file + rename) so a reader never sees a partial file.
pub async fn analyze_to_file(
    input: impl AsRef<Path>,
    report_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, AnalysisError> {
    let output = analyze(input, config).await?;
    let report = AnalysisReport::new(output.result);
    write_report(report_path.as_ref(), &report).await?;
    Ok(report)
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnalysisError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(path, config))
}

/// Normalize a screenshot on disk without submitting it.
///
/// Needs no endpoint configuration.
pub async fn prepare(
    path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<NormalizedImage, AnalysisError> {
    let bytes = read_input(path.as_ref()).await?;
    normalize_blocking(bytes, config).await
}

/// Report format, dimensions and colour mode of an image without
/// normalizing it.
pub async fn inspect(path: impl AsRef<Path>) -> Result<ImageInfo, AnalysisError> {
    let bytes = read_input(path.as_ref()).await?;
    describe_image(&bytes)
}

/// Serialize `report` to `path` atomically, creating parent directories.
pub async fn write_report(path: &Path, report: &AnalysisReport) -> Result<(), AnalysisError> {
    let write_err = |e: std::io::Error| AnalysisError::ReportWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let json = serde_json::to_vec_pretty(report)
        .map_err(|e| AnalysisError::Internal(format!("report serialization: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote report to {}", path.display());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn read_input(path: &Path) -> Result<Vec<u8>, AnalysisError> {
    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AnalysisError::InputNotFound {
                path: path.to_path_buf(),
            }
        } else {
            AnalysisError::InputReadFailed {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

/// Image work is CPU-bound; keep it off the async worker threads.
async fn normalize_blocking(
    bytes: Vec<u8>,
    config: &AnalysisConfig,
) -> Result<NormalizedImage, AnalysisError> {
    let normalizer = Normalizer::from_config(config);
    tokio::task::spawn_blocking(move || normalizer.normalize(&bytes))
        .await
        .map_err(|e| AnalysisError::Internal(format!("normalize task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::AnalysisResult;
    use crate::pipeline::normalize::{tests::noise_png, NormalizeStage};

    #[tokio::test]
    async fn missing_input_is_not_found() {
        let err = inspect("/definitely/not/here.png").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn prepare_passes_small_png_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        let png = noise_png(32, 24);
        tokio::fs::write(&path, &png).await.unwrap();

        let image = prepare(&path, &AnalysisConfig::default()).await.unwrap();
        assert_eq!(image.stage, NormalizeStage::Passthrough);
        assert_eq!(image.bytes, png);

        let info = inspect(&path).await.unwrap();
        assert_eq!((info.width, info.height), (32, 24));
        assert_eq!(info.format, "PNG");
    }

    #[tokio::test]
    async fn config_error_precedes_decoding() {
        let err = analyze_bytes(b"not an image", &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EndpointNotConfigured));
    }

    #[tokio::test]
    async fn report_written_atomically_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/report.json");
        let report = AnalysisReport::new(AnalysisResult::default());

        write_report(&path, &report).await.unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(written["timestamp"].is_string());
        assert_eq!(written["analysis_results"]["visual_analysis"], serde_json::json!({}));
    }
}
