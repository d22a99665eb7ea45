//! CLI binary for screenshot-insight.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use screenshot_insight::sections::ResultViews;
use screenshot_insight::{
    analyze_normalized, analyze_with_cancel, inspect, prepare, write_report, AnalysisConfig, AnalysisOutput,
    AnalysisProgressCallback, AnalysisReport, CancellationToken, JobHandle, JobStatus,
    NormalizeStage, ProgressCallback, RemoteStatus,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that follows one request through normalize → submit → poll.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = Self::with_bar(ProgressBar::new_spinner());
        bar.bar.enable_steady_tick(Duration::from_millis(80));
        bar
    }

    fn with_bar(bar: ProgressBar) -> Arc<Self> {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Processing image…");
        Arc::new(Self { bar })
    }
}

/// Stop the spinner unless `on_complete` already did, so a failed run does
/// not leave it ticking over the error message.
fn clear_spinner<T>(result: Result<T>, spinner: Option<&CliProgressCallback>) -> Result<T> {
    if let Some(spinner) = spinner {
        if !spinner.bar.is_finished() {
            spinner.bar.finish_and_clear();
        }
    }
    result
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_normalized(&self, original_bytes: usize, normalized_bytes: usize, stage: NormalizeStage) {
        let verb = if matches!(stage, NormalizeStage::Passthrough) {
            "Image ready"
        } else if normalized_bytes < original_bytes {
            "Image compressed and converted"
        } else {
            "Image converted"
        };
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            verb,
            dim(&format!("{original_bytes} → {normalized_bytes} bytes, {stage}")),
        ));
        self.bar.set_prefix("Submitting");
        self.bar.set_message("Starting analysis…");
    }

    fn on_submitted(&self, handle: &JobHandle) {
        self.bar.println(format!(
            "  {} Analysis started  {}",
            cyan("◆"),
            dim(handle.as_str())
        ));
        self.bar.set_prefix("Analyzing");
        self.bar.set_message("waiting for first status…");
    }

    fn on_poll(&self, attempt: u32, max_attempts: u32, status: RemoteStatus) {
        self.bar
            .set_message(format!("poll {attempt}/{max_attempts}  {status:?}"));
    }

    fn on_complete(&self, status: JobStatus) {
        self.bar.finish_and_clear();
        if status == JobStatus::Succeeded {
            eprintln!("{} Analysis completed", green("✔"));
        } else {
            eprintln!("{} Analysis ended: {}", red("✘"), bold(&status.to_string()));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a screenshot and print the three sections
  shot-insight --endpoint https://api.example.com/prod/track \
               --status-endpoint https://api.example.com/prod/status screen.png

  # Save the report as JSON
  shot-insight screen.png -o reports/analysis.json

  # Give up after two minutes
  shot-insight --timeout 120 screen.png

  # Show image details only (no endpoint needed)
  shot-insight --inspect-only screen.png

  # Write the size-bounded PNG that would be submitted
  shot-insight --save-normalized small.png screen.png

SIZE LIMITS:
  Normalized PNG     ≤ 250,000 bytes  (crop → 500² → 400²/300²/200² → grayscale)
  base64 payload     ≤ 262,000 bytes

ENVIRONMENT VARIABLES:
  SHOT_INSIGHT_ENDPOINT          Job submission URL
  SHOT_INSIGHT_STATUS_ENDPOINT   Job status URL
  RUST_LOG                       Override log filter (e.g. screenshot_insight=debug)
"#;

/// Submit screenshots for remote activity analysis.
#[derive(Parser, Debug)]
#[command(
    name = "shot-insight",
    version,
    about = "Submit screenshots for remote activity analysis",
    long_about = "Normalize a screenshot into a size-bounded PNG, submit it to a remote \
analysis workflow, poll until the job finishes, and print the visual analysis, activity \
pattern and productivity assessment.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Screenshot to analyze (PNG or JPEG).
    input: PathBuf,

    /// Job submission endpoint.
    #[arg(long, env = "SHOT_INSIGHT_ENDPOINT")]
    endpoint: Option<String>,

    /// Job status endpoint.
    #[arg(long, env = "SHOT_INSIGHT_STATUS_ENDPOINT")]
    status_endpoint: Option<String>,

    /// Write the JSON report to this file.
    #[arg(short, long, env = "SHOT_INSIGHT_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the full structured output as JSON.
    #[arg(long, env = "SHOT_INSIGHT_JSON")]
    json: bool,

    /// Print image details only, no analysis.
    #[arg(long)]
    inspect_only: bool,

    /// Write the normalized PNG to this path.
    #[arg(long, env = "SHOT_INSIGHT_SAVE_NORMALIZED")]
    save_normalized: Option<PathBuf>,

    /// Delay between status queries in milliseconds.
    #[arg(long, env = "SHOT_INSIGHT_POLL_INTERVAL_MS", default_value_t = 2_000)]
    poll_interval_ms: u64,

    /// Status queries before giving up.
    #[arg(long, env = "SHOT_INSIGHT_MAX_POLL_ATTEMPTS", default_value_t = 30,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_poll_attempts: u32,

    /// Cancel the request after this many seconds.
    #[arg(long, env = "SHOT_INSIGHT_TIMEOUT")]
    timeout: Option<u64>,

    /// Per-HTTP-request timeout in seconds.
    #[arg(long, env = "SHOT_INSIGHT_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Disable the progress spinner.
    #[arg(long, env = "SHOT_INSIGHT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SHOT_INSIGHT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SHOT_INSIGHT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers INFO-level feedback while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input).await.context("Failed to inspect image")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize image info")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            println!("Format:       {}", info.format);
            println!("Dimensions:   {}×{}", info.width, info.height);
            println!("Colour:       {:?}", info.color);
            println!("Size:         {} bytes", info.bytes);
        }
        return Ok(());
    }

    let spinner = show_progress.then(CliProgressCallback::new);
    let progress_cb = spinner
        .clone()
        .map(|s| s as Arc<dyn AnalysisProgressCallback>);
    let config = build_config(&cli, progress_cb)?;

    let result = run(&cli, &config).await;
    clear_spinner(result, spinner.as_deref())
}

/// Normalize, optionally save, then analyze and print.
async fn run(cli: &Cli, config: &AnalysisConfig) -> Result<()> {
    // ── Normalize-only output ────────────────────────────────────────────
    let mut prepared = None;
    if let Some(ref path) = cli.save_normalized {
        let image = prepare(&cli.input, config)
            .await
            .context("Failed to normalize image")?;
        tokio::fs::write(path, &image.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{} {}  {}",
                green("✓"),
                bold(&path.display().to_string()),
                dim(&format!("{}×{}, {} bytes, {}", image.width, image.height, image.len(), image.stage)),
            );
        }
        if config.submit_endpoint.is_none() {
            return Ok(());
        }
        prepared = Some(image);
    }

    // ── Run analysis ─────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, cli.timeout);

    let output = match prepared {
        Some(image) => analyze_normalized(image, config, &cancel).await,
        None => {
            let bytes = tokio::fs::read(&cli.input)
                .await
                .with_context(|| format!("Failed to read {}", cli.input.display()))?;
            analyze_with_cancel(&bytes, config, &cancel).await
        }
    }
    .context("Analysis failed")?;

    if let Some(ref path) = cli.output {
        let report = AnalysisReport::new(output.result.clone());
        write_report(path, &report)
            .await
            .context("Failed to save report")?;
        if !cli.quiet {
            eprintln!("{} Report saved  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet || cli.output.is_none() {
        print_sections(&output);
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "   {} polls  /  {} bytes sent  /  {}ms total",
            dim(&output.stats.poll_attempts.to_string()),
            dim(&output.stats.payload_bytes.to_string()),
            output.stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .poll_interval_ms(cli.poll_interval_ms)
        .max_poll_attempts(cli.max_poll_attempts)
        .request_timeout_secs(cli.request_timeout);

    if let Some(ref url) = cli.endpoint {
        builder = builder.submit_endpoint(url.clone());
    }
    if let Some(ref url) = cli.status_endpoint {
        builder = builder.status_endpoint(url.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Cancel on Ctrl-C, and after `timeout_secs` when given.
fn spawn_cancel_triggers(cancel: &CancellationToken, timeout_secs: Option<u64>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Interrupted, cancelling…", cyan("⚠"));
            token.cancel();
        }
    });

    if let Some(secs) = timeout_secs {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            token.cancel();
        });
    }
}

fn print_sections(output: &AnalysisOutput) {
    let views = ResultViews::of(&output.result);

    println!("{}", bold("📸 Visual Analysis"));
    match views.visual {
        Some(text) => println!("{text}"),
        None => println!("{}", dim("(no data)")),
    }

    println!();
    println!("{}", bold("📊 Activity Pattern"));
    match views.activity {
        Some(activity) => {
            if let Some(summary) = activity.summary {
                println!("{summary}");
            }
            if let Some(timestamp) = activity.timestamp {
                println!("Timestamp:  {timestamp}");
            }
            if let Some(status) = activity.status {
                println!("Status:     {}", bold(&status));
            }
        }
        None => println!("{}", dim("(no data)")),
    }

    println!();
    println!("{}", bold("📈 Productivity Assessment"));
    match views.productivity {
        Some(productivity) => {
            if let Some(score) = productivity.score {
                println!("Score:      {}", bold(&format!("{score}%")));
            }
            if !productivity.factors.is_empty() {
                println!("Factors considered:");
                for factor in &productivity.factors {
                    println!("  - {factor}");
                }
            }
            if let Some(error) = productivity.error {
                println!("{}", red(&format!("Assessment error: {error}")));
            }
        }
        None => println!("{}", dim("(no data)")),
    }
}
