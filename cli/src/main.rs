//! transfer-batch - Command-line host for the parallel transfer engine.
//!
//! Copies one source directory into N worker destinations concurrently,
//! renders live progress to stderr and prints the aggregate summary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use transfer_engine::{
    run_batch_with, AggregateReport, BatchConfig, BatchError, BatchObserver, BatchOptions,
    DirectoryCopyFactory, OverwritePolicy, TransferState, WorkerFailure,
};
use uuid::Uuid;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code when the batch was interrupted.
const EXIT_CANCELLED: u8 = 130;

/// transfer-batch - Run parallel directory transfers
#[derive(Parser, Debug)]
#[command(name = "transfer-batch")]
#[command(version)]
#[command(about = "Copy a directory into N destinations concurrently and report throughput")]
struct Args {
    /// Path to a YAML batch configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source directory
    #[arg(long, value_name = "PATH")]
    src: Option<PathBuf>,

    /// Directory receiving one sub-directory per worker
    #[arg(long, value_name = "PATH")]
    dst: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short = 'n', long, value_name = "N")]
    parallelism: Option<usize>,

    /// Worker destinations are named <prefix>-<index>
    #[arg(long, value_name = "NAME")]
    prefix: Option<String>,

    /// Overwrite policy: skip, overwrite, or smart
    #[arg(long, value_name = "POLICY")]
    overwrite: Option<String>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Render live progress to stderr
    #[arg(long)]
    progress: bool,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,
}

/// Machine-readable result of one run.
#[derive(Debug, Serialize)]
struct RunSummary {
    run_id: Uuid,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    parallelism: usize,
    total_content_count: u64,
    total_error_count: u64,
    duration_seconds: f64,
    items_per_second: f64,
    failed_workers: Vec<String>,
}

impl RunSummary {
    fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        report: &AggregateReport,
        failures: &[WorkerFailure],
    ) -> Self {
        let status = if !failures.is_empty() {
            "failed"
        } else if report.is_partial() {
            "partial"
        } else {
            "completed"
        };
        RunSummary {
            run_id,
            status: status.to_string(),
            started_at,
            completed_at: Utc::now(),
            parallelism: report.workers.len(),
            total_content_count: report.total_content_count,
            total_error_count: report.total_error_count,
            duration_seconds: report.elapsed.as_secs_f64(),
            items_per_second: report.items_per_second,
            failed_workers: failures.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Live progress renderer for the whole batch.
struct CliProgress {
    interval: Duration,
    inner: Mutex<ProgressLines>,
}

struct ProgressLines {
    last_update: Instant,
    latest: Vec<TransferState>,
}

impl CliProgress {
    fn new(workers: usize, interval: Duration) -> Self {
        CliProgress {
            interval,
            inner: Mutex::new(ProgressLines {
                last_update: Instant::now(),
                latest: vec![TransferState::default(); workers],
            }),
        }
    }

    fn print_progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn render(latest: &[TransferState]) -> String {
        let processed: u64 = latest.iter().map(|s| s.processed_count()).sum();
        let expected: u64 = latest.iter().filter_map(|s| s.total_count).sum();
        let transferred: u64 = latest.iter().map(|s| s.current_count).sum();
        let errors: u64 = latest.iter().map(|s| s.error_count).sum();
        let done = latest
            .iter()
            .filter(|s| s.phase == transfer_engine::FlowPhase::Completed)
            .count();

        let percent = if expected == 0 {
            0
        } else {
            (processed as f64 / expected as f64 * 100.0) as u32
        };

        format!(
            "Progress: {} | {} transferred | {} errors | {}/{} workers done",
            Self::print_progress_bar(percent),
            transferred,
            errors,
            done,
            latest.len()
        )
    }
}

impl BatchObserver for CliProgress {
    fn on_worker_progress(&self, worker: usize, state: &TransferState) {
        let Ok(mut lines) = self.inner.lock() else {
            return;
        };
        lines.latest[worker - 1] = state.clone();

        // Throttle progress updates to avoid spam
        if lines.last_update.elapsed() < self.interval {
            return;
        }
        lines.last_update = Instant::now();

        eprint!("\r{}", Self::render(&lines.latest));
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }
}

fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

fn encode_summary(summary: &RunSummary) -> Result<String, BatchError> {
    serde_json::to_string_pretty(summary).map_err(|e| BatchError::Output(e.into()))
}

fn print_summary(summary: &RunSummary, report: &AggregateReport, output_json: bool) -> Result<(), BatchError> {
    if output_json {
        let json = encode_summary(summary)?;
        println!("{}", json);
        return Ok(());
    }

    println!();
    match summary.status.as_str() {
        "completed" => println!("Batch completed!"),
        "partial" => println!("Batch interrupted; totals are partial."),
        _ => println!("Batch finished with failures."),
    }
    println!("  Run ID: {}", summary.run_id);
    println!("  Started: {}", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Workers: {}", summary.parallelism);
    println!("  Elapsed: {}", format_duration(report.elapsed));
    println!("  Transferred: {}", report.total_content_count);
    println!("  Errors: {}", report.total_error_count);
    println!("  Throughput: {:.2} items/sec", report.items_per_second);
    if !summary.failed_workers.is_empty() {
        println!("  Failed workers:");
        for failure in &summary.failed_workers {
            println!("    {}", failure);
        }
    }
    Ok(())
}

/// Merge the optional config file with command-line overrides.
fn build_config(args: &Args) -> Result<BatchConfig, BatchError> {
    let mut config = match &args.config {
        Some(path) => BatchConfig::load(path)?,
        None => BatchConfig::default(),
    };

    if let Some(src) = &args.src {
        config.source = src.clone();
    }
    if let Some(dst) = &args.dst {
        config.destination = dst.clone();
    }
    if let Some(n) = args.parallelism {
        config.parallelism = n;
    }
    if let Some(prefix) = &args.prefix {
        config.worker_prefix = prefix.clone();
    }
    if let Some(policy) = &args.overwrite {
        config.overwrite = OverwritePolicy::parse(policy).ok_or_else(|| {
            BatchError::Config(format!(
                "Invalid overwrite policy '{}'. Must be 'skip', 'overwrite', or 'smart'",
                policy
            ))
        })?;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = setup_logging(&args.verbosity, &args.log_format) {
        eprintln!("Error: {}", e);
        return ExitCode::from(2);
    }

    match run(&args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

/// Main CLI logic; returns the exit code for a batch that produced a report.
async fn run(args: &Args) -> Result<u8, BatchError> {
    let config = build_config(args)?;
    info!(
        "Copying {} into {} workers under {}",
        config.source.display(),
        config.parallelism,
        config.destination.display()
    );

    let factory = DirectoryCopyFactory::new(&config.source, config.overwrite)
        .map_err(|e| BatchError::Config(e.to_string()))?;

    let cancel = setup_signal_handler();
    let mut options = BatchOptions::default().with_cancel(cancel);
    if args.progress {
        options = options.with_observer(Arc::new(CliProgress::new(
            config.parallelism,
            Duration::from_millis(config.progress_interval_ms),
        )));
    }

    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!("Starting run {}", run_id);

    let result = run_batch_with(
        config.parallelism,
        |i| config.worker_destination(i),
        &factory,
        options,
    )
    .await;
    if args.progress {
        eprintln!();
    }

    match result {
        Ok(report) => {
            let summary = RunSummary::new(run_id, started_at, &report, &[]);
            print_summary(&summary, &report, args.output_json)?;
            Ok(if report.is_partial() { EXIT_CANCELLED } else { 0 })
        }
        Err(BatchError::Aggregate(failure)) => {
            let (report, failures) = failure.into_parts();
            let summary = RunSummary::new(run_id, started_at, &report, &failures);
            print_summary(&summary, &report, args.output_json)?;
            Ok(1)
        }
        Err(e) => Err(e),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Invalid verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Invalid log format '{}'. Must be 'text' or 'json'", other)),
    }

    Ok(())
}

/// Cancel the batch on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for kind in [SignalKind::interrupt(), SignalKind::terminate()] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived signal. Stopping workers...");
                    token.cancel();
                }
                Err(e) => tracing::warn!("Failed to install signal handler: {}", e),
            }
        });
    }

    cancel_token
}

/// Cancel the batch on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping workers...");
            token.cancel();
        }
    });

    cancel_token
}
