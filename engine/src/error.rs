//! Error types for the transfer engine.
//!
//! Two layers of errors exist:
//! - `EngineError` is what a single transfer flow (or its factory) reports.
//! - `BatchError` is what `run_batch` reports to its caller. Worker failures
//!   are collected into an `AggregateFailure` that still carries the report,
//!   so partial work is never lost.
//!
//! Per-file errors inside a flow are counted in its TransferState, not
//! raised as EngineError.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::AggregateReport;

/// Errors raised by a transfer flow or while constructing one.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("Source directory not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },

    /// Source directory is not accessible (permissions)
    #[error("Source directory access denied: {}", .path.display())]
    SourceAccessDenied { path: PathBuf, source: io::Error },

    /// Failed to read from source file
    #[error("Failed to read file: {}", .path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to destination file
    #[error("Failed to write file: {}", .path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Path is empty or otherwise unusable
    #[error("Invalid path: {} ({reason})", .path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Failed to enumerate source directory
    #[error("Failed to enumerate directory: {}", .path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", .path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// The flow stopped because its cancellation token fired
    #[error("Transfer cancelled")]
    Cancelled,

    /// The worker task panicked (the flow itself or its progress callback)
    #[error("Worker panicked: {message}")]
    WorkerPanicked { message: String },

    /// Failure reported by an external flow implementation
    #[error("Transfer flow failed: {message}")]
    Flow { message: String },
}

impl EngineError {
    /// Create a Flow error.
    pub fn flow(message: impl Into<String>) -> Self {
        EngineError::Flow {
            message: message.into(),
        }
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SourceAccessDenied { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// A single worker whose flow ended in an error.
#[derive(Debug)]
pub struct WorkerFailure {
    /// 1-based worker index
    pub worker: usize,
    /// Label of the flow that failed
    pub label: String,
    /// What went wrong
    pub source: EngineError,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {} ({}): {}", self.worker, self.label, self.source)
    }
}

impl std::error::Error for WorkerFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// One or more workers failed; the report covers every worker regardless.
#[derive(Debug)]
pub struct AggregateFailure {
    report: AggregateReport,
    failures: Vec<WorkerFailure>,
}

impl AggregateFailure {
    pub(crate) fn new(report: AggregateReport, failures: Vec<WorkerFailure>) -> Self {
        debug_assert!(!failures.is_empty());
        AggregateFailure { report, failures }
    }

    /// Report with accurate totals for all workers, including the failed ones.
    pub fn report(&self) -> &AggregateReport {
        &self.report
    }

    /// Every individual failure, ordered by worker index.
    pub fn failures(&self) -> &[WorkerFailure] {
        &self.failures
    }

    pub fn into_parts(self) -> (AggregateReport, Vec<WorkerFailure>) {
        (self.report, self.failures)
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} workers failed ({} items transferred)",
            self.failures.len(),
            self.report.workers.len(),
            self.report.total_content_count
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f as &(dyn std::error::Error + 'static))
    }
}

/// Errors returned by a batch run.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Parallelism below 1; nothing was started
    #[error("Parallelism must be at least 1")]
    InvalidParallelism,

    /// The factory could not build a flow; nothing was started
    #[error("Failed to construct flow for worker {worker}: {source}")]
    FlowConstruction { worker: usize, source: EngineError },

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The batch ran but its result could not be written out
    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),

    /// At least one worker failed after all workers finished
    #[error("{0}")]
    Aggregate(AggregateFailure),
}

impl BatchError {
    /// True for errors raised before any worker was dispatched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidParallelism
                | Self::FlowConstruction { .. }
                | Self::Config(_)
                | Self::Io(_)
                | Self::Yaml(_)
        )
    }

    /// Process exit code for a host application.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Aggregate(_) | Self::Output(_) => 1,
            _ => 2,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, BatchError>;
