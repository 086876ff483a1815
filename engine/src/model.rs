//! Core data model for batch transfers.
//!
//! This module defines the data structures shared by flows, the orchestrator
//! and host applications:
//! - TransferState: progress snapshot emitted by one transfer flow
//! - WorkerSlot: the orchestrator's record of a worker's latest snapshot
//! - AggregateReport: the one-per-batch completion report
//! - FlowPhase, BatchStatus, OverwritePolicy: enums describing state and behavior

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Progress snapshot of a single transfer flow.
///
/// Flows create a new snapshot each time their progress changes. Only
/// `current_count` and `error_count` are read by aggregation; the remaining
/// fields are descriptive and passed through to observers untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    /// Items transferred successfully so far
    pub current_count: u64,

    /// Items that failed so far
    pub error_count: u64,

    /// Items left untouched (e.g. by overwrite policy)
    pub skipped_count: u64,

    /// Total items the flow expects to process, once known
    pub total_count: Option<u64>,

    /// Payload bytes moved so far
    pub bytes_transferred: u64,

    /// What the flow is currently doing
    pub phase: FlowPhase,
}

impl TransferState {
    /// Snapshot with the two aggregated counters set and everything else default.
    pub fn with_counts(current_count: u64, error_count: u64) -> Self {
        TransferState {
            current_count,
            error_count,
            ..Default::default()
        }
    }

    /// Items processed in any way (transferred, failed or skipped).
    pub fn processed_count(&self) -> u64 {
        self.current_count + self.error_count + self.skipped_count
    }
}

/// The phase a transfer flow reports itself in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowPhase {
    /// Created, nothing reported yet
    #[default]
    Pending,
    /// Discovering what to transfer
    Planning,
    /// Moving content items
    Transferring,
    /// All items processed
    Completed,
}

impl fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowPhase::Pending => write!(f, "pending"),
            FlowPhase::Planning => write!(f, "planning"),
            FlowPhase::Transferring => write!(f, "transferring"),
            FlowPhase::Completed => write!(f, "completed"),
        }
    }
}

/// The orchestrator's record of one worker's latest progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSlot {
    /// 1-based worker index
    pub worker: usize,

    /// Most recent snapshot (default until the first callback)
    pub state: TransferState,

    /// Number of snapshots received from the worker
    pub updates: u64,
}

impl WorkerSlot {
    pub fn new(worker: usize) -> Self {
        WorkerSlot {
            worker,
            state: TransferState::default(),
            updates: 0,
        }
    }
}

/// Whether a batch ran to completion or was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Every worker ran to its natural end
    Completed,
    /// The batch was cancelled; totals cover whatever was recorded
    Partial,
}

/// Aggregate completion report of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    /// Sum of every worker's `current_count`
    pub total_content_count: u64,

    /// Sum of every worker's `error_count`
    pub total_error_count: u64,

    /// Wall-clock time from first dispatch to last completion
    pub elapsed: Duration,

    /// Throughput in content items per second
    pub items_per_second: f64,

    pub status: BatchStatus,

    /// Final slot snapshots, ordered by worker index
    pub workers: Vec<WorkerSlot>,
}

impl AggregateReport {
    pub fn is_partial(&self) -> bool {
        self.status == BatchStatus::Partial
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Elapsed: {:.2}s | Transferred: {} | Errors: {} | CPS: {:.2}",
            self.elapsed.as_secs_f64(),
            self.total_content_count,
            self.total_error_count,
            self.items_per_second
        )?;
        if self.is_partial() {
            write!(f, " (partial)")?;
        }
        Ok(())
    }
}

/// Policy for handling existing files at the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Don't overwrite; skip existing files
    #[default]
    Skip,
    /// Always overwrite existing files
    Overwrite,
    /// Overwrite if the destination size differs
    #[serde(alias = "smart-update")]
    Smart,
}

impl OverwritePolicy {
    /// Parse a policy name as accepted on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "skip" => Some(OverwritePolicy::Skip),
            "overwrite" => Some(OverwritePolicy::Overwrite),
            "smart" | "smart-update" => Some(OverwritePolicy::Smart),
            _ => None,
        }
    }
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverwritePolicy::Skip => write!(f, "skip"),
            OverwritePolicy::Overwrite => write!(f, "overwrite"),
            OverwritePolicy::Smart => write!(f, "smart"),
        }
    }
}
