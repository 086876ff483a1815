//! Aggregation of final worker slots into one report.

use std::time::Duration;

use crate::model::{AggregateReport, BatchStatus, WorkerSlot};

/// Elapsed time below this is treated as this, so throughput stays finite.
pub const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Build the aggregate report from a complete set of worker slots.
///
/// Pure: the same slots, elapsed time and status always give the same report.
pub fn aggregate(slots: &[WorkerSlot], elapsed: Duration, status: BatchStatus) -> AggregateReport {
    let total_content_count: u64 = slots.iter().map(|s| s.state.current_count).sum();
    let total_error_count: u64 = slots.iter().map(|s| s.state.error_count).sum();

    let mut workers = slots.to_vec();
    workers.sort_by_key(|s| s.worker);

    AggregateReport {
        total_content_count,
        total_error_count,
        elapsed,
        items_per_second: throughput(total_content_count, elapsed),
        status,
        workers,
    }
}

/// Items per second over `elapsed`, with `MIN_ELAPSED` as the floor.
pub fn throughput(items: u64, elapsed: Duration) -> f64 {
    items as f64 / elapsed.max(MIN_ELAPSED).as_secs_f64()
}
