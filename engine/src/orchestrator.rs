//! Parallel batch orchestration.
//!
//! `run_batch` builds one flow per worker through a `FlowFactory`, runs them
//! all concurrently on the tokio runtime, records each worker's latest
//! progress in its own slot, and aggregates the slots once every worker has
//! finished.
//!
//! Failure policy is fail-together: a failing worker never cancels its
//! siblings. Failures are collected and raised as one `BatchError::Aggregate`
//! after the join, alongside a report covering every worker.

use std::any::Any;
use std::sync::Arc;

use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::aggregate::aggregate;
use crate::error::{AggregateFailure, BatchError, EngineError, Result, WorkerFailure};
use crate::flow::FlowFactory;
use crate::model::{AggregateReport, BatchStatus};
use crate::progress::{BatchObserver, ProgressSink, SlotTable, SlotWriter};

/// Optional knobs for a batch run.
#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Cancelling this token asks every worker to stop; if any worker stopped
    /// early the run returns a report marked partial.
    pub cancel: CancellationToken,

    /// Receives every progress snapshot after it is stored.
    pub observer: Option<Arc<dyn BatchObserver>>,
}

impl BatchOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Run `parallelism` flows concurrently and aggregate their final progress.
///
/// Worker indices are 1-based; worker `i` is built from `override_fn(i)`.
/// Overrides must be distinct for flows not to collide; this is not checked.
///
/// # Errors
/// - `InvalidParallelism` if `parallelism` is 0 (the factory is not called)
/// - `FlowConstruction` if the factory fails (no worker is started)
/// - `Aggregate` if any worker failed, after all workers finished
pub async fn run_batch<F, O>(parallelism: usize, override_fn: O, factory: &F) -> Result<AggregateReport>
where
    F: FlowFactory + ?Sized,
    O: Fn(usize) -> F::Override,
{
    run_batch_with(parallelism, override_fn, factory, BatchOptions::default()).await
}

/// `run_batch` with cancellation and a progress observer.
pub async fn run_batch_with<F, O>(
    parallelism: usize,
    override_fn: O,
    factory: &F,
    options: BatchOptions,
) -> Result<AggregateReport>
where
    F: FlowFactory + ?Sized,
    O: Fn(usize) -> F::Override,
{
    if parallelism == 0 {
        return Err(BatchError::InvalidParallelism);
    }

    // Build every flow up front so a bad override starts nothing.
    let mut flows = Vec::with_capacity(parallelism);
    for worker in 1..=parallelism {
        let flow = factory
            .create(override_fn(worker))
            .map_err(|source| BatchError::FlowConstruction { worker, source })?;
        debug!("Worker {}: constructed flow {}", worker, flow.label());
        flows.push(flow);
    }

    let table = Arc::new(SlotTable::new(parallelism));
    info!("Starting batch with {} workers", parallelism);

    // Dropping this future before the join (timeout, select!, abort) cancels
    // every worker. The caller's token is left untouched.
    let batch_cancel = options.cancel.child_token();
    let _stop_on_drop = batch_cancel.clone().drop_guard();

    let started = Instant::now();
    let mut handles = Vec::with_capacity(parallelism);
    for (worker, flow) in (1..=parallelism).zip(flows) {
        let label = flow.label();
        let sink: ProgressSink = Arc::new(SlotWriter::new(
            worker,
            table.clone(),
            options.observer.clone(),
        ));
        let cancel = batch_cancel.child_token();
        let span = info_span!("worker", worker, flow = %label);

        let handle = tokio::spawn(async move { flow.run(sink, cancel).await }.instrument(span));
        handles.push((worker, label, handle));
    }

    let mut failures = Vec::new();
    let mut interrupted = 0;
    for (worker, label, handle) in handles {
        let outcome = handle.await.unwrap_or_else(|e| Err(join_failure(e)));
        match outcome {
            Ok(()) => {
                let slot = table.get(worker);
                info!(
                    "{}: completed ({} items, {} errors)",
                    label, slot.state.current_count, slot.state.error_count
                );
            }
            Err(EngineError::Cancelled) if options.cancel.is_cancelled() => {
                warn!("{}: stopped by cancellation", label);
                interrupted += 1;
            }
            Err(source) => {
                error!("{}: failed - {}", label, source);
                failures.push(WorkerFailure {
                    worker,
                    label,
                    source,
                });
            }
        }
    }
    let elapsed = started.elapsed();

    let status = if interrupted > 0 {
        warn!("Batch cancelled; {} workers stopped early, reporting partial totals", interrupted);
        BatchStatus::Partial
    } else {
        BatchStatus::Completed
    };

    let report = aggregate(&table.snapshot(), elapsed, status);
    info!("Batch finished: {}", report);

    if failures.is_empty() {
        Ok(report)
    } else {
        Err(BatchError::Aggregate(AggregateFailure::new(report, failures)))
    }
}

pub(crate) fn join_failure(err: JoinError) -> EngineError {
    if err.is_panic() {
        EngineError::WorkerPanicked {
            message: panic_message(err.into_panic()),
        }
    } else {
        EngineError::WorkerPanicked {
            message: "worker task was aborted".to_string(),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
