//! Transfer flow contracts.
//!
//! The orchestrator never reads or writes content itself. It builds flows
//! through a `FlowFactory`, one per worker, and runs them.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::progress::ProgressSink;

/// An independently configured unit of transfer work.
#[async_trait]
pub trait TransferFlow: Send {
    /// Human-readable name used in logs and failure reports.
    fn label(&self) -> String;

    /// Run the transfer to completion.
    ///
    /// Emits zero or more snapshots through `progress`, with non-decreasing
    /// counters; the last one emitted is the flow's terminal state. When
    /// `cancel` fires the flow should stop at the next safe point and either
    /// return `Ok(())` or `Err(EngineError::Cancelled)`.
    async fn run(
        self: Box<Self>,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<(), EngineError>;
}

/// Builds transfer flows from a per-worker override.
///
/// The override (a name, a path, a suffix) is what keeps concurrently running
/// flows from targeting the same destination. `create` may be called many
/// times and from several threads.
pub trait FlowFactory: Send + Sync {
    type Override: Send;

    fn create(&self, flow_override: Self::Override) -> Result<Box<dyn TransferFlow>, EngineError>;
}
