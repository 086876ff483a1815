//! # Transfer Engine - Parallel Transfer Orchestration
//!
//! Runs N independently configured transfer flows concurrently, tracks each
//! flow's latest progress, and produces one aggregate completion report
//! (items moved, errors, elapsed time, throughput).
//!
//! ## Overview
//!
//! - Flows are built by a `FlowFactory` from a per-worker override, so
//!   concurrently running flows never share a target
//! - Progress is pushed by each flow through a `ProgressCallback`
//! - Failures are fail-together: every worker runs to completion, then all
//!   failures are raised at once alongside the report
//! - Cancellation, or dropping the batch future, stops every worker; a batch
//!   whose workers stopped early reports partial totals
//!
//! ## Basic Usage
//!
//! ```no_run
//! use transfer_engine::{run_batch, DirectoryCopyFactory, OverwritePolicy};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = DirectoryCopyFactory::new("/data/in", OverwritePolicy::Skip)?;
//! let out = PathBuf::from("/data/out");
//!
//! let report = run_batch(4, |i| out.join(format!("worker-{}", i)), &factory).await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: TransferState, WorkerSlot, AggregateReport and enums
//! - **error**: EngineError (flow level) and BatchError (batch level)
//! - **flow**: TransferFlow and FlowFactory contracts
//! - **progress**: progress callbacks and the per-worker slot table
//! - **aggregate**: pure aggregation of slots into a report
//! - **orchestrator**: `run_batch` and `run_batch_with`
//! - **config**: YAML-backed batch configuration
//! - **fs_ops**, **copy_flow**: the directory copy flow

pub mod aggregate;
pub mod config;
pub mod copy_flow;
pub mod error;
pub mod flow;
pub mod fs_ops;
pub mod model;
pub mod orchestrator;
pub mod progress;

// Re-export main types and functions
pub use aggregate::aggregate;
pub use config::BatchConfig;
pub use copy_flow::{DirectoryCopyFactory, DirectoryCopyFlow};
pub use error::{AggregateFailure, BatchError, EngineError, WorkerFailure};
pub use flow::{FlowFactory, TransferFlow};
pub use model::{AggregateReport, BatchStatus, FlowPhase, OverwritePolicy, TransferState, WorkerSlot};
pub use orchestrator::{run_batch, run_batch_with, BatchOptions};
pub use progress::{BatchObserver, ProgressCallback, ProgressSink, SlotTable, SlotWriter};
pub use tokio_util::sync::CancellationToken;
