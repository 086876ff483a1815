//! Progress reporting.
//!
//! Flows push TransferState snapshots into a `ProgressCallback`. The
//! orchestrator hands each worker a `SlotWriter` that stores the snapshot in
//! that worker's slot of a fixed-size `SlotTable`, then forwards it to an
//! optional `BatchObserver` so a host (CLI, GUI) can render live progress.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::{TransferState, WorkerSlot};

/// Receives progress snapshots from a transfer flow.
///
/// Called synchronously on whatever thread the flow runs on, so
/// implementations must be cheap and must not block indefinitely.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, state: TransferState);
}

impl<F> ProgressCallback for F
where
    F: Fn(TransferState) + Send + Sync,
{
    fn on_progress(&self, state: TransferState) {
        self(state)
    }
}

/// Shared handle to a progress callback, as handed to flows.
pub type ProgressSink = Arc<dyn ProgressCallback>;

/// Receives every stored snapshot of every worker in a batch.
///
/// Updates from different workers may arrive concurrently and in any
/// interleaving; updates from one worker arrive in issuance order.
pub trait BatchObserver: Send + Sync {
    fn on_worker_progress(&self, worker: usize, state: &TransferState);
}

/// Fixed-size table of worker slots, one lock per slot.
///
/// The table's shape never changes after construction, and each slot is
/// written by a single worker, so writers from different workers never
/// contend on the same lock.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Mutex<WorkerSlot>>,
}

impl SlotTable {
    /// Create `workers` zeroed slots for workers `1..=workers`.
    pub fn new(workers: usize) -> Self {
        SlotTable {
            slots: (1..=workers).map(|w| Mutex::new(WorkerSlot::new(w))).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Replace the snapshot stored for `worker` (1-based).
    ///
    /// # Panics
    /// Panics if `worker` is outside `1..=len()`.
    pub fn store(&self, worker: usize, state: TransferState) {
        let mut slot = self.lock(worker);
        slot.state = state;
        slot.updates += 1;
    }

    /// Copy of one worker's slot.
    pub fn get(&self, worker: usize) -> WorkerSlot {
        self.lock(worker).clone()
    }

    /// Copy of every slot, ordered by worker index.
    pub fn snapshot(&self) -> Vec<WorkerSlot> {
        self.slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }

    fn lock(&self, worker: usize) -> MutexGuard<'_, WorkerSlot> {
        // A panicking observer must not hide the last stored snapshot.
        self.slots[worker - 1]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The progress callback given to a single worker; writes only its own slot.
pub struct SlotWriter {
    worker: usize,
    table: Arc<SlotTable>,
    observer: Option<Arc<dyn BatchObserver>>,
}

impl SlotWriter {
    pub fn new(worker: usize, table: Arc<SlotTable>, observer: Option<Arc<dyn BatchObserver>>) -> Self {
        assert!(
            worker >= 1 && worker <= table.len(),
            "worker {} outside slot table of {}",
            worker,
            table.len()
        );
        SlotWriter {
            worker,
            table,
            observer,
        }
    }

    pub fn worker(&self) -> usize {
        self.worker
    }
}

impl ProgressCallback for SlotWriter {
    fn on_progress(&self, state: TransferState) {
        match &self.observer {
            Some(observer) => {
                self.table.store(self.worker, state.clone());
                observer.on_worker_progress(self.worker, &state);
            }
            None => self.table.store(self.worker, state),
        }
    }
}
