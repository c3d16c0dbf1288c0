//! # Engine Layer
//!
//! The per-site engine surface and the host-scoped coordination around it.
//!
//! - `coordinator`: [`HostCoordinator`] — the one object holding all
//!   cross-site state: the replicated-write countdown latch, the
//!   driver-finished signal, the publish-once partition map, and the
//!   multi-partition impersonation locals.
//! - [`SiteEngine`]: the callback surface executors and the dispatcher
//!   report through (modified-tuple tally, latch countdown, finished
//!   signal, progress).
//! - `context`: [`ExecutorContext`] — the per-site, per-thread dispatcher.
//! - `progress`: [`ProgressMonitor`] — row-count reporting for long scans.

mod context;
mod coordinator;
mod progress;

pub use context::{EngineLocals, ExecutorContext, SubqueryContext};
pub use coordinator::{CountdownOutcome, HostCoordinator};
pub use progress::ProgressMonitor;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Pass-through undo-log handle. The core never interprets it; it rides on
/// the context for collaborators further down the stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct UndoQuantum {
    pub undo_token: i64,
}

impl UndoQuantum {
    pub fn new(undo_token: i64) -> Self {
        Self { undo_token }
    }
}

/// Per-site engine callbacks.
///
/// One `SiteEngine` exists per site; sibling sites reach each other's
/// engines only through [`EngineLocals`] published on the coordinator.
pub struct SiteEngine {
    site_id: i64,
    partition_id: i32,
    coordinator: Arc<HostCoordinator>,
    tuples_modified: AtomicI64,
    progress_rows: AtomicU64,
    observed_generation: AtomicU64,
}

impl SiteEngine {
    pub fn new(site_id: i64, partition_id: i32, coordinator: Arc<HostCoordinator>) -> Arc<Self> {
        Arc::new(Self {
            site_id,
            partition_id,
            coordinator,
            tuples_modified: AtomicI64::new(0),
            progress_rows: AtomicU64::new(0),
            observed_generation: AtomicU64::new(0),
        })
    }

    pub fn site_id(&self) -> i64 {
        self.site_id
    }

    pub fn partition_id(&self) -> i32 {
        self.partition_id
    }

    pub fn coordinator(&self) -> &Arc<HostCoordinator> {
        &self.coordinator
    }

    /// DML executors report their row counts here.
    pub fn add_to_tuples_modified(&self, count: i64) {
        self.tuples_modified.fetch_add(count, Ordering::Relaxed);
    }

    pub fn tuples_modified(&self) -> i64 {
        self.tuples_modified.load(Ordering::Relaxed)
    }

    /// Long scans report progress so the host can observe a runaway query.
    pub fn report_progress(&self, rows: u64) {
        self.progress_rows.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn progress_rows(&self) -> u64 {
        self.progress_rows.load(Ordering::Relaxed)
    }

    /// Decrements the host's replicated-write latch. Returns true iff this
    /// site's decrement drove it to zero — the caller is the driver and
    /// must perform the write, reset the latch, and signal.
    pub fn count_down_global_txn_start(&self) -> bool {
        match self.coordinator.count_down() {
            CountdownOutcome::Driver => true,
            CountdownOutcome::Waiter { observed_generation } => {
                self.observed_generation
                    .store(observed_generation, Ordering::Release);
                false
            }
        }
    }

    /// Driver-side: wakes every waiter blocked on the replicated write.
    pub fn signal_last_site_finished(&self) {
        self.coordinator.signal_finished();
    }

    /// Waiter-side: blocks until the driver signals.
    pub fn wait_for_last_site_finished(&self) {
        self.coordinator
            .wait_finished(self.observed_generation.load(Ordering::Acquire));
    }
}
