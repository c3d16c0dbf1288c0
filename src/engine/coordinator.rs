//! # Host Coordinator
//!
//! All cross-site shared state lives here, one instance per host:
//!
//! - `engines_by_partition`: partition id → that site's [`EngineLocals`].
//!   Written at site initialization, read during coordination. Publish
//!   once.
//! - `mp_locals`: the designated multi-partition impersonation locals.
//! - the replicated-write countdown latch: an atomic the sites decrement on
//!   reaching a replicated insert; the site that drives it to zero is the
//!   driver, everyone else waits.
//! - the driver-finished signal: a mutex-guarded generation counter plus a
//!   condvar. A waiter records the generation *before* decrementing the
//!   latch, so a driver that signals immediately cannot be missed.
//!
//! ```text
//! site A ──┐ count_down ──> latch 3→2   wait(gen=G) ──────────┐
//! site B ──┤ count_down ──> latch 2→1   wait(gen=G) ──────────┤ woken at
//! site C ──┘ count_down ──> latch 1→0 = driver                │ gen=G+1
//!              insert once → reset latch → signal (gen G→G+1) ┘
//! ```
//!
//! One latch serves the whole host; concurrent replicated writes are
//! serialized by the transaction layer above this crate.

use crate::engine::EngineLocals;
use eyre::{ensure, Result};
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicI32, Ordering};

/// Result of a latch decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// This decrement drove the latch to zero; the caller performs the
    /// replicated write.
    Driver,
    /// Another site will perform the write; wait for `observed_generation`
    /// to advance.
    Waiter { observed_generation: u64 },
}

struct FinishedSignal {
    generation: u64,
}

pub struct HostCoordinator {
    sites_per_host: i32,
    global_txn_start_countdown_latch: AtomicI32,
    signal: Mutex<FinishedSignal>,
    finished: Condvar,
    engines_by_partition: RwLock<HashMap<i32, EngineLocals>>,
    mp_locals: RwLock<Option<EngineLocals>>,
}

impl HostCoordinator {
    pub fn new(sites_per_host: i32) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            sites_per_host,
            global_txn_start_countdown_latch: AtomicI32::new(sites_per_host),
            signal: Mutex::new(FinishedSignal { generation: 0 }),
            finished: Condvar::new(),
            engines_by_partition: RwLock::new(HashMap::new()),
            mp_locals: RwLock::new(None),
        })
    }

    pub fn sites_per_host(&self) -> i32 {
        self.sites_per_host
    }

    /// Publishes a site's locals at initialization time.
    pub fn register_site(&self, locals: EngineLocals) {
        self.engines_by_partition
            .write()
            .insert(locals.partition_id, locals);
    }

    pub fn locals_for_partition(&self, partition_id: i32) -> Option<EngineLocals> {
        self.engines_by_partition.read().get(&partition_id).cloned()
    }

    /// Designates the locals the replicated-write driver impersonates.
    pub fn set_mp_locals(&self, locals: EngineLocals) {
        *self.mp_locals.write() = Some(locals);
    }

    pub fn mp_locals(&self) -> Result<EngineLocals> {
        self.mp_locals
            .read()
            .clone()
            .ok_or_else(|| eyre::eyre!("multi-partition locals were never designated"))
    }

    /// Decrement-and-test. The generation is read under the signal lock
    /// before the decrement, so the eventual driver's signal — which
    /// advances the generation — can never be missed by a waiter.
    pub fn count_down(&self) -> CountdownOutcome {
        let observed_generation = self.signal.lock().generation;
        let previous = self
            .global_txn_start_countdown_latch
            .fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            tracing::debug!("replicated-write driver selected");
            CountdownOutcome::Driver
        } else {
            CountdownOutcome::Waiter {
                observed_generation,
            }
        }
    }

    /// Driver-side: rearms the latch for the next replicated write. Must
    /// run before the finished signal.
    pub fn reset_latch(&self) {
        self.global_txn_start_countdown_latch
            .store(self.sites_per_host, Ordering::Release);
    }

    pub fn latch_value(&self) -> i32 {
        self.global_txn_start_countdown_latch.load(Ordering::Acquire)
    }

    pub fn signal_finished(&self) {
        let mut signal = self.signal.lock();
        signal.generation += 1;
        tracing::debug!(generation = signal.generation, "replicated write finished");
        drop(signal);
        self.finished.notify_all();
    }

    pub fn wait_finished(&self, observed_generation: u64) {
        let mut signal = self.signal.lock();
        while signal.generation == observed_generation {
            self.finished.wait(&mut signal);
        }
    }

    /// Sanity check used by hosts at boot.
    pub fn verify_topology(&self) -> Result<()> {
        let sites = self.engines_by_partition.read().len() as i32;
        ensure!(
            sites == self.sites_per_host,
            "{} sites registered for a host of {}",
            sites,
            self.sites_per_host
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SiteEngine;

    #[test]
    fn last_decrement_selects_the_driver_and_reset_rearms() {
        let coordinator = HostCoordinator::new(2);
        assert!(matches!(
            coordinator.count_down(),
            CountdownOutcome::Waiter { .. }
        ));
        assert_eq!(coordinator.count_down(), CountdownOutcome::Driver);
        coordinator.reset_latch();
        assert_eq!(coordinator.latch_value(), 2);
        assert!(matches!(
            coordinator.count_down(),
            CountdownOutcome::Waiter { .. }
        ));
    }

    #[test]
    fn a_signal_sent_before_the_wait_is_not_missed() {
        let coordinator = HostCoordinator::new(2);
        let outcome = coordinator.count_down();
        let CountdownOutcome::Waiter { observed_generation } = outcome else {
            panic!("first of two sites must be a waiter");
        };
        // Driver finishes before the waiter ever blocks.
        coordinator.signal_finished();
        coordinator.wait_finished(observed_generation);
    }

    #[test]
    fn partition_map_is_publish_once_read_many() {
        let coordinator = HostCoordinator::new(1);
        let engine = SiteEngine::new(7, 3, std::sync::Arc::clone(&coordinator));
        let locals = EngineLocals::new(&engine);
        coordinator.register_site(locals.clone());
        coordinator.set_mp_locals(locals);

        let found = coordinator.locals_for_partition(3).unwrap();
        assert_eq!(found.site_id, 7);
        assert_eq!(coordinator.mp_locals().unwrap().partition_id, 3);
        assert!(coordinator.locals_for_partition(9).is_none());
        coordinator.verify_topology().unwrap();
    }
}
