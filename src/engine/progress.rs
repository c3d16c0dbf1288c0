//! # Progress Monitor
//!
//! Row-count reporting for long scans. The executor calls
//! `countdown_progress` once per row; every
//! [`crate::config::PROGRESS_REPORT_INTERVAL`] rows the batch is flushed to
//! the engine, and the remainder is flushed when the monitor drops — so the
//! tally is exact whether the scan finishes or fails mid-way. The executor
//! itself never polls for cancellation; the host acts on the reported
//! counts.

use crate::config::PROGRESS_REPORT_INTERVAL;
use crate::engine::SiteEngine;

pub struct ProgressMonitor<'a> {
    engine: &'a SiteEngine,
    countdown: u64,
    batch: u64,
}

impl<'a> ProgressMonitor<'a> {
    pub fn new(engine: &'a SiteEngine) -> Self {
        Self {
            engine,
            countdown: PROGRESS_REPORT_INTERVAL,
            batch: 0,
        }
    }

    pub fn countdown_progress(&mut self) {
        self.batch += 1;
        self.countdown -= 1;
        if self.countdown == 0 {
            self.engine.report_progress(self.batch);
            self.batch = 0;
            self.countdown = PROGRESS_REPORT_INTERVAL;
        }
    }
}

impl Drop for ProgressMonitor<'_> {
    fn drop(&mut self) {
        if self.batch > 0 {
            self.engine.report_progress(self.batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HostCoordinator;

    #[test]
    fn remainder_is_flushed_on_drop() {
        let coordinator = HostCoordinator::new(1);
        let engine = SiteEngine::new(0, 0, coordinator);
        {
            let mut monitor = ProgressMonitor::new(&engine);
            for _ in 0..3 {
                monitor.countdown_progress();
            }
        }
        assert_eq!(engine.progress_rows(), 3);
    }

    #[test]
    fn full_batches_are_flushed_in_flight() {
        let coordinator = HostCoordinator::new(1);
        let engine = SiteEngine::new(0, 0, coordinator);
        {
            let mut monitor = ProgressMonitor::new(&engine);
            for _ in 0..PROGRESS_REPORT_INTERVAL + 1 {
                monitor.countdown_progress();
            }
            assert_eq!(engine.progress_rows(), PROGRESS_REPORT_INTERVAL);
        }
        assert_eq!(engine.progress_rows(), PROGRESS_REPORT_INTERVAL + 1);
    }
}
