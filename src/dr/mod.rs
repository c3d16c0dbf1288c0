//! # DR Streams
//!
//! Database-replication log-tailing sinks. The execution core only rotates
//! them: a new stream takes over from the old one, inheriting its committed
//! sequence number after the old stream is flushed up to the last committed
//! single-partition handle. `committed_sequence_number` is monotonically
//! non-decreasing across rotations.

use eyre::{ensure, Result};

/// One recorded flush window, kept for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushWindow {
    pub sp_handle_low: i64,
    pub sp_handle_high: i64,
}

#[derive(Debug)]
pub struct DrStream {
    committed_sequence_number: i64,
    open_sp_handle: i64,
    flushes: Vec<FlushWindow>,
}

impl DrStream {
    pub fn new(committed_sequence_number: i64, open_sp_handle: i64) -> Self {
        Self {
            committed_sequence_number,
            open_sp_handle,
            flushes: Vec::new(),
        }
    }

    pub fn committed_sequence_number(&self) -> i64 {
        self.committed_sequence_number
    }

    pub fn open_sp_handle(&self) -> i64 {
        self.open_sp_handle
    }

    pub fn set_open_sp_handle(&mut self, sp_handle: i64) {
        self.open_sp_handle = sp_handle;
    }

    /// Flushes buffered changes in the given handle window.
    pub fn periodic_flush(&mut self, sp_handle_low: i64, sp_handle_high: i64) {
        tracing::trace!(sp_handle_low, sp_handle_high, "dr stream flush");
        self.flushes.push(FlushWindow {
            sp_handle_low,
            sp_handle_high,
        });
    }

    /// Carries the retiring stream's committed sequence number onto this
    /// stream. The number never moves backwards.
    pub fn set_last_committed_sequence_number(&mut self, sequence_number: i64) -> Result<()> {
        ensure!(
            sequence_number >= self.committed_sequence_number,
            "committed sequence number would move backwards: {} -> {}",
            self.committed_sequence_number,
            sequence_number
        );
        self.committed_sequence_number = sequence_number;
        Ok(())
    }

    pub fn flushes(&self) -> &[FlushWindow] {
        &self.flushes
    }
}
