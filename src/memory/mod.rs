//! # Memory Pool and Temp-Table Limits
//!
//! Scratch memory in the execution core comes from two mechanisms:
//!
//! - [`Pool`]: a bump arena for per-transaction scratch (temporary strings,
//!   short-lived working buffers). Allocation is a pointer bump; `purge`
//!   frees everything at once. Nothing allocated from a pool is freed
//!   individually.
//! - [`TempTableLimits`]: a hard byte budget shared by an executor list's
//!   temp output tables. Inserts that would exceed the budget are refused
//!   with an error; there is no spill path at this layer.
//!
//! The hard-limit model matches the rest of the engine: refusing work is
//! safer than letting scratch grow unbounded inside a transaction.

use crate::config::DEFAULT_TEMP_TABLE_LIMIT_BYTES;
use bumpalo::Bump;
use eyre::{ensure, Result};

/// Bump-allocated arena scratch pool.
pub struct Pool {
    bump: Bump,
}

impl Pool {
    pub fn new() -> Self {
        Self { bump: Bump::new() }
    }

    /// Allocates `n` bytes.
    pub fn allocate(&self, n: usize) -> &mut [u8] {
        self.bump.alloc_slice_fill_copy(n, 0u8)
    }

    /// Allocates `n` zeroed bytes.
    pub fn allocate_zeroes(&self, n: usize) -> &mut [u8] {
        self.bump.alloc_slice_fill_copy(n, 0u8)
    }

    /// Moves a value into the pool. `purge` frees it without running
    /// `Drop`; pooled values must not own heap resources.
    pub fn alloc<T>(&self, value: T) -> &mut T {
        self.bump.alloc(value)
    }

    /// Copies a string into the pool, returning the pooled slice.
    pub fn allocate_string<'a>(&'a self, s: &str) -> &'a str {
        self.bump.alloc_str(s)
    }

    /// Frees every allocation at once.
    pub fn purge(&mut self) {
        self.bump.reset();
    }

    /// Bytes currently held by the arena, including block overhead.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

/// Hard byte budget for temp output tables.
#[derive(Debug, Clone, Copy)]
pub struct TempTableLimits {
    memory_limit: usize,
}

impl TempTableLimits {
    pub fn new(memory_limit: usize) -> Self {
        Self { memory_limit }
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Refuses growth past the budget.
    pub fn check(&self, used_bytes: usize, additional: usize) -> Result<()> {
        ensure!(
            used_bytes + additional <= self.memory_limit,
            "temp table limit exceeded: {} + {} bytes over budget of {}",
            used_bytes,
            additional,
            self.memory_limit
        );
        Ok(())
    }
}

impl Default for TempTableLimits {
    fn default() -> Self {
        Self::new(DEFAULT_TEMP_TABLE_LIMIT_BYTES)
    }
}
