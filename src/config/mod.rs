//! # Configuration Constants
//!
//! This module centralizes the execution core's tunable constants. Values
//! that depend on each other are co-located and their relationships
//! documented so a change in one is checked against the others.
//!
//! ```text
//! DEFAULT_TEMP_TABLE_LIMIT_BYTES (100 MiB)
//!       │
//!       └─> Hard per-executor scratch budget. Inserts into a temp output
//!           table that would exceed it are refused with an error; nothing
//!           spills to disk at this layer.
//!
//! PROGRESS_REPORT_INTERVAL (10,000 rows)
//!       │
//!       └─> Rows scanned between ProgressMonitor reports to the engine.
//!           Large enough to stay off the hot path, small enough that the
//!           host can interrupt a runaway scan.
//!
//! INLINE_TEXT_CAPACITY (64 bytes)
//!       │
//!       └─> Default inline capacity for TEXT cells in derived schemas.
//!           Each TEXT cell also carries a 2-byte length prefix.
//! ```

/// Hard byte budget for a single executor's temp output table.
pub const DEFAULT_TEMP_TABLE_LIMIT_BYTES: usize = 100 * 1024 * 1024;

/// Rows scanned between progress reports to the engine.
pub const PROGRESS_REPORT_INTERVAL: u64 = 10_000;

/// Default inline capacity in bytes for TEXT cells in derived schemas.
pub const INLINE_TEXT_CAPACITY: usize = 64;

/// Sites per host when a coordinator is built without an explicit topology.
pub const DEFAULT_SITES_PER_HOST: i32 = 1;
