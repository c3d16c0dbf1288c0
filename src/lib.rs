//! # SiteDB - Per-Site Query Execution Core
//!
//! SiteDB is the per-site execution core of a partitioned, in-memory
//! relational engine. Each site owns one partition of the data and runs
//! pre-compiled plan fragments on behalf of transactions. The crate covers
//! three tightly coupled subsystems:
//!
//! - An **executor context and dispatcher** that drives an ordered list of
//!   plan-node executors to completion, manages per-thread state, and
//!   coordinates replicated-table writes across sibling sites on a host.
//! - A family of **plan-node executors** (projection, swap-tables, insert,
//!   window-function) covering the representative shapes: pure streaming
//!   transform, metadata-only operation, append, and stateful multi-pass
//!   aggregation.
//! - A **window-function engine** implementing `OVER (PARTITION BY ...
//!   ORDER BY ...)` semantics for rank, dense-rank, and count with a
//!   two-cursor streaming scan.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   ExecutorContext (per site, per thread)  │
//! ├──────────────────────────────────────────┤
//! │  Dispatcher │ HostCoordinator (per host)  │
//! ├──────────────────────────────────────────┤
//! │ Projection │ SwapTables │ Insert │ Window │
//! ├──────────────────────────────────────────┤
//! │   Expressions │ Plan Nodes │ DR Streams   │
//! ├──────────────────────────────────────────┤
//! │  Tables & Iterators │ Tuples & Schemas    │
//! ├──────────────────────────────────────────┤
//! │        Values │ Types │ Memory Pool       │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Execution Model
//!
//! One OS thread per site; everything within a site is single-threaded and
//! synchronous. The host hands an [`engine::ExecutorContext`] a subquery id
//! and a parameter vector; the context runs the corresponding executor list
//! in order and returns the output table of the last executor. Replicated
//! persistent tables are written by exactly one site per host, selected
//! through an atomic countdown latch on the [`engine::HostCoordinator`].
//!
//! ## Module Overview
//!
//! - [`types`]: value types and the runtime [`types::SqlValue`] scalar
//! - [`tuple`]: fixed-width tuple layout, schemas, zero-copy views
//! - [`memory`]: bump-allocated scratch pool and temp-table limits
//! - [`table`]: temp and persistent tables with cursor-pair iteration
//! - [`expr`]: the closed expression tree executors evaluate
//! - [`plan`]: pre-compiled plan nodes
//! - [`exec`]: the executor family and the window-function engine
//! - [`engine`]: site engine callbacks, host coordination, executor context
//! - [`dr`]: database-replication stream collaborators

pub mod config;
pub mod dr;
pub mod engine;
pub mod exec;
pub mod expr;
pub mod memory;
pub mod plan;
pub mod table;
pub mod tuple;
pub mod types;

pub use engine::{EngineLocals, ExecutorContext, HostCoordinator, SiteEngine};
pub use types::{DataType, SqlValue};
