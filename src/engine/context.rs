//! # Executor Context and Dispatcher
//!
//! One [`ExecutorContext`] exists per site, bound to that site's OS thread.
//! It owns the compiled executor lists (one per subquery id), the shared
//! parameter vector, and the DR stream handles, and it drives execution:
//! each executor in a list runs in order, reading its child's temp output
//! and writing its own; the last executor's output is the fragment result.
//!
//! ## Replicated-Table Writes
//!
//! When the next executor is an insert into a replicated persistent table,
//! only one site per host may perform it. Every site reaching that executor
//! decrements the host latch; the site that drives it to zero becomes the
//! driver, rebinds its thread to the designated multi-partition locals,
//! performs the insert exactly once, rearms the latch, restores its own
//! locals, and signals. The other sites block on the signal and then step
//! past the executor without running it. A failing driver still rearms,
//! restores, and signals before the error propagates — waiters never
//! strand.
//!
//! ## Failure Cleanup
//!
//! Any executor failure releases every executor's temp output table and
//! every executor's scratch pool, then propagates the error to the host.
//! No retry happens at this layer.
//!
//! ## Thread Binding
//!
//! A process-wide thread-local carries the currently bound
//! [`EngineLocals`] so deeply nested collaborators can reach the active
//! site without threading it through every call. Rebinding during a
//! replicated write is transient; the driver restores its own locals
//! before signalling.

use crate::dr::DrStream;
use crate::engine::{SiteEngine, UndoQuantum};
use crate::exec::PlanExecutor;
use crate::memory::{Pool, TempTableLimits};
use crate::plan::PlanNode;
use crate::table::TempTable;
use crate::types::SqlValue;
use eyre::{ensure, Result};
use hashbrown::HashMap;
use std::cell::RefCell;
use std::sync::{Arc, Once};

thread_local! {
    static BOUND_ENGINE_LOCALS: RefCell<Option<EngineLocals>> = const { RefCell::new(None) };
}

static GLOBAL_INIT: Once = Once::new();

/// Once per process: pin the timezone the engine computes in. Allocator
/// tuning has no equivalent here; the Rust allocator is not shared with a
/// co-resident runtime.
fn global_init_once_per_process() {
    GLOBAL_INIT.call_once(|| {
        if std::env::var_os("TZ").is_none() {
            std::env::set_var("TZ", "UTC");
        }
    });
}

/// The bundle swapped onto a thread as a unit: enough to impersonate a
/// partition from another thread.
#[derive(Clone)]
pub struct EngineLocals {
    pub site_id: i64,
    pub partition_id: i32,
    pub engine: Arc<SiteEngine>,
}

impl EngineLocals {
    pub fn new(engine: &Arc<SiteEngine>) -> Self {
        Self {
            site_id: engine.site_id(),
            partition_id: engine.partition_id(),
            engine: Arc::clone(engine),
        }
    }
}

/// Cached state of a subquery's last run.
pub struct SubqueryContext {
    pub last_execution_params: Vec<SqlValue>,
}

pub struct ExecutorContext {
    site_id: i64,
    partition_id: i32,
    host_id: i32,
    hostname: String,
    params: Vec<SqlValue>,
    undo_quantum: UndoQuantum,
    dr_stream: Option<DrStream>,
    dr_replicated_stream: Option<DrStream>,
    temp_string_pool: Pool,
    executors_map: HashMap<i32, Vec<PlanExecutor>>,
    staged_inputs: HashMap<i32, TempTable>,
    subquery_context_map: HashMap<i32, SubqueryContext>,
    engine: Arc<SiteEngine>,
    temp_limits: TempTableLimits,
    txn_id: i64,
    sp_handle: i64,
    last_committed_sp_handle: i64,
}

impl ExecutorContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        site_id: i64,
        partition_id: i32,
        host_id: i32,
        hostname: impl Into<String>,
        engine: Arc<SiteEngine>,
        undo_quantum: UndoQuantum,
        dr_stream: Option<DrStream>,
        dr_replicated_stream: Option<DrStream>,
        temp_limits: TempTableLimits,
    ) -> Self {
        global_init_once_per_process();
        let context = Self {
            site_id,
            partition_id,
            host_id,
            hostname: hostname.into(),
            params: Vec::new(),
            undo_quantum,
            dr_stream,
            dr_replicated_stream,
            temp_string_pool: Pool::new(),
            executors_map: HashMap::new(),
            staged_inputs: HashMap::new(),
            subquery_context_map: HashMap::new(),
            engine,
            temp_limits,
            txn_id: 0,
            sp_handle: 0,
            last_committed_sp_handle: 0,
        };
        context.bind_to_thread();
        context
    }

    pub fn site_id(&self) -> i64 {
        self.site_id
    }

    pub fn partition_id(&self) -> i32 {
        self.partition_id
    }

    pub fn host_id(&self) -> i32 {
        self.host_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn engine(&self) -> &Arc<SiteEngine> {
        &self.engine
    }

    pub fn undo_quantum(&self) -> UndoQuantum {
        self.undo_quantum
    }

    pub fn temp_string_pool(&mut self) -> &mut Pool {
        &mut self.temp_string_pool
    }

    /// Locals describing this context, as published on the coordinator.
    pub fn locals(&self) -> EngineLocals {
        EngineLocals::new(&self.engine)
    }

    /// Binds this context's locals to the current thread.
    pub fn bind_to_thread(&self) {
        Self::assign_thread_locals(&self.locals());
    }

    /// Rebinds the current thread to another site's locals; how the
    /// replicated-write driver impersonates the multi-partition site.
    pub fn assign_thread_locals(locals: &EngineLocals) {
        BOUND_ENGINE_LOCALS.with(|bound| {
            *bound.borrow_mut() = Some(locals.clone());
        });
    }

    /// The locals bound to the current thread, if any.
    pub fn current_locals() -> Option<EngineLocals> {
        global_init_once_per_process();
        BOUND_ENGINE_LOCALS.with(|bound| bound.borrow().clone())
    }

    /// Per-batch transaction state the DR rotation reads.
    pub fn setup_for_plan_fragments(
        &mut self,
        txn_id: i64,
        sp_handle: i64,
        last_committed_sp_handle: i64,
    ) {
        self.txn_id = txn_id;
        self.sp_handle = sp_handle;
        self.last_committed_sp_handle = last_committed_sp_handle;
    }

    pub fn txn_id(&self) -> i64 {
        self.txn_id
    }

    pub fn sp_handle(&self) -> i64 {
        self.sp_handle
    }

    pub fn set_params(&mut self, params: Vec<SqlValue>) {
        self.params = params;
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Installs and initializes a subquery's executor list. The list must
    /// be topologically ordered: every executor's child precedes it.
    pub fn add_executor_list(&mut self, subquery_id: i32, nodes: Vec<PlanNode>) -> Result<()> {
        let mut executors = Vec::with_capacity(nodes.len());
        for (position, node) in nodes.into_iter().enumerate() {
            if let Some(child) = node.child() {
                ensure!(
                    child < position,
                    "executor list for subquery {} is not topologically ordered: \
                     executor {} reads child {}",
                    subquery_id,
                    position,
                    child
                );
            }
            let mut executor = PlanExecutor::build(node);
            executor.init(&self.temp_limits)?;
            executors.push(executor);
        }
        ensure!(
            !executors.is_empty(),
            "empty executor list for subquery {}",
            subquery_id
        );
        self.executors_map.insert(subquery_id, executors);
        Ok(())
    }

    /// Hands a fragment its input rows: the table the head executor of the
    /// subquery (an executor with no child) reads.
    pub fn stage_input_table(&mut self, subquery_id: i32, table: TempTable) {
        self.staged_inputs.insert(subquery_id, table);
    }

    /// Runs the executor list registered for `subquery_id` and returns the
    /// output table of its last executor.
    pub fn execute_executors(&mut self, subquery_id: i32) -> Result<&TempTable> {
        self.execute_subquery(subquery_id)?;
        self.subquery_output_table(subquery_id)
    }

    fn execute_subquery(&mut self, subquery_id: i32) -> Result<()> {
        let own_locals = EngineLocals::new(&self.engine);
        let run = {
            let staged = self.staged_inputs.get_mut(&subquery_id);
            let executors = self.executors_map.get_mut(&subquery_id).ok_or_else(|| {
                eyre::eyre!("no executor list for subquery {}", subquery_id)
            })?;
            run_executor_list(executors, staged, &self.params, &self.engine, &own_locals)
        };
        if let Err(err) = run {
            tracing::debug!(subquery_id, %err, "executor list failed; cleaning up");
            self.cleanup_all_executors();
            self.cleanup_all_memory_pools();
            return Err(err);
        }
        self.subquery_context_map.insert(
            subquery_id,
            SubqueryContext {
                last_execution_params: self.params.clone(),
            },
        );
        Ok(())
    }

    /// The last output table of a subquery, without executing anything.
    pub fn subquery_output_table(&self, subquery_id: i32) -> Result<&TempTable> {
        let executors = self.executors_map.get(&subquery_id).ok_or_else(|| {
            eyre::eyre!("no executor list for subquery {}", subquery_id)
        })?;
        executors
            .last()
            .and_then(PlanExecutor::output_table)
            .ok_or_else(|| eyre::eyre!("subquery {} has no output table", subquery_id))
    }

    pub fn subquery_context(&self, subquery_id: i32) -> Option<&SubqueryContext> {
        self.subquery_context_map.get(&subquery_id)
    }

    /// Releases the temp output tables of one subquery's executors.
    pub fn cleanup_executors_for_subquery(&mut self, subquery_id: i32) {
        if let Some(executors) = self.executors_map.get_mut(&subquery_id) {
            for executor in executors {
                executor.cleanup_temp_output_table();
            }
        }
        self.subquery_context_map.remove(&subquery_id);
    }

    /// Releases every executor's temp output table and forgets cached
    /// subquery state. Idempotent.
    pub fn cleanup_all_executors(&mut self) {
        for executors in self.executors_map.values_mut() {
            for executor in executors {
                executor.cleanup_temp_output_table();
            }
        }
        self.subquery_context_map.clear();
        self.temp_string_pool.purge();
    }

    fn cleanup_all_memory_pools(&mut self) {
        for executors in self.executors_map.values_mut() {
            for executor in executors {
                executor.cleanup_memory_pool();
            }
        }
    }

    pub fn all_output_temp_tables_are_empty(&self) -> bool {
        self.executors_map
            .values()
            .flatten()
            .all(PlanExecutor::output_temp_table_is_empty)
    }

    /// Rotates the partition DR stream: flushes the old stream up to the
    /// last committed handle, then carries its committed sequence number
    /// onto the new stream. Returns the retired stream to the host.
    pub fn set_dr_stream(&mut self, new_stream: DrStream) -> Result<DrStream> {
        let retired = rotate_dr_stream(
            &mut self.dr_stream,
            new_stream,
            self.last_committed_sp_handle,
        )?;
        Ok(retired)
    }

    /// Rotates the replicated-table DR stream; same contract as
    /// [`ExecutorContext::set_dr_stream`].
    pub fn set_dr_replicated_stream(&mut self, new_stream: DrStream) -> Result<DrStream> {
        let retired = rotate_dr_stream(
            &mut self.dr_replicated_stream,
            new_stream,
            self.last_committed_sp_handle,
        )?;
        Ok(retired)
    }

    pub fn dr_stream(&self) -> Option<&DrStream> {
        self.dr_stream.as_ref()
    }

    pub fn dr_replicated_stream(&self) -> Option<&DrStream> {
        self.dr_replicated_stream.as_ref()
    }
}

impl Drop for ExecutorContext {
    fn drop(&mut self) {
        BOUND_ENGINE_LOCALS.with(|bound| {
            let mut bound = bound.borrow_mut();
            if bound.as_ref().is_some_and(|l| l.site_id == self.site_id) {
                *bound = None;
            }
        });
    }
}

fn rotate_dr_stream(
    slot: &mut Option<DrStream>,
    mut new_stream: DrStream,
    last_committed_sp_handle: i64,
) -> Result<DrStream> {
    let mut old_stream = slot
        .take()
        .ok_or_else(|| eyre::eyre!("no DR stream installed to rotate"))?;
    if old_stream.committed_sequence_number() < new_stream.committed_sequence_number() {
        // The old stream must be ahead; put it back before reporting.
        let message = format!(
            "DR rotation would regress the committed sequence number: {} -> {}",
            old_stream.committed_sequence_number(),
            new_stream.committed_sequence_number()
        );
        *slot = Some(old_stream);
        return Err(eyre::eyre!(message));
    }
    let flush_to = last_committed_sp_handle.max(new_stream.open_sp_handle());
    old_stream.periodic_flush(-1, flush_to);
    new_stream.set_last_committed_sequence_number(old_stream.committed_sequence_number())?;
    *slot = Some(new_stream);
    Ok(old_stream)
}

/// Runs one executor list in order. The caller owns failure cleanup; this
/// function owns the replicated-write gate.
fn run_executor_list(
    executors: &mut [PlanExecutor],
    mut staged_input: Option<&mut TempTable>,
    params: &[SqlValue],
    engine: &Arc<SiteEngine>,
    own_locals: &EngineLocals,
) -> Result<()> {
    for position in 0..executors.len() {
        let (before, rest) = executors.split_at_mut(position);
        let executor = &mut rest[0];
        let input: Option<&mut TempTable> = match executor.child() {
            Some(child) => {
                ensure!(
                    child < position,
                    "executor {} reads child {} that has not run yet",
                    position,
                    child
                );
                before[child].output_table_mut()
            }
            None => staged_input.as_deref_mut(),
        };

        if executor.is_replicated_insert() {
            let mp_locals = engine.coordinator().mp_locals()?;
            if engine.count_down_global_txn_start() {
                tracing::debug!(position, "driving replicated insert");
                ExecutorContext::assign_thread_locals(&mp_locals);
                let result = executor.execute(input, params, &mp_locals.engine);
                // Success or failure, the latch is rearmed, this site's
                // locals restored, and the waiters signalled before the
                // error can propagate — otherwise they deadlock.
                engine.coordinator().reset_latch();
                ExecutorContext::assign_thread_locals(own_locals);
                engine.signal_last_site_finished();
                result?;
            } else {
                tracing::debug!(position, "waiting on replicated insert");
                engine.wait_for_last_site_finished();
            }
        } else {
            executor.execute(input, params, engine)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HostCoordinator;
    use crate::expr::Expression;
    use crate::plan::ProjectionNode;
    use crate::table::TempTable;
    use crate::tuple::TupleSchema;
    use crate::types::DataType;

    fn test_context() -> ExecutorContext {
        let coordinator = HostCoordinator::new(1);
        let engine = SiteEngine::new(0, 0, coordinator);
        ExecutorContext::new(
            0,
            0,
            0,
            "test-host",
            engine,
            UndoQuantum::default(),
            Some(DrStream::new(0, 0)),
            Some(DrStream::new(0, 0)),
            TempTableLimits::default(),
        )
    }

    fn staged_bigints(
        schema: &std::sync::Arc<TupleSchema>,
        values: &[i64],
    ) -> TempTable {
        let mut table = TempTable::new(
            "staged_input",
            std::sync::Arc::clone(schema),
            TempTableLimits::default(),
        );
        for v in values {
            let mut t = table.temp_tuple();
            t.set_value(0, &SqlValue::BigInt(*v)).unwrap();
            table.insert_temp_tuple(&t).unwrap();
        }
        table
    }

    fn identity_projection(schema: &std::sync::Arc<TupleSchema>, child: Option<usize>) -> PlanNode {
        PlanNode::Projection(ProjectionNode {
            child,
            output_columns: vec![Expression::column(0)],
            output_schema: std::sync::Arc::clone(schema),
        })
    }

    #[test]
    fn execute_executors_returns_the_last_output_table() {
        let mut context = test_context();
        let schema = TupleSchema::from_types(&[DataType::BigInt]);
        context
            .add_executor_list(
                1,
                vec![
                    identity_projection(&schema, None),
                    identity_projection(&schema, Some(0)),
                ],
            )
            .unwrap();
        context.stage_input_table(1, staged_bigints(&schema, &[4, 5]));

        let output = context.execute_executors(1).unwrap();
        assert_eq!(
            output.collect_values().unwrap(),
            vec![vec![SqlValue::BigInt(4)], vec![SqlValue::BigInt(5)]]
        );
    }

    #[test]
    fn out_of_order_lists_are_rejected_at_install_time() {
        let mut context = test_context();
        let schema = TupleSchema::from_types(&[DataType::BigInt]);
        let err = context
            .add_executor_list(1, vec![identity_projection(&schema, Some(0))])
            .unwrap_err();
        assert!(err.to_string().contains("not topologically ordered"));
    }

    #[test]
    fn cleanup_is_idempotent_and_empties_outputs() {
        let mut context = test_context();
        let schema = TupleSchema::from_types(&[DataType::BigInt]);
        context
            .add_executor_list(1, vec![identity_projection(&schema, None)])
            .unwrap();
        context.stage_input_table(1, staged_bigints(&schema, &[1]));
        context.execute_executors(1).unwrap();
        assert!(!context.all_output_temp_tables_are_empty());
        assert!(context.subquery_context(1).is_some());
        context.cleanup_all_executors();
        assert!(context.all_output_temp_tables_are_empty());
        assert!(context.subquery_context(1).is_none());
        context.cleanup_all_executors();
        assert!(context.all_output_temp_tables_are_empty());
    }

    #[test]
    fn dr_rotation_carries_the_committed_sequence_number() {
        let mut context = test_context();
        context.setup_for_plan_fragments(1, 40, 35);
        context
            .dr_stream
            .as_mut()
            .unwrap()
            .set_last_committed_sequence_number(17)
            .unwrap();

        let fresh = DrStream::new(3, 50);
        let retired = context.set_dr_stream(fresh).unwrap();
        assert_eq!(retired.committed_sequence_number(), 17);
        assert_eq!(
            retired.flushes().last().unwrap().sp_handle_high,
            50,
            "flush reaches max(last committed sp handle, new open sp handle)"
        );
        assert_eq!(
            context.dr_stream().unwrap().committed_sequence_number(),
            17
        );
    }

    #[test]
    fn dr_rotation_refuses_a_regressing_stream() {
        let mut context = test_context();
        context
            .dr_stream
            .as_mut()
            .unwrap()
            .set_last_committed_sequence_number(5)
            .unwrap();
        let err = context.set_dr_stream(DrStream::new(9, 0)).unwrap_err();
        assert!(err.to_string().contains("regress"));
        // The original stream is still installed.
        assert_eq!(context.dr_stream().unwrap().committed_sequence_number(), 5);
    }

    #[test]
    fn thread_binding_tracks_the_latest_context() {
        let context = test_context();
        let bound = ExecutorContext::current_locals().unwrap();
        assert_eq!(bound.site_id, context.site_id());
        drop(context);
        assert!(ExecutorContext::current_locals().is_none());
    }
}
