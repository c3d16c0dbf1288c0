//! # Integration Tests for Replicated Writes
//!
//! One OS thread per site, all sites racing into the same replicated
//! insert. The host latch must select exactly one driver, the table must
//! grow by exactly the driver's rows, every site must observe the same
//! table state afterwards, and the latch must be rearmed for the next
//! transaction — including when the driver's execute fails.

use sitedb::dr::DrStream;
use sitedb::engine::{EngineLocals, ExecutorContext, HostCoordinator, SiteEngine, UndoQuantum};
use sitedb::expr::Expression;
use sitedb::memory::TempTableLimits;
use sitedb::plan::{InsertNode, PlanNode, ProjectionNode};
use sitedb::table::{PersistentTable, SharedPersistentTable, TempTable};
use sitedb::tuple::TupleSchema;
use sitedb::types::{DataType, SqlValue};
use std::sync::{Arc, Barrier};

const SITES_PER_HOST: i32 = 4;

struct Host {
    coordinator: Arc<HostCoordinator>,
    engines: Vec<Arc<SiteEngine>>,
    replicated: SharedPersistentTable,
    schema: Arc<TupleSchema>,
}

fn build_host() -> Host {
    let coordinator = HostCoordinator::new(SITES_PER_HOST);
    let schema = TupleSchema::from_types(&[DataType::BigInt]);
    let replicated = PersistentTable::new("replicated", Arc::clone(&schema), true).shared();
    let engines: Vec<Arc<SiteEngine>> = (0..SITES_PER_HOST)
        .map(|site| SiteEngine::new(site as i64, site, Arc::clone(&coordinator)))
        .collect();
    for engine in &engines {
        coordinator.register_site(EngineLocals::new(engine));
    }
    coordinator.set_mp_locals(EngineLocals::new(&engines[0]));
    coordinator.verify_topology().unwrap();
    Host {
        coordinator,
        engines,
        replicated,
        schema,
    }
}

/// Plan every site compiles: project the staged row, insert it into the
/// replicated table.
fn replicated_insert_plan(host: &Host) -> Vec<PlanNode> {
    vec![
        PlanNode::Projection(ProjectionNode {
            child: None,
            output_columns: vec![Expression::column(0)],
            output_schema: Arc::clone(&host.schema),
        }),
        PlanNode::Insert(InsertNode {
            child: Some(0),
            target: Arc::clone(&host.replicated),
        }),
    ]
}

fn staged_row(schema: &Arc<TupleSchema>, value: i64) -> TempTable {
    let mut table = TempTable::new("staged", Arc::clone(schema), TempTableLimits::default());
    let mut tuple = table.temp_tuple();
    tuple.set_value(0, &SqlValue::BigInt(value)).unwrap();
    table.insert_temp_tuple(&tuple).unwrap();
    table
}

/// Runs one transaction on every site concurrently; returns per-site
/// (execute result row counts, error flag).
fn run_round(host: &Host, rounds: usize) -> Vec<(usize, bool)> {
    let barrier = Arc::new(Barrier::new(SITES_PER_HOST as usize));
    let mut handles = Vec::new();
    for engine in host.engines.iter().cloned() {
        let barrier = Arc::clone(&barrier);
        let nodes_per_round: Vec<Vec<PlanNode>> =
            (0..rounds).map(|_| replicated_insert_plan(host)).collect();
        let schema = Arc::clone(&host.schema);
        handles.push(std::thread::spawn(move || {
            let site_id = engine.site_id();
            let mut context = ExecutorContext::new(
                site_id,
                engine.partition_id(),
                0,
                "test-host",
                engine,
                UndoQuantum::default(),
                Some(DrStream::new(0, 0)),
                Some(DrStream::new(0, 0)),
                TempTableLimits::default(),
            );
            let mut output_rows = 0usize;
            let mut failed = false;
            for (round, nodes) in nodes_per_round.into_iter().enumerate() {
                let subquery_id = round as i32;
                context.add_executor_list(subquery_id, nodes).unwrap();
                context.stage_input_table(subquery_id, staged_row(&schema, site_id));
                barrier.wait();
                match context.execute_executors(subquery_id) {
                    Ok(output) => output_rows += output.row_count(),
                    Err(_) => failed = true,
                }
            }
            (output_rows, failed)
        }));
    }
    handles
        .into_iter()
        .map(|h| h.join().expect("site thread panicked"))
        .collect()
}

#[test]
fn replicated_insert_runs_exactly_once_across_sites() {
    let host = build_host();
    let results = run_round(&host, 1);

    assert_eq!(
        host.replicated.lock().visible_tuple_count(),
        1,
        "four racing sites SHOULD produce exactly one replicated insert"
    );
    assert!(results.iter().all(|(_, failed)| !failed));
    let driver_outputs = results.iter().filter(|(rows, _)| *rows == 1).count();
    assert_eq!(
        driver_outputs, 1,
        "only the driver SHOULD emit a DML count row; waiters skip the executor"
    );
    let total_modified: i64 = host.engines.iter().map(|e| e.tuples_modified()).sum();
    assert_eq!(total_modified, 1);
    assert_eq!(
        host.coordinator.latch_value(),
        SITES_PER_HOST,
        "driver SHOULD rearm the latch"
    );
}

#[test]
fn latch_rearms_across_consecutive_transactions() {
    let host = build_host();
    let results = run_round(&host, 3);

    assert_eq!(host.replicated.lock().visible_tuple_count(), 3);
    assert!(results.iter().all(|(_, failed)| !failed));
    assert_eq!(host.coordinator.latch_value(), SITES_PER_HOST);
}

#[test]
fn all_sites_observe_the_same_table_state() {
    let host = build_host();
    run_round(&host, 1);

    let rows = host.replicated.lock().collect_values().unwrap();
    assert_eq!(rows.len(), 1);
    // The inserted row carries the driver's site id; whichever site won,
    // every observer reads the same value through the shared handle.
    let SqlValue::BigInt(winner) = &rows[0][0] else {
        panic!("replicated row SHOULD be a BIGINT site id");
    };
    assert!((0..SITES_PER_HOST as i64).contains(winner));
}

#[test]
fn failed_driver_still_releases_the_waiters() {
    let host = build_host();

    // Every site stages an input whose layout does not match the target
    // table, so whichever site drives the insert fails mid-executor. The
    // projection feeding it fails first on width, before the insert runs —
    // so build the mismatch at the insert itself: a two-column plan.
    let wide_schema = TupleSchema::from_types(&[DataType::BigInt, DataType::BigInt]);
    let barrier = Arc::new(Barrier::new(SITES_PER_HOST as usize));
    let mut handles = Vec::new();
    for engine in host.engines.iter().cloned() {
        let barrier = Arc::clone(&barrier);
        let wide_schema = Arc::clone(&wide_schema);
        let target = Arc::clone(&host.replicated);
        handles.push(std::thread::spawn(move || {
            let site_id = engine.site_id();
            let mut context = ExecutorContext::new(
                site_id,
                engine.partition_id(),
                0,
                "test-host",
                engine,
                UndoQuantum::default(),
                None,
                None,
                TempTableLimits::default(),
            );
            context
                .add_executor_list(
                    0,
                    vec![
                        PlanNode::Projection(ProjectionNode {
                            child: None,
                            output_columns: vec![
                                Expression::column(0),
                                Expression::column(1),
                            ],
                            output_schema: Arc::clone(&wide_schema),
                        }),
                        PlanNode::Insert(InsertNode {
                            child: Some(0),
                            target,
                        }),
                    ],
                )
                .unwrap();
            let mut staged = TempTable::new(
                "staged",
                Arc::clone(&wide_schema),
                TempTableLimits::default(),
            );
            let mut tuple = staged.temp_tuple();
            tuple.set_value(0, &SqlValue::BigInt(site_id)).unwrap();
            tuple.set_value(1, &SqlValue::BigInt(site_id)).unwrap();
            staged.insert_temp_tuple(&tuple).unwrap();
            context.stage_input_table(0, staged);
            barrier.wait();
            context.execute_executors(0).is_err()
        }));
    }
    let failures: Vec<bool> = handles
        .into_iter()
        .map(|h| h.join().expect("site thread panicked"))
        .collect();

    // The driver fails; the waiters are signalled and proceed normally.
    assert_eq!(
        failures.iter().filter(|f| **f).count(),
        1,
        "exactly the driver SHOULD observe the failure"
    );
    assert_eq!(host.replicated.lock().visible_tuple_count(), 0);
    assert_eq!(
        host.coordinator.latch_value(),
        SITES_PER_HOST,
        "a failing driver SHOULD still rearm the latch"
    );
}

#[test]
fn dr_stream_rotation_is_monotonic_per_site() {
    let host = build_host();
    let engine = Arc::clone(&host.engines[0]);
    let mut context = ExecutorContext::new(
        0,
        0,
        0,
        "test-host",
        engine,
        UndoQuantum::default(),
        Some(DrStream::new(0, 0)),
        Some(DrStream::new(0, 0)),
        TempTableLimits::default(),
    );
    context.setup_for_plan_fragments(9, 100, 90);

    let retired = context.set_dr_replicated_stream(DrStream::new(0, 120)).unwrap();
    assert_eq!(
        retired.flushes().last().unwrap().sp_handle_high,
        120,
        "rotation SHOULD flush up to max(last committed handle, new open handle)"
    );
    assert_eq!(
        context
            .dr_replicated_stream()
            .unwrap()
            .committed_sequence_number(),
        retired.committed_sequence_number(),
        "the new stream SHOULD inherit the retired stream's committed sequence number"
    );
}
