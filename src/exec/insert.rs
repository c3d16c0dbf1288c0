//! # Insert Executor
//!
//! Appends its child's temp output rows to a persistent target table and
//! emits a one-row DML count. When the target is a replicated table the
//! dispatcher routes this executor through the host coordination protocol
//! so that exactly one site per host performs the write.

use crate::engine::SiteEngine;
use crate::memory::TempTableLimits;
use crate::plan::{dml_count_schema, InsertNode};
use crate::table::TempTable;
use crate::types::SqlValue;
use eyre::{ensure, Result};

pub struct InsertExecutor {
    node: InsertNode,
    output: Option<TempTable>,
}

impl InsertExecutor {
    pub fn new(node: InsertNode) -> Self {
        Self { node, output: None }
    }

    pub fn node(&self) -> &InsertNode {
        &self.node
    }

    pub fn targets_replicated_table(&self) -> bool {
        self.node.target.lock().is_replicated_table()
    }

    pub fn init(&mut self, limits: &TempTableLimits) -> Result<()> {
        self.output = Some(TempTable::new(
            "insert_dml_count",
            dml_count_schema(),
            *limits,
        ));
        Ok(())
    }

    pub fn execute(
        &mut self,
        input: Option<&mut TempTable>,
        _params: &[SqlValue],
        engine: &SiteEngine,
    ) -> Result<()> {
        let input = input.ok_or_else(|| eyre::eyre!("insert requires an input table"))?;
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| eyre::eyre!("insert executed before init"))?;

        let mut modified_tuples = 0i64;
        {
            let mut target = self.node.target.lock();
            ensure!(
                input.schema().tuple_size() == target.schema().tuple_size(),
                "insert input layout does not match table {}",
                target.name()
            );
            let mut iterator = input.iterator();
            while let Some(row) = iterator.next() {
                target.insert_tuple(&row)?;
                modified_tuples += 1;
            }
            tracing::trace!(table = %target.name(), rows = modified_tuples, "insert");
        }

        let mut count_tuple = output.temp_tuple();
        count_tuple.set_value(0, &SqlValue::big_int(modified_tuples))?;
        output.insert_temp_tuple(&count_tuple)?;
        engine.add_to_tuples_modified(modified_tuples);
        Ok(())
    }

    pub fn output_table(&self) -> Option<&TempTable> {
        self.output.as_ref()
    }

    pub fn output_table_mut(&mut self) -> Option<&mut TempTable> {
        self.output.as_mut()
    }
}
