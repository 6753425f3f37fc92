//! Row counts at named checkpoints.
//!
//! Both join steps are left joins, so the left input's row count is a fixed
//! expectation for the step's output. Comparing the two catches fan-out from
//! duplicate right-side keys as well as attrition from inner-join semantics.

use crate::core::{GateResult, Level, MergeContext};
use crate::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Checkpoint names recorded by the pipeline.
pub mod checkpoints {
    pub const SALES_INGESTED: &str = "sales.ingested";
    pub const INDICATORS_INGESTED: &str = "indicators.ingested";
    pub const STORES_INGESTED: &str = "stores.ingested";
    pub const JOINED_INDICATORS: &str = "joined.indicators";
    pub const JOINED_STORES: &str = "joined.stores";
    pub const MERGED_OUTPUT: &str = "merged.output";
}

/// A recorded row count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub rows: usize,
}

/// Records row counts in the order they were taken.
#[derive(Debug, Clone, Default)]
pub struct RowCountTracker {
    checkpoints: Vec<Checkpoint>,
}

impl RowCountTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `rows` at `name`, replacing an earlier count of the same name.
    pub fn record(&mut self, name: impl Into<String>, rows: usize) {
        let name = name.into();
        debug!(checkpoint.name = %name, rows, "Recorded row count");
        match self.checkpoints.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.rows = rows,
            None => self.checkpoints.push(Checkpoint { name, rows }),
        }
    }

    /// Counts the rows of `table` and records them at `name`.
    pub async fn record_table(
        &mut self,
        ctx: &MergeContext,
        name: impl Into<String>,
        table: &str,
    ) -> Result<usize> {
        let rows = ctx.row_count(table).await?;
        self.record(name, rows);
        Ok(rows)
    }

    pub fn count(&self, name: &str) -> Option<usize> {
        self.checkpoints
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.rows)
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Compares two checkpoints and describes the comparison as a fatal check.
    ///
    /// Errors only if a checkpoint was never recorded.
    pub fn reconcile(&self, expected: &str, actual: &str) -> Result<GateResult> {
        let expected_rows = self.require(expected)?;
        let actual_rows = self.require(actual)?;
        Ok(GateResult::from_check(
            format!("row_count.{actual}"),
            Level::Fatal,
            expected_rows == actual_rows,
            actual_rows.to_string(),
            format!("= {expected_rows} ({expected})"),
        )
        .with_metric(actual_rows as f64))
    }

    /// Fails with [`MergeError::RowCountDivergence`] if the two checkpoints
    /// hold different counts.
    pub fn assert_preserved(&self, expected: &str, actual: &str) -> Result<()> {
        let expected_rows = self.require(expected)?;
        let actual_rows = self.require(actual)?;
        if expected_rows != actual_rows {
            error!(
                checkpoint.expected = %expected,
                checkpoint.actual = %actual,
                expected_rows,
                actual_rows,
                "Row count divergence"
            );
            return Err(MergeError::row_count_divergence(
                expected,
                expected_rows,
                actual,
                actual_rows,
            ));
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.count(name)
            .ok_or_else(|| MergeError::Internal(format!("Checkpoint '{name}' was never recorded")))
    }
}
