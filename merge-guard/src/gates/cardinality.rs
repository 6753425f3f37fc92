//! Distinct-count drift against reference values.

use crate::core::{current_validation_context, GateMetadata, GateResult, Level, QualityGate};
use crate::prelude::*;
use crate::stats;
use async_trait::async_trait;
use datafusion::prelude::*;
use tracing::instrument;

/// Compares a column's distinct count with an expected value.
///
/// Stores open and departments get renumbered, so a mismatch is schema
/// drift to look at, reported as a warning.
#[derive(Debug, Clone)]
pub struct CardinalityGate {
    column: String,
    expected: u64,
    name: String,
}

impl CardinalityGate {
    pub fn new(column: impl Into<String>, expected: u64) -> Self {
        let column = column.into();
        Self {
            name: format!("cardinality.{column}"),
            column,
            expected,
        }
    }
}

#[async_trait]
impl QualityGate for CardinalityGate {
    #[instrument(skip(self, ctx), fields(gate.name = %self.name, gate.expected = self.expected))]
    async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult> {
        let table = current_validation_context();
        let distinct = stats::distinct_count(ctx, table.table_name(), &self.column).await?;

        Ok(GateResult::from_check(
            &self.name,
            Level::Warning,
            distinct == self.expected,
            distinct.to_string(),
            format!("= {}", self.expected),
        )
        .with_metric(distinct as f64))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Level {
        Level::Warning
    }

    fn metadata(&self) -> GateMetadata {
        GateMetadata::for_column(&self.column)
            .with_description(format!("Expects {} distinct values", self.expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GateStatus;
    use crate::test_helpers::{evaluate_gate_with_context, session_with_table};
    use arrow::array::{ArrayRef, Int64Array};
    use std::sync::Arc;

    fn stores() -> SessionContext {
        session_with_table(
            "merged",
            vec![(
                "Store",
                Arc::new(Int64Array::from(vec![Some(1), Some(2), Some(2), None])) as ArrayRef,
            )],
        )
    }

    #[tokio::test]
    async fn test_matching_cardinality_passes() {
        let gate = CardinalityGate::new("Store", 2);
        let result = evaluate_gate_with_context(&gate, &stores(), "merged")
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Pass);
    }

    #[tokio::test]
    async fn test_drift_warns() {
        let gate = CardinalityGate::new("Store", 45);
        let result = evaluate_gate_with_context(&gate, &stores(), "merged")
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Warning);
        assert_eq!(result.observed, "2");
        assert_eq!(result.expected, "= 45");
    }
}
