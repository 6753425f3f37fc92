//! Natural key uniqueness.

use super::current_table;
use crate::core::context::scalar_i64;
use crate::core::{GateMetadata, GateResult, Level, QualityGate};
use crate::prelude::*;
use crate::security::SqlSecurity;
use async_trait::async_trait;
use datafusion::prelude::*;
use tracing::instrument;

/// Counts rows repeating a natural key.
///
/// The count is the number of rows beyond the first for every key that
/// occurs more than once, so two copies of one key count as one duplicate.
/// Any duplicate is fatal.
#[derive(Debug, Clone)]
pub struct DuplicateKeyGate {
    columns: Vec<String>,
}

impl DuplicateKeyGate {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl QualityGate for DuplicateKeyGate {
    #[instrument(skip(self, ctx), fields(gate.name = "duplicate_keys"))]
    async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult> {
        let keys = SqlSecurity::escape_list(&self.columns)?;
        let sql = format!(
            "SELECT COALESCE(SUM(n - 1), 0) AS duplicates FROM \
             (SELECT COUNT(*) AS n FROM {} GROUP BY {keys} HAVING COUNT(*) > 1) AS repeated",
            current_table()?
        );
        let batches = ctx.sql(&sql).await?.collect().await?;
        let duplicates = scalar_i64(&batches, 0)?.unwrap_or(0).max(0) as u64;

        Ok(GateResult::from_check(
            self.name(),
            Level::Fatal,
            duplicates == 0,
            duplicates.to_string(),
            "= 0",
        )
        .with_metric(duplicates as f64)
        .with_message(format!("key ({})", self.columns.join(", "))))
    }

    fn name(&self) -> &str {
        "duplicate_keys"
    }

    fn level(&self) -> Level {
        Level::Fatal
    }

    fn metadata(&self) -> GateMetadata {
        GateMetadata::for_columns(&self.columns)
            .with_description("Counts rows that repeat the natural key")
    }

    fn halt_error(&self, result: &GateResult) -> MergeError {
        MergeError::DuplicateKey {
            key: self.columns.clone(),
            count: result.metric.unwrap_or(0.0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GateStatus;
    use crate::test_helpers::{evaluate_gate_with_context, session_with_table};
    use arrow::array::{ArrayRef, Int64Array};
    use std::sync::Arc;

    fn keys(stores: Vec<i64>, depts: Vec<i64>) -> SessionContext {
        session_with_table(
            "merged",
            vec![
                ("Store", Arc::new(Int64Array::from(stores)) as ArrayRef),
                ("Dept", Arc::new(Int64Array::from(depts)) as ArrayRef),
            ],
        )
    }

    #[tokio::test]
    async fn test_unique_keys_pass() {
        let ctx = keys(vec![1, 1, 2], vec![1, 2, 1]);
        let gate = DuplicateKeyGate::new(["Store", "Dept"]);
        let result = evaluate_gate_with_context(&gate, &ctx, "merged")
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Pass);
    }

    #[tokio::test]
    async fn test_duplicates_counted_beyond_first() {
        // Key (1,1) three times and (2,1) twice: 2 + 1 extra rows.
        let ctx = keys(vec![1, 1, 1, 2, 2, 3], vec![1, 1, 1, 1, 1, 1]);
        let gate = DuplicateKeyGate::new(["Store", "Dept"]);
        let result = evaluate_gate_with_context(&gate, &ctx, "merged")
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Fail);
        assert_eq!(result.metric, Some(3.0));
        assert!(matches!(
            gate.halt_error(&result),
            MergeError::DuplicateKey { count: 3, .. }
        ));
    }
}
