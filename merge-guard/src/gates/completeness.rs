//! Null detection for critical columns.

use super::current_table;
use crate::core::context::scalar_i64;
use crate::core::{GateMetadata, GateResult, Level, QualityGate};
use crate::prelude::*;
use crate::security::SqlSecurity;
use async_trait::async_trait;
use datafusion::prelude::*;
use tracing::{debug, instrument};

/// Counts nulls in one column.
///
/// At [`Level::Fatal`] any null fails the gate and halts the run with
/// [`MergeError::CriticalNull`]; at lower levels nulls are a warning.
///
/// # Examples
///
/// ```rust
/// use merge_guard::core::{Level, QualityGate};
/// use merge_guard::gates::NullCountGate;
///
/// let gate = NullCountGate::new("Weekly_Sales", Level::Fatal);
/// assert_eq!(gate.name(), "nulls.Weekly_Sales");
/// ```
#[derive(Debug, Clone)]
pub struct NullCountGate {
    column: String,
    level: Level,
    name: String,
}

impl NullCountGate {
    pub fn new(column: impl Into<String>, level: Level) -> Self {
        let column = column.into();
        Self {
            name: format!("nulls.{column}"),
            column,
            level,
        }
    }
}

#[async_trait]
impl QualityGate for NullCountGate {
    #[instrument(skip(self, ctx), fields(gate.name = %self.name, gate.level = %self.level))]
    async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult> {
        let column = SqlSecurity::escape_identifier(&self.column)?;
        let sql = format!(
            "SELECT COUNT(*) - COUNT({column}) AS null_count FROM {}",
            current_table()?
        );
        let batches = ctx.sql(&sql).await?.collect().await?;
        let nulls = scalar_i64(&batches, 0)?.unwrap_or(0).max(0) as u64;

        debug!(gate.column = %self.column, result.nulls = nulls, "Counted nulls");

        Ok(
            GateResult::from_check(&self.name, self.level, nulls == 0, nulls.to_string(), "= 0")
                .with_metric(nulls as f64),
        )
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Level {
        self.level
    }

    fn metadata(&self) -> GateMetadata {
        GateMetadata::for_column(&self.column).with_description(format!(
            "Counts null values in '{}'",
            self.column
        ))
    }

    fn halt_error(&self, result: &GateResult) -> MergeError {
        MergeError::CriticalNull {
            column: self.column.clone(),
            count: result.metric.unwrap_or(0.0) as u64,
        }
    }
}
