//! Range visibility gates: negative values and the observed date span.

use super::count_where;
use crate::core::{current_validation_context, GateMetadata, GateResult, GateStatus, Level, QualityGate};
use crate::prelude::*;
use crate::security::SqlSecurity;
use crate::stats;
use async_trait::async_trait;
use datafusion::prelude::*;
use tracing::instrument;

/// Counts rows below zero.
///
/// Negative weekly sales are legitimate returns, so this gate only makes them
/// visible: a non-zero count is a warning, never a failure.
#[derive(Debug, Clone)]
pub struct NegativeValueGate {
    column: String,
    name: String,
}

impl NegativeValueGate {
    pub fn new(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            name: format!("negative_values.{column}"),
            column,
        }
    }
}

#[async_trait]
impl QualityGate for NegativeValueGate {
    #[instrument(skip(self, ctx), fields(gate.name = %self.name))]
    async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult> {
        let column = SqlSecurity::escape_identifier(&self.column)?;
        let negatives = count_where(ctx, &format!("{column} < 0")).await?;

        Ok(GateResult::from_check(
            &self.name,
            Level::Info,
            negatives == 0,
            negatives.to_string(),
            "reported only",
        )
        .with_metric(negatives as f64))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Level {
        Level::Info
    }

    fn metadata(&self) -> GateMetadata {
        GateMetadata::for_column(&self.column).with_description("Counts negative values")
    }
}

/// Reports the earliest and latest date observed.
///
/// This is a sanity display. It only warns when the column holds no date at
/// all.
#[derive(Debug, Clone)]
pub struct DateRangeGate {
    column: String,
    name: String,
}

impl DateRangeGate {
    pub fn new(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            name: format!("date_range.{column}"),
            column,
        }
    }
}

#[async_trait]
impl QualityGate for DateRangeGate {
    #[instrument(skip(self, ctx), fields(gate.name = %self.name))]
    async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult> {
        let table = current_validation_context();
        let range = stats::date_range(ctx, table.table_name(), &self.column).await?;

        Ok(match range {
            Some(range) => GateResult::pass(
                &self.name,
                Level::Info,
                format!("{} .. {}", range.min, range.max),
                "reported only",
            )
            .with_metric((range.max - range.min).num_days() as f64),
            None => GateResult::new(
                &self.name,
                Level::Info,
                GateStatus::Warning,
                "no dates",
                "reported only",
            ),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Level {
        Level::Info
    }
}
