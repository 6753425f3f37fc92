//! Summary statistics over the merged table.
//!
//! Values are projected through SQL and summarized in Rust over the sorted
//! values, so sums never depend on how DataFusion partitioned the scan.
//! Quartiles use linear interpolation between the two closest ranks.

use crate::core::context::scalar_i64;
use crate::core::DateRange;
use crate::join::days_to_date;
use crate::prelude::*;
use crate::schema::columns;
use crate::security::SqlSecurity;
use arrow::array::{Array, Date32Array, Float64Array};
use datafusion::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// The numeric columns described in the report.
pub const SUMMARY_COLUMNS: [&str; 5] = [
    columns::WEEKLY_SALES,
    columns::TEMPERATURE,
    columns::FUEL_PRICE,
    columns::CPI,
    columns::UNEMPLOYMENT,
];

/// Descriptive statistics of one numeric column. Nulls are ignored; every
/// field except `count` is `None` when no value is present, and `std` also
/// when only one is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub column: String,
    pub count: u64,
    pub mean: Option<f64>,
    /// Sample standard deviation
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnStatistics {
    /// Summarizes a set of values.
    pub fn from_values(column: impl Into<String>, mut values: Vec<f64>) -> Self {
        values.retain(|v| !v.is_nan());
        values.sort_by(|a, b| a.total_cmp(b));

        let count = values.len();
        let mean = (count > 0).then(|| values.iter().sum::<f64>() / count as f64);
        let std = match mean {
            Some(mean) if count > 1 => {
                let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
                Some((squares / (count - 1) as f64).sqrt())
            }
            _ => None,
        };

        Self {
            column: column.into(),
            count: count as u64,
            mean,
            std,
            min: values.first().copied(),
            p25: quantile(&values, 0.25),
            p50: quantile(&values, 0.5),
            p75: quantile(&values, 0.75),
            max: values.last().copied(),
        }
    }
}

/// Linear-interpolated quantile of sorted values.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Describes each of `columns` in `table`.
#[instrument(skip(ctx))]
pub async fn describe(
    ctx: &SessionContext,
    table: &str,
    columns: &[&str],
) -> Result<Vec<ColumnStatistics>> {
    let table_sql = SqlSecurity::escape_identifier(table)?;
    let mut statistics = Vec::with_capacity(columns.len());

    for column in columns {
        let column_sql = SqlSecurity::escape_identifier(column)?;
        let sql = format!(
            "SELECT CAST({column_sql} AS DOUBLE) AS value FROM {table_sql} WHERE {column_sql} IS NOT NULL"
        );
        let batches = ctx.sql(&sql).await?.collect().await?;

        let mut values = Vec::new();
        for batch in &batches {
            let array = batch
                .column(0)
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| {
                    MergeError::Internal(format!("Expected DOUBLE projection of '{column}'"))
                })?;
            values.extend(array.iter().flatten());
        }
        statistics.push(ColumnStatistics::from_values(*column, values));
    }

    Ok(statistics)
}

/// Number of distinct non-null values in a column.
pub async fn distinct_count(ctx: &SessionContext, table: &str, column: &str) -> Result<u64> {
    let sql = format!(
        "SELECT COUNT(DISTINCT {}) FROM {}",
        SqlSecurity::escape_identifier(column)?,
        SqlSecurity::escape_identifier(table)?
    );
    let batches = ctx.sql(&sql).await?.collect().await?;
    Ok(scalar_i64(&batches, 0)?.unwrap_or(0).max(0) as u64)
}

/// Earliest and latest value of a `Date32` column, or `None` if it holds no
/// dates.
pub async fn date_range(ctx: &SessionContext, table: &str, column: &str) -> Result<Option<DateRange>> {
    let column_sql = SqlSecurity::escape_identifier(column)?;
    let sql = format!(
        "SELECT MIN({column_sql}), MAX({column_sql}) FROM {}",
        SqlSecurity::escape_identifier(table)?
    );
    let batches = ctx.sql(&sql).await?.collect().await?;
    let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(None);
    };

    let day = |index: usize| -> Result<Option<i32>> {
        let array = batch
            .column(index)
            .as_any()
            .downcast_ref::<Date32Array>()
            .ok_or_else(|| MergeError::Internal(format!("Column '{column}' is not a Date32")))?;
        Ok((!array.is_null(0)).then(|| array.value(0)))
    };

    match (day(0)?, day(1)?) {
        (Some(min), Some(max)) => {
            let to_date = |days: i32| {
                days_to_date(days)
                    .ok_or_else(|| MergeError::Internal(format!("Date out of range: {days}")))
            };
            Ok(Some(DateRange {
                min: to_date(min)?,
                max: to_date(max)?,
            }))
        }
        _ => Ok(None),
    }
}
