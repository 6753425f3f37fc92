//! The two-step left join that builds the merged table.
//!
//! Join keys are normalized before either step runs: `Store` is cast to
//! `Int64` and `Date` is parsed into `Date32` on every side, so a textual date
//! never gets compared against a calendar date. The Sales side additionally
//! receives a hidden row ordinal that every step orders by, which pins the
//! merged row order to the Sales order regardless of partitioning.
//!
//! # Examples
//!
//! ```rust,no_run
//! use merge_guard::join::{JoinStep, JoinType};
//!
//! let step = JoinStep::builder("stores")
//!     .left("sales_indicators")
//!     .right("stores_keyed")
//!     .on("Store")
//!     .column("Type")
//!     .column("Size")
//!     .output("merged")
//!     .build()
//!     .unwrap();
//! assert_eq!(step.join_type(), JoinType::Left);
//! ```

use crate::core::context::scalar_i64;
use crate::core::MergeContext;
use crate::prelude::*;
use crate::schema::{columns, is_text};
use crate::security::SqlSecurity;
use arrow::array::{Array, ArrayRef, AsArray, Date32Array, Date32Builder, UInt64Array};
use arrow::compute::{cast, cast_with_options, concat_batches, CastOptions};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Converts a calendar date into Arrow's `Date32` day count.
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

/// Converts an Arrow `Date32` day count into a calendar date.
pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(EPOCH_DAYS_FROM_CE)?)
}

/// Join semantics of a step. The pipeline only ever uses [`JoinType::Left`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    /// All rows from the left table, matching rows from the right
    Left,
    /// Only rows that match in both tables
    Inner,
}

impl JoinType {
    /// Convert to SQL join syntax
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinType::Left => "LEFT JOIN",
            JoinType::Inner => "INNER JOIN",
        }
    }
}

/// A right-side column carried into the join output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedColumn {
    pub name: String,
    pub alias: String,
}

/// Row accounting for one executed join step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDiagnostics {
    pub step: String,
    pub join_type: JoinType,
    pub keys: Vec<String>,
    pub left_rows: usize,
    pub right_rows: usize,
    pub output_rows: usize,
    /// Left rows with no right-side match
    pub unmatched_left_rows: u64,
    /// Right-side keys that occur more than once, the cause of fan-out
    pub duplicate_right_keys: u64,
}

/// One join between two registered tables.
#[derive(Debug, Clone)]
pub struct JoinStep {
    name: String,
    left: String,
    right: String,
    keys: Vec<String>,
    columns: Vec<ProjectedColumn>,
    join_type: JoinType,
    output: String,
}

impl JoinStep {
    pub fn builder(name: impl Into<String>) -> JoinStepBuilder {
        JoinStepBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn left(&self) -> &str {
        &self.left
    }

    pub fn right(&self) -> &str {
        &self.right
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    /// Generates the join query.
    ///
    /// Every left column is kept, the projected right columns follow, and the
    /// output is ordered by the hidden Sales row ordinal.
    pub fn sql(&self) -> Result<String> {
        let mut select = vec!["l.*".to_string()];
        for column in &self.columns {
            select.push(format!(
                "r.{} AS {}",
                SqlSecurity::escape_identifier(&column.name)?,
                SqlSecurity::escape_identifier(&column.alias)?
            ));
        }

        Ok(format!(
            "SELECT {} FROM {} AS l {} {} AS r ON {} ORDER BY l.{}",
            select.join(", "),
            SqlSecurity::escape_identifier(&self.left)?,
            self.join_type.to_sql(),
            SqlSecurity::escape_identifier(&self.right)?,
            self.key_condition()?,
            SqlSecurity::escape_identifier(columns::ROW_ID)?
        ))
    }

    fn key_condition(&self) -> Result<String> {
        let conditions = self
            .keys
            .iter()
            .map(|key| {
                let key = SqlSecurity::escape_identifier(key)?;
                Ok(format!("l.{key} = r.{key}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(conditions.join(" AND "))
    }

    /// Runs the join and registers its output table.
    ///
    /// Row-count preservation is not checked here; the pipeline compares the
    /// recorded checkpoints right after each step.
    #[instrument(skip(self, ctx), fields(step = %self.name, join_type = ?self.join_type))]
    pub async fn execute(&self, ctx: &mut MergeContext) -> Result<JoinDiagnostics> {
        let left_rows = ctx.row_count(&self.left).await?;
        let right_rows = ctx.row_count(&self.right).await?;

        let sql = self.sql()?;
        debug!(sql = %sql, "Executing join");
        let df = ctx.inner().sql(&sql).await?;
        let logical_schema: SchemaRef = Arc::new(df.schema().as_arrow().clone());
        let batches = df.collect().await?;
        let schema = batches
            .first()
            .map(|b| b.schema())
            .unwrap_or(logical_schema);
        let output_rows = batches.iter().map(|b| b.num_rows()).sum();
        ctx.register_batches(&self.output, schema, batches)?;

        let unmatched_left_rows = self.count_unmatched_left(ctx).await?;
        let duplicate_right_keys = self.count_duplicate_right_keys(ctx).await?;

        info!(
            left_rows,
            right_rows,
            output_rows,
            unmatched_left_rows,
            duplicate_right_keys,
            "Join step complete"
        );

        Ok(JoinDiagnostics {
            step: self.name.clone(),
            join_type: self.join_type,
            keys: self.keys.clone(),
            left_rows,
            right_rows,
            output_rows,
            unmatched_left_rows,
            duplicate_right_keys,
        })
    }

    async fn count_unmatched_left(&self, ctx: &MergeContext) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} AS l WHERE NOT EXISTS (SELECT 1 FROM {} AS r WHERE {})",
            SqlSecurity::escape_identifier(&self.left)?,
            SqlSecurity::escape_identifier(&self.right)?,
            self.key_condition()?
        );
        count_query(ctx, &sql).await
    }

    async fn count_duplicate_right_keys(&self, ctx: &MergeContext) -> Result<u64> {
        let keys = SqlSecurity::escape_list(&self.keys)?;
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT {keys} FROM {} GROUP BY {keys} HAVING COUNT(*) > 1) AS dup",
            SqlSecurity::escape_identifier(&self.right)?
        );
        count_query(ctx, &sql).await
    }
}

async fn count_query(ctx: &MergeContext, sql: &str) -> Result<u64> {
    let batches = ctx.inner().sql(sql).await?.collect().await?;
    Ok(scalar_i64(&batches, 0)?.unwrap_or(0).max(0) as u64)
}

/// Builder for [`JoinStep`].
#[derive(Debug)]
pub struct JoinStepBuilder {
    name: String,
    left: Option<String>,
    right: Option<String>,
    keys: Vec<String>,
    columns: Vec<ProjectedColumn>,
    join_type: JoinType,
    output: Option<String>,
}

impl JoinStepBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            left: None,
            right: None,
            keys: Vec::new(),
            columns: Vec::new(),
            join_type: JoinType::Left,
            output: None,
        }
    }

    pub fn left(mut self, table: impl Into<String>) -> Self {
        self.left = Some(table.into());
        self
    }

    pub fn right(mut self, table: impl Into<String>) -> Self {
        self.right = Some(table.into());
        self
    }

    /// Adds a key column present under the same name on both sides.
    pub fn on(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// Carries a right-side column into the output under its own name.
    pub fn column(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.column_as(name.clone(), name)
    }

    /// Carries a right-side column into the output under `alias`.
    pub fn column_as(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.columns.push(ProjectedColumn {
            name: name.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    pub fn output(mut self, table: impl Into<String>) -> Self {
        self.output = Some(table.into());
        self
    }

    pub fn build(self) -> Result<JoinStep> {
        let missing = |what: &str| {
            MergeError::Configuration(format!("Join step '{}' has no {what}", self.name))
        };
        let left = self.left.clone().ok_or_else(|| missing("left table"))?;
        let right = self.right.clone().ok_or_else(|| missing("right table"))?;
        let output = self.output.clone().ok_or_else(|| missing("output table"))?;
        if self.keys.is_empty() {
            return Err(missing("join keys"));
        }

        for identifier in [&left, &right, &output]
            .into_iter()
            .chain(&self.keys)
            .chain(self.columns.iter().flat_map(|c| [&c.name, &c.alias]))
        {
            SqlSecurity::validate_identifier(identifier)?;
        }

        Ok(JoinStep {
            name: self.name,
            left,
            right,
            keys: self.keys,
            columns: self.columns,
            join_type: self.join_type,
            output,
        })
    }
}

/// Step 1: Sales ⋈ Indicators on (Store, Date).
///
/// The indicator's holiday flag is renamed so the Sales flag keeps its name.
pub fn indicators_step(sales: &str, indicators: &str, output: &str) -> Result<JoinStep> {
    let mut builder = JoinStep::builder("indicators")
        .left(sales)
        .right(indicators)
        .on(columns::STORE)
        .on(columns::DATE)
        .column(columns::TEMPERATURE)
        .column(columns::FUEL_PRICE);
    for markdown in columns::MARKDOWNS {
        builder = builder.column(markdown);
    }
    builder
        .column(columns::CPI)
        .column(columns::UNEMPLOYMENT)
        .column_as(columns::IS_HOLIDAY, columns::IS_HOLIDAY_INDICATOR)
        .output(output)
        .build()
}

/// Step 2: step-1 result ⋈ Store metadata on Store.
///
/// The right-side key is carried as a hidden match marker.
pub fn stores_step(joined: &str, stores: &str, output: &str) -> Result<JoinStep> {
    JoinStep::builder("stores")
        .left(joined)
        .right(stores)
        .on(columns::STORE)
        .column(columns::TYPE)
        .column(columns::SIZE)
        .column_as(columns::STORE, columns::STORE_MATCH)
        .output(output)
        .build()
}

/// How a source's keys are normalized.
#[derive(Debug, Clone)]
pub struct KeyNormalization {
    /// `chrono` format for textual dates
    pub date_format: String,
    /// Whether the table carries a `Date` key
    pub has_date: bool,
    /// Whether to append the hidden row ordinal
    pub assign_row_id: bool,
}

/// Normalizes the join keys of `table` and registers the result as `output`.
///
/// `Store` becomes `Int64` and `Date` becomes `Date32`. A date that does not
/// match the format fails with [`MergeError::DateParse`] naming the 0-based
/// source row.
#[instrument(skip(ctx, options), fields(has_date = options.has_date, row_id = options.assign_row_id))]
pub async fn normalize_keys(
    ctx: &mut MergeContext,
    table: &str,
    output: &str,
    options: &KeyNormalization,
) -> Result<usize> {
    let source_schema = ctx.table_schema(table).await?;
    let batches = ctx.collect_table(table).await?;
    let batch = concat_batches(&source_schema, &batches)?;

    let mut fields: Vec<Field> = Vec::with_capacity(batch.num_columns() + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns() + 1);
    let mut seen_store = false;
    let mut seen_date = false;

    for (field, array) in source_schema.fields().iter().zip(batch.columns()) {
        let name = field.name().as_str();
        if name == columns::STORE {
            seen_store = true;
            let strict = CastOptions {
                safe: false,
                ..Default::default()
            };
            arrays.push(cast_with_options(array, &DataType::Int64, &strict)?);
            fields.push(Field::new(name, DataType::Int64, true));
        } else if options.has_date && name == columns::DATE {
            seen_date = true;
            arrays.push(normalize_dates(array, name, &options.date_format)?);
            fields.push(Field::new(name, DataType::Date32, true));
        } else {
            arrays.push(array.clone());
            fields.push(field.as_ref().clone());
        }
    }

    if !seen_store {
        return Err(MergeError::column_not_found(table, columns::STORE));
    }
    if options.has_date && !seen_date {
        return Err(MergeError::column_not_found(table, columns::DATE));
    }

    if options.assign_row_id {
        let ids: UInt64Array = (0..batch.num_rows() as u64).collect();
        arrays.push(Arc::new(ids));
        fields.push(Field::new(columns::ROW_ID, DataType::UInt64, false));
    }

    let schema = Arc::new(Schema::new(fields));
    let normalized = RecordBatch::try_new(schema.clone(), arrays)?;
    let rows = normalized.num_rows();
    ctx.register_batches(output, schema, vec![normalized])?;
    debug!(rows, output = %output, "Normalized join keys");
    Ok(rows)
}

/// Parses or casts a date column into `Date32`.
pub(crate) fn normalize_dates(array: &ArrayRef, column: &str, format: &str) -> Result<ArrayRef> {
    match array.data_type() {
        DataType::Date32 => Ok(array.clone()),
        DataType::Date64 => Ok(cast(array, &DataType::Date32)?),
        DataType::Null => Ok(Arc::new(Date32Array::new_null(array.len()))),
        dt if is_text(dt) => {
            let strings = cast(array, &DataType::Utf8)?;
            let strings = strings.as_string::<i32>();
            let mut builder = Date32Builder::with_capacity(strings.len());
            for (row, value) in strings.iter().enumerate() {
                match value {
                    None => builder.append_null(),
                    Some(raw) => {
                        let date = NaiveDate::parse_from_str(raw.trim(), format).map_err(|_| {
                            MergeError::DateParse {
                                column: column.to_string(),
                                row,
                                value: raw.to_string(),
                                format: format.to_string(),
                            }
                        })?;
                        builder.append_value(date_to_days(date));
                    }
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        other => Err(MergeError::Internal(format!(
            "Column '{column}' of type {other} cannot hold dates"
        ))),
    }
}
