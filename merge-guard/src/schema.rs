//! Source schema contracts.
//!
//! Each source must present exactly its expected columns, in order, with a
//! compatible Arrow type. Nothing is coerced here: a string `Weekly_Sales`
//! column is a mismatch, not something to parse.

use crate::core::{GateResult, Level, MergeContext};
use crate::prelude::*;
use arrow::datatypes::{DataType, Schema};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, instrument, warn};

/// Column names of the retail sources and the derived features.
pub mod columns {
    pub const STORE: &str = "Store";
    pub const DEPT: &str = "Dept";
    pub const DATE: &str = "Date";
    pub const WEEKLY_SALES: &str = "Weekly_Sales";
    pub const IS_HOLIDAY: &str = "IsHoliday";
    pub const TEMPERATURE: &str = "Temperature";
    pub const FUEL_PRICE: &str = "Fuel_Price";
    pub const MARKDOWNS: [&str; 5] = ["MarkDown1", "MarkDown2", "MarkDown3", "MarkDown4", "MarkDown5"];
    pub const CPI: &str = "CPI";
    pub const UNEMPLOYMENT: &str = "Unemployment";
    pub const TYPE: &str = "Type";
    pub const SIZE: &str = "Size";

    /// The indicator source's holiday flag as carried into the merged table.
    pub const IS_HOLIDAY_INDICATOR: &str = "IsHoliday_Indicator";

    pub const YEAR: &str = "Year";
    pub const MONTH: &str = "Month";
    pub const WEEK: &str = "Week";
    pub const DAY_OF_WEEK: &str = "DayOfWeek";

    /// Sales natural key.
    pub const NATURAL_KEY: [&str; 3] = [STORE, DEPT, DATE];

    /// Hidden ordinal that pins the merged row order to the Sales order.
    pub const ROW_ID: &str = "__row_id";

    /// Hidden right-side key of the store join, null for unmatched rows.
    pub const STORE_MATCH: &str = "__store_match";

    /// Hidden columns removed before the merged table is emitted.
    pub const HIDDEN: [&str; 2] = [ROW_ID, STORE_MATCH];
}

/// The semantic type a column must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Integer,
    /// Signed decimal; integer columns are accepted as well
    Decimal,
    Boolean,
    Text,
    /// A calendar date, or text to be parsed with the configured date format
    Date,
}

impl SemanticType {
    /// Returns true if an Arrow column of `data_type` satisfies this type.
    pub fn accepts(&self, data_type: &DataType) -> bool {
        match self {
            SemanticType::Integer => data_type.is_integer(),
            SemanticType::Decimal => {
                data_type.is_floating()
                    || data_type.is_integer()
                    || matches!(data_type, DataType::Decimal128(..) | DataType::Decimal256(..))
            }
            SemanticType::Boolean => matches!(data_type, DataType::Boolean),
            SemanticType::Text => is_text(data_type),
            SemanticType::Date => {
                matches!(data_type, DataType::Date32 | DataType::Date64) || is_text(data_type)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Integer => "integer",
            SemanticType::Decimal => "decimal",
            SemanticType::Boolean => "boolean",
            SemanticType::Text => "text",
            SemanticType::Date => "date",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn is_text(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    )
}

/// One column of a source contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedColumn {
    pub name: String,
    pub semantic_type: SemanticType,
    /// Whether the column may be entirely absent of values. An all-empty
    /// column loaded from text has the Arrow `Null` type.
    pub optional: bool,
}

impl ExpectedColumn {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn accepts(&self, data_type: &DataType) -> bool {
        (self.optional && matches!(data_type, DataType::Null))
            || self.semantic_type.accepts(data_type)
    }
}

/// The ordered column contract of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSchema {
    pub source_name: String,
    pub columns: Vec<ExpectedColumn>,
}

impl ExpectedSchema {
    pub fn new(source_name: impl Into<String>, columns: Vec<ExpectedColumn>) -> Self {
        Self {
            source_name: source_name.into(),
            columns,
        }
    }

    /// `Store, Dept, Date, Weekly_Sales, IsHoliday`
    pub fn sales() -> Self {
        use columns::*;
        Self::new(
            "sales",
            vec![
                ExpectedColumn::new(STORE, SemanticType::Integer),
                ExpectedColumn::new(DEPT, SemanticType::Integer),
                ExpectedColumn::new(DATE, SemanticType::Date),
                ExpectedColumn::new(WEEKLY_SALES, SemanticType::Decimal),
                ExpectedColumn::new(IS_HOLIDAY, SemanticType::Boolean),
            ],
        )
    }

    /// `Store, Date, Temperature, Fuel_Price, MarkDown1..5, CPI, Unemployment, IsHoliday`
    pub fn indicators() -> Self {
        use columns::*;
        let mut cols = vec![
            ExpectedColumn::new(STORE, SemanticType::Integer),
            ExpectedColumn::new(DATE, SemanticType::Date),
            ExpectedColumn::new(TEMPERATURE, SemanticType::Decimal),
            ExpectedColumn::new(FUEL_PRICE, SemanticType::Decimal),
        ];
        cols.extend(
            MARKDOWNS
                .iter()
                .map(|m| ExpectedColumn::new(*m, SemanticType::Decimal).optional()),
        );
        cols.extend([
            ExpectedColumn::new(CPI, SemanticType::Decimal),
            ExpectedColumn::new(UNEMPLOYMENT, SemanticType::Decimal),
            ExpectedColumn::new(IS_HOLIDAY, SemanticType::Boolean),
        ]);
        Self::new("indicators", cols)
    }

    /// `Store, Type, Size`
    pub fn stores() -> Self {
        use columns::*;
        Self::new(
            "stores",
            vec![
                ExpectedColumn::new(STORE, SemanticType::Integer),
                ExpectedColumn::new(TYPE, SemanticType::Text),
                ExpectedColumn::new(SIZE, SemanticType::Integer),
            ],
        )
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Compares an Arrow schema against this contract.
    pub fn validate(&self, schema: &Schema) -> SchemaValidation {
        let actual: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        let expected = self.column_names();
        let actual_set: HashSet<&str> = actual.iter().copied().collect();
        let expected_set: HashSet<&str> = expected.iter().copied().collect();

        let mut diagnostics = Vec::new();

        for name in &expected {
            if !actual_set.contains(name) {
                diagnostics.push(format!("missing column '{name}'"));
            }
        }
        for name in &actual {
            if !expected_set.contains(name) {
                diagnostics.push(format!("unexpected column '{name}'"));
            }
        }

        // Order is compared over the columns both sides share.
        let shared_actual: Vec<&str> = actual
            .iter()
            .copied()
            .filter(|n| expected_set.contains(n))
            .collect();
        let shared_expected: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|n| actual_set.contains(n))
            .collect();
        for (found, wanted) in shared_actual.iter().zip(&shared_expected) {
            if found != wanted {
                let found_at = position(&actual, found);
                let wanted_at = position(&expected, found);
                diagnostics.push(format!(
                    "column '{found}' at position {found_at}, expected at position {wanted_at}"
                ));
            }
        }

        for column in &self.columns {
            if let Ok(field) = schema.field_with_name(&column.name) {
                if !column.accepts(field.data_type()) {
                    diagnostics.push(format!(
                        "column '{}' has type {}, expected {}",
                        column.name,
                        field.data_type(),
                        column.semantic_type
                    ));
                }
            }
        }

        SchemaValidation {
            source_name: self.source_name.clone(),
            expected_columns: expected.iter().map(|s| s.to_string()).collect(),
            actual_columns: actual.iter().map(|s| s.to_string()).collect(),
            diagnostics,
        }
    }

    /// Validates a table registered in `ctx`.
    #[instrument(skip(self, ctx), fields(source = %self.source_name))]
    pub async fn validate_table(&self, ctx: &MergeContext, table: &str) -> Result<SchemaValidation> {
        let schema = ctx.table_schema(table).await?;
        let validation = self.validate(&schema);
        if validation.is_valid() {
            debug!(columns = validation.actual_columns.len(), "Schema matches");
        } else {
            warn!(diagnostics = ?validation.diagnostics, "Schema mismatch");
        }
        Ok(validation)
    }
}

fn position(names: &[&str], name: &str) -> usize {
    names.iter().position(|n| *n == name).unwrap_or(usize::MAX)
}

/// Outcome of a schema check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaValidation {
    pub source_name: String,
    pub expected_columns: Vec<String>,
    pub actual_columns: Vec<String>,
    /// One line per missing, extra, reordered or mistyped column
    pub diagnostics: Vec<String>,
}

impl SchemaValidation {
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Converts the outcome into a report entry.
    pub fn to_gate_result(&self) -> GateResult {
        let observed = if self.is_valid() {
            format!("{} columns as expected", self.actual_columns.len())
        } else {
            self.diagnostics.join("; ")
        };
        GateResult::from_check(
            format!("schema.{}", self.source_name),
            Level::Fatal,
            self.is_valid(),
            observed,
            self.expected_columns.join(", "),
        )
    }

    /// Fails with [`MergeError::SchemaMismatch`] if any diagnostic was raised.
    pub fn into_result(self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(MergeError::schema_mismatch(self.source_name, self.diagnostics))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;

    fn sales_schema(fields: &[(&str, DataType)]) -> Schema {
        Schema::new(
            fields
                .iter()
                .map(|(n, t)| Field::new(*n, t.clone(), true))
                .collect::<Vec<_>>(),
        )
    }

    fn valid_sales() -> Schema {
        sales_schema(&[
            ("Store", DataType::Int64),
            ("Dept", DataType::Int64),
            ("Date", DataType::Date32),
            ("Weekly_Sales", DataType::Float64),
            ("IsHoliday", DataType::Boolean),
        ])
    }

    #[test]
    fn test_valid_sales_schema() {
        let validation = ExpectedSchema::sales().validate(&valid_sales());
        assert!(validation.is_valid());
        assert!(validation.into_result().is_ok());
    }

    #[test]
    fn test_textual_dates_and_integer_sales_accepted() {
        let schema = sales_schema(&[
            ("Store", DataType::Int32),
            ("Dept", DataType::Int64),
            ("Date", DataType::Utf8),
            ("Weekly_Sales", DataType::Int64),
            ("IsHoliday", DataType::Boolean),
        ]);
        assert!(ExpectedSchema::sales().validate(&schema).is_valid());
    }

    #[test]
    fn test_missing_column_is_named() {
        let schema = sales_schema(&[
            ("Store", DataType::Int64),
            ("Dept", DataType::Int64),
            ("Date", DataType::Date32),
            ("IsHoliday", DataType::Boolean),
        ]);
        let validation = ExpectedSchema::sales().validate(&schema);
        assert_eq!(validation.diagnostics, vec!["missing column 'Weekly_Sales'"]);

        let err = validation.into_result().unwrap_err();
        assert!(matches!(err, MergeError::SchemaMismatch { .. }));
        assert!(err.to_string().contains("Weekly_Sales"));
    }

    #[test]
    fn test_extra_column() {
        let mut fields: Vec<Field> = valid_sales()
            .fields()
            .iter()
            .map(|f| (**f).clone())
            .collect();
        fields.push(Field::new("Region", DataType::Utf8, true));
        let validation = ExpectedSchema::sales().validate(&Schema::new(fields));
        assert_eq!(validation.diagnostics, vec!["unexpected column 'Region'"]);
    }

    #[test]
    fn test_reordered_columns() {
        let schema = sales_schema(&[
            ("Store", DataType::Int64),
            ("Date", DataType::Date32),
            ("Dept", DataType::Int64),
            ("Weekly_Sales", DataType::Float64),
            ("IsHoliday", DataType::Boolean),
        ]);
        let validation = ExpectedSchema::sales().validate(&schema);
        assert_eq!(
            validation.diagnostics,
            vec![
                "column 'Date' at position 1, expected at position 2",
                "column 'Dept' at position 2, expected at position 1",
            ]
        );
    }

    #[test]
    fn test_mistyped_column() {
        let schema = sales_schema(&[
            ("Store", DataType::Int64),
            ("Dept", DataType::Int64),
            ("Date", DataType::Date32),
            ("Weekly_Sales", DataType::Utf8),
            ("IsHoliday", DataType::Boolean),
        ]);
        let validation = ExpectedSchema::sales().validate(&schema);
        assert_eq!(validation.diagnostics.len(), 1);
        assert!(validation.diagnostics[0].starts_with("column 'Weekly_Sales' has type"));
        assert!(validation.diagnostics[0].ends_with("expected decimal"));
        assert!(validation.to_gate_result().is_fatal_failure());
    }

    #[test]
    fn test_all_null_markdowns_allowed() {
        let mut fields = vec![
            Field::new("Store", DataType::Int64, true),
            Field::new("Date", DataType::Utf8, true),
            Field::new("Temperature", DataType::Float64, true),
            Field::new("Fuel_Price", DataType::Float64, true),
        ];
        for m in columns::MARKDOWNS {
            fields.push(Field::new(m, DataType::Null, true));
        }
        fields.extend([
            Field::new("CPI", DataType::Float64, true),
            Field::new("Unemployment", DataType::Float64, true),
            Field::new("IsHoliday", DataType::Boolean, true),
        ]);
        let validation = ExpectedSchema::indicators().validate(&Schema::new(fields));
        assert!(validation.is_valid(), "{:?}", validation.diagnostics);
    }

    #[test]
    fn test_store_schema_gate_result() {
        let schema = sales_schema(&[
            ("Store", DataType::Int64),
            ("Type", DataType::Utf8),
            ("Size", DataType::Int64),
        ]);
        let result = ExpectedSchema::stores().validate(&schema).to_gate_result();
        assert_eq!(result.name, "schema.stores");
        assert!(result.status.is_pass());
        assert_eq!(result.expected, "Store, Type, Size");
    }
}
