//! Error types for the merge pipeline.
//!
//! All failures are represented by [`MergeError`]. The data-quality variants
//! (schema mismatch, row-count divergence, critical nulls, duplicate keys and
//! date parse failures) are fatal: they halt a run and end up attached to the
//! partial report. Everything else is an infrastructure failure that bubbles
//! up through `?`.

use thiserror::Error;

/// The main error type for merge-guard.
#[derive(Error, Debug)]
pub enum MergeError {
    /// A source's columns diverge from its expected contract.
    #[error("Schema mismatch in source '{source_name}': {}", .diagnostics.join("; "))]
    SchemaMismatch {
        /// Name of the source that failed validation
        source_name: String,
        /// One entry per missing, extra, reordered or mistyped column
        diagnostics: Vec<String>,
    },

    /// A join step produced a different number of rows than its left input.
    #[error(
        "Row count divergence: '{expected_checkpoint}' has {expected} rows but '{actual_checkpoint}' has {actual}"
    )]
    RowCountDivergence {
        /// Checkpoint holding the expected count (the left input)
        expected_checkpoint: String,
        /// Row count at the expected checkpoint
        expected: usize,
        /// Checkpoint holding the observed count
        actual_checkpoint: String,
        /// Row count at the observed checkpoint
        actual: usize,
    },

    /// A non-nullable column contains nulls after the merge.
    #[error("Critical column '{column}' contains {count} null values")]
    CriticalNull { column: String, count: u64 },

    /// The natural key is violated after the merge.
    #[error("Natural key ({}) violated by {count} duplicate rows", .key.join(", "))]
    DuplicateKey { key: Vec<String>, count: u64 },

    /// A date value does not match the expected format.
    #[error("Date parse error in column '{column}' at row {row}: '{value}' does not match '{format}'")]
    DateParse {
        column: String,
        row: usize,
        value: String,
        format: String,
    },

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A required column is not present in a table.
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An identifier failed SQL safety validation.
    #[error("Security error: {0}")]
    SecurityError(String),
}

/// A type alias for `Result<T, MergeError>`.
pub type Result<T> = std::result::Result<T, MergeError>;

impl MergeError {
    /// Creates a schema mismatch error for the given source.
    pub fn schema_mismatch(source_name: impl Into<String>, diagnostics: Vec<String>) -> Self {
        Self::SchemaMismatch {
            source_name: source_name.into(),
            diagnostics,
        }
    }

    /// Creates a row count divergence error from two checkpoints.
    pub fn row_count_divergence(
        expected_checkpoint: impl Into<String>,
        expected: usize,
        actual_checkpoint: impl Into<String>,
        actual: usize,
    ) -> Self {
        Self::RowCountDivergence {
            expected_checkpoint: expected_checkpoint.into(),
            expected,
            actual_checkpoint: actual_checkpoint.into(),
            actual,
        }
    }

    /// Creates a column-not-found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Returns true for data-quality failures that halt a pipeline run.
    ///
    /// Fatal errors are reported through the partial report rather than
    /// surfaced as infrastructure failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MergeError::SchemaMismatch { .. }
                | MergeError::RowCountDivergence { .. }
                | MergeError::CriticalNull { .. }
                | MergeError::DuplicateKey { .. }
                | MergeError::DateParse { .. }
        )
    }

    /// Returns a short, stable kind name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            MergeError::SchemaMismatch { .. } => "schema_mismatch",
            MergeError::RowCountDivergence { .. } => "row_count_divergence",
            MergeError::CriticalNull { .. } => "critical_null",
            MergeError::DuplicateKey { .. } => "duplicate_key",
            MergeError::DateParse { .. } => "date_parse",
            MergeError::DataFusion(_) => "datafusion",
            MergeError::Arrow(_) => "arrow",
            MergeError::Io(_) => "io",
            MergeError::Configuration(_) => "configuration",
            MergeError::Serialization(_) => "serialization",
            MergeError::ColumnNotFound { .. } => "column_not_found",
            MergeError::Internal(_) => "internal",
            MergeError::SecurityError(_) => "security",
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<MergeError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| wrap_with_context(msg, e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap_with_context(&f(), e.into()))
    }
}

// Fatal errors keep their variant so callers can still classify them.
fn wrap_with_context(msg: &str, error: MergeError) -> MergeError {
    match error {
        fatal if fatal.is_fatal() => fatal,
        MergeError::Internal(inner) => MergeError::Internal(format!("{msg}: {inner}")),
        other => MergeError::Internal(format!("{msg}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_message() {
        let err = MergeError::schema_mismatch(
            "sales",
            vec!["missing column 'Weekly_Sales'".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "Schema mismatch in source 'sales': missing column 'Weekly_Sales'"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_row_count_divergence_carries_both_counts() {
        let err = MergeError::row_count_divergence("sales.ingested", 10, "join.indicators", 12);
        let message = err.to_string();
        assert!(message.contains("10"));
        assert!(message.contains("12"));
        assert_eq!(err.kind(), "row_count_divergence");
    }

    #[test]
    fn test_duplicate_key_message() {
        let err = MergeError::DuplicateKey {
            key: vec!["Store".into(), "Dept".into(), "Date".into()],
            count: 3,
        };
        assert_eq!(
            err.to_string(),
            "Natural key (Store, Dept, Date) violated by 3 duplicate rows"
        );
    }

    #[test]
    fn test_infrastructure_errors_are_not_fatal() {
        assert!(!MergeError::Internal("boom".into()).is_fatal());
        assert!(!MergeError::Configuration("bad".into()).is_fatal());
        assert!(!MergeError::column_not_found("sales", "Store").is_fatal());
    }

    #[test]
    fn test_error_context_wraps_infrastructure_errors() {
        fn failing_operation() -> Result<()> {
            Err(MergeError::Internal("Something went wrong".to_string()))
        }

        let err = failing_operation()
            .context("During join")
            .unwrap_err();
        assert!(err.to_string().contains("During join"));
    }

    #[test]
    fn test_error_context_preserves_fatal_variant() {
        let result: Result<()> = Err(MergeError::CriticalNull {
            column: "Weekly_Sales".into(),
            count: 2,
        });
        let err = result.with_context(|| "quality gates".to_string()).unwrap_err();
        assert!(matches!(err, MergeError::CriticalNull { count: 2, .. }));
    }
}
