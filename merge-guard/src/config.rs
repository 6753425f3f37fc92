//! Pipeline configuration.
//!
//! [`PipelineConfig`] is plain serde data so it can be loaded from a JSON file
//! and overridden field by field from the command line.

use crate::prelude::*;
use crate::security::SqlSecurity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Names of the tables a run reads and writes inside the [`MergeContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub sales: String,
    pub indicators: String,
    pub stores: String,
    /// Name the merged table is registered under for the quality gates
    pub merged: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            sales: "sales".to_string(),
            indicators: "indicators".to_string(),
            stores: "stores".to_string(),
            merged: "merged".to_string(),
        }
    }
}

impl TableNames {
    fn all(&self) -> [&str; 4] {
        [&self.sales, &self.indicators, &self.stores, &self.merged]
    }
}

/// Tables the pipeline registers for its intermediate results.
pub mod intermediate {
    pub const SALES_KEYED: &str = "sales_keyed";
    pub const INDICATORS_KEYED: &str = "indicators_keyed";
    pub const STORES_KEYED: &str = "stores_keyed";
    pub const SALES_INDICATORS: &str = "sales_indicators";

    /// Names a configured table may not take.
    pub const RESERVED: [&str; 4] = [SALES_KEYED, INDICATORS_KEYED, STORES_KEYED, SALES_INDICATORS];
}

/// Settings for one pipeline run.
///
/// # Examples
///
/// ```rust
/// use merge_guard::config::PipelineConfig;
///
/// let config = PipelineConfig::from_json_str(r#"{"expected_store_count": 10}"#).unwrap();
/// assert_eq!(config.expected_store_count, 10);
/// assert_eq!(config.date_format, "%Y-%m-%d");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Report title
    pub name: String,
    /// `chrono` format of textual dates in the sources
    pub date_format: String,
    pub tables: TableNames,
    /// Reference distinct store count for the cardinality gate
    pub expected_store_count: u64,
    /// Reference distinct department count for the cardinality gate
    pub expected_department_count: u64,
    /// Store `Type` values the domain gate accepts
    pub allowed_store_types: Vec<String>,
    /// Whether the report carries a generation timestamp
    pub include_timestamp: bool,
    /// CSV field values read as null, in addition to an empty field
    pub null_markers: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "retail_sales_merge".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            tables: TableNames::default(),
            expected_store_count: 45,
            expected_department_count: 81,
            allowed_store_types: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            include_timestamp: true,
            null_markers: vec!["NA".to_string()],
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MergeError::Serialization(format!("Invalid pipeline config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    pub fn with_tables(mut self, tables: TableNames) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_expected_cardinality(mut self, stores: u64, departments: u64) -> Self {
        self.expected_store_count = stores;
        self.expected_department_count = departments;
        self
    }

    pub fn with_allowed_store_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_store_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.include_timestamp = enabled;
        self
    }

    pub fn with_null_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// The CSV null pattern: an empty field or any of the null markers.
    ///
    /// `None` leaves only empty fields null.
    pub fn null_regex(&self) -> Option<String> {
        if self.null_markers.is_empty() {
            return None;
        }
        let markers: Vec<String> = self.null_markers.iter().map(|m| regex::escape(m)).collect();
        Some(format!("^(?:{})?$", markers.join("|")))
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        let names = self.tables.all();
        for name in names {
            SqlSecurity::validate_identifier(name)?;
        }
        if let Some(name) = names.iter().find(|n| intermediate::RESERVED.contains(*n)) {
            return Err(MergeError::Configuration(format!(
                "Table name '{name}' is reserved for intermediate results"
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if names[i + 1..].contains(name) {
                return Err(MergeError::Configuration(format!(
                    "Table name '{name}' is used more than once"
                )));
            }
        }

        validate_date_format(&self.date_format)?;

        if self.expected_store_count == 0 || self.expected_department_count == 0 {
            return Err(MergeError::Configuration(
                "Expected store and department counts must be positive".to_string(),
            ));
        }

        if self.null_markers.iter().any(|m| m.is_empty()) {
            return Err(MergeError::Configuration(
                "Null markers must not be empty".to_string(),
            ));
        }

        if self.allowed_store_types.is_empty() {
            return Err(MergeError::Configuration(
                "At least one store type must be allowed".to_string(),
            ));
        }

        Ok(())
    }
}

// A usable format must render a date and parse the rendering back to it.
fn validate_date_format(format: &str) -> Result<()> {
    let invalid = || MergeError::Configuration(format!("Invalid date format '{format}'"));

    let probe = NaiveDate::from_ymd_opt(2010, 2, 5).ok_or_else(invalid)?;
    let mut rendered = String::new();
    write!(rendered, "{}", probe.format(format)).map_err(|_| invalid())?;

    match NaiveDate::parse_from_str(&rendered, format) {
        Ok(parsed) if parsed == probe => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.expected_store_count, 45);
        assert_eq!(config.expected_department_count, 81);
        assert_eq!(config.allowed_store_types, vec!["A", "B", "C"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::default()
            .with_name("weekly")
            .with_expected_cardinality(3, 7)
            .with_allowed_store_types(["A", "B"])
            .with_timestamp(false);
        assert_eq!(config.name, "weekly");
        assert_eq!(config.expected_department_count, 7);
        assert!(!config.include_timestamp);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            PipelineConfig::from_json_str(r#"{"name": "q1", "tables": {"sales": "train"}}"#)
                .unwrap();
        assert_eq!(config.name, "q1");
        assert_eq!(config.tables.sales, "train");
        assert_eq!(config.tables.stores, "stores");
    }

    #[test]
    fn test_invalid_configs() {
        assert!(PipelineConfig::from_json_str("{not json").is_err());
        assert!(PipelineConfig::default()
            .with_date_format("%Q")
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_date_format("%Y")
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_expected_cardinality(0, 81)
            .validate()
            .is_err());

        let tables = TableNames {
            merged: "sales".to_string(),
            ..Default::default()
        };
        assert!(PipelineConfig::default()
            .with_tables(tables)
            .validate()
            .is_err());
    }

    #[test]
    fn test_intermediate_table_names_rejected() {
        let tables = TableNames {
            indicators: "sales_keyed".to_string(),
            ..Default::default()
        };
        let err = PipelineConfig::default()
            .with_tables(tables)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("reserved"));

        let tables = TableNames {
            merged: "sales_indicators".to_string(),
            ..Default::default()
        };
        assert!(PipelineConfig::default().with_tables(tables).validate().is_err());
    }

    #[test]
    fn test_null_regex() {
        let config = PipelineConfig::default();
        assert_eq!(config.null_regex().as_deref(), Some("^(?:NA)?$"));

        let config = config.with_null_markers(["NA", "n/a", "?"]);
        assert_eq!(config.null_regex().as_deref(), Some("^(?:NA|n/a|\\?)?$"));
        assert!(config.validate().is_ok());

        let config = config.with_null_markers(Vec::<String>::new());
        assert_eq!(config.null_regex(), None);

        assert!(PipelineConfig::default()
            .with_null_markers([""])
            .validate()
            .is_err());
    }

    #[test]
    fn test_alternate_date_format() {
        assert!(PipelineConfig::default()
            .with_date_format("%d/%m/%Y")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"expected_store_count": 2}}"#).unwrap();
        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.expected_store_count, 2);

        assert!(PipelineConfig::from_json_file("/nonexistent/config.json").is_err());
    }
}
