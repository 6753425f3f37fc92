//! SQL identifier safety for generated queries.
//!
//! Every table and column name that ends up inside SQL text built by the
//! pipeline goes through [`SqlSecurity`]. Column names in the retail sources are
//! mixed-case (`Weekly_Sales`, `IsHoliday`), so quoting is also what keeps
//! DataFusion from folding them to lowercase.

use crate::error::{MergeError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// SQL identifier validation and escaping utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates and quotes a SQL identifier (table name, column name, etc.).
    ///
    /// # Examples
    /// ```rust
    /// use merge_guard::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("Weekly_Sales").unwrap(), "\"Weekly_Sales\"");
    /// assert!(SqlSecurity::escape_identifier("id; DROP TABLE sales--").is_err());
    /// assert!(SqlSecurity::escape_identifier(&"very_long_name_".repeat(100)).is_err());
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;

        let escaped = identifier.replace('"', "\"\"");
        Ok(format!("\"{escaped}\""))
    }

    /// Quotes every identifier in `identifiers` and joins them with `", "`.
    pub fn escape_list<S: AsRef<str>>(identifiers: &[S]) -> Result<String> {
        let escaped = identifiers
            .iter()
            .map(|id| Self::escape_identifier(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(escaped.join(", "))
    }

    /// Validates a SQL identifier without escaping it.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.is_empty() || identifier.trim().is_empty() {
            return Err(MergeError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > 128 {
            return Err(MergeError::SecurityError(
                "SQL identifier too long (max 128 characters)".to_string(),
            ));
        }

        if identifier.contains('\0') {
            return Err(MergeError::SecurityError(
                "SQL identifier cannot contain null bytes".to_string(),
            ));
        }

        static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
            // Hard-coded pattern, always valid.
            #[allow(clippy::expect_used)]
            Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("Hard-coded regex pattern should be valid")
        });

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(MergeError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers and underscores"
            )));
        }

        Self::check_dangerous_patterns(identifier)
    }

    fn check_dangerous_patterns(identifier: &str) -> Result<()> {
        let identifier_lower = identifier.to_lowercase();

        let dangerous_patterns = &[
            "--", "xp_", "sp_", "union", "select", "insert", "update", "delete", "drop", "create",
            "alter", "exec", "declare", "cursor",
        ];

        for pattern in dangerous_patterns {
            if identifier_lower.contains(pattern) {
                return Err(MergeError::SecurityError(format!(
                    "SQL identifier contains dangerous pattern: '{pattern}'"
                )));
            }
        }

        Ok(())
    }
}
