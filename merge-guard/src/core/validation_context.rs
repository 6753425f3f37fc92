//! Table scoping for quality gates.
//!
//! Gates are written against "the table under check" rather than a fixed
//! name. The pipeline sets the merged table's name through a task-local
//! [`ValidationContext`] before running the gate set.

use std::sync::Arc;

/// Name used when no context has been set.
pub const DEFAULT_TABLE: &str = "merged";

/// Runtime context for gate evaluation.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    table_name: Arc<str>,
}

impl ValidationContext {
    /// Creates a new validation context for the specified table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use merge_guard::core::ValidationContext;
    ///
    /// let ctx = ValidationContext::new("merged_sales");
    /// assert_eq!(ctx.table_name(), "merged_sales");
    /// ```
    pub fn new(table_name: impl Into<Arc<str>>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    /// Returns the name of the table being checked.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}

tokio::task_local! {
    pub static CURRENT_CONTEXT: ValidationContext;
}

/// Gets the current validation context, or the default one if none is set.
pub fn current_validation_context() -> ValidationContext {
    CURRENT_CONTEXT
        .try_with(|ctx| ctx.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        assert_eq!(ValidationContext::default().table_name(), "merged");
    }

    #[tokio::test]
    async fn test_task_local_context() {
        assert_eq!(current_validation_context().table_name(), DEFAULT_TABLE);

        CURRENT_CONTEXT
            .scope(ValidationContext::new("joined_step_two"), async {
                assert_eq!(current_validation_context().table_name(), "joined_step_two");
            })
            .await;

        assert_eq!(current_validation_context().table_name(), DEFAULT_TABLE);
    }

    #[tokio::test]
    async fn test_nested_contexts() {
        CURRENT_CONTEXT
            .scope(ValidationContext::new("outer"), async {
                CURRENT_CONTEXT
                    .scope(ValidationContext::new("inner"), async {
                        assert_eq!(current_validation_context().table_name(), "inner");
                    })
                    .await;
                assert_eq!(current_validation_context().table_name(), "outer");
            })
            .await;
    }
}
