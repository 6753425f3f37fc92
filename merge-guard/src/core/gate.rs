//! Quality gate trait and result types.

use crate::core::Level;
use crate::prelude::*;
use async_trait::async_trait;
use datafusion::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// The outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    /// The check observed nothing unusual
    Pass,
    /// The check observed an anomaly that does not halt the run
    Warning,
    /// The check failed
    Fail,
}

impl GateStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateStatus::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, GateStatus::Fail)
    }

    /// Upper-case label used in rendered reports.
    pub fn label(&self) -> &'static str {
        match self {
            GateStatus::Pass => "PASS",
            GateStatus::Warning => "WARN",
            GateStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A named check result as it appears in the report.
///
/// `observed` and `expected` are display strings so that counts, dates and
/// predicates ("= 0", "in {A, B, C}") share one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// Name of the check
    pub name: String,
    /// Severity of the check
    pub level: Level,
    /// Outcome
    pub status: GateStatus,
    /// Numeric metric behind the observation, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
    /// What was observed
    pub observed: String,
    /// The expected value or predicate
    pub expected: String,
    /// Additional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GateResult {
    /// Creates a result with the given status.
    pub fn new(
        name: impl Into<String>,
        level: Level,
        status: GateStatus,
        observed: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            level,
            status,
            metric: None,
            observed: observed.into(),
            expected: expected.into(),
            message: None,
        }
    }

    /// Creates a passing result.
    pub fn pass(
        name: impl Into<String>,
        level: Level,
        observed: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::new(name, level, GateStatus::Pass, observed, expected)
    }

    /// Creates a result that passes when `ok`, otherwise fails for fatal
    /// gates and warns for all others.
    pub fn from_check(
        name: impl Into<String>,
        level: Level,
        ok: bool,
        observed: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        let status = match (ok, level) {
            (true, _) => GateStatus::Pass,
            (false, Level::Fatal) => GateStatus::Fail,
            (false, _) => GateStatus::Warning,
        };
        Self::new(name, level, status, observed, expected)
    }

    /// Attaches a numeric metric.
    pub fn with_metric(mut self, metric: f64) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Attaches a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns true if this result must halt the run.
    pub fn is_fatal_failure(&self) -> bool {
        self.level.is_fatal() && self.status.is_fail()
    }
}

/// Descriptive metadata about a gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateMetadata {
    /// The column(s) this gate reads
    pub columns: Vec<String>,
    /// Human-readable description
    pub description: Option<String>,
}

impl GateMetadata {
    /// Creates metadata for a single-column gate.
    pub fn for_column(column: impl Into<String>) -> Self {
        Self {
            columns: vec![column.into()],
            description: None,
        }
    }

    /// Creates metadata for a multi-column gate.
    pub fn for_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A read-only check over the table named by the current
/// [`ValidationContext`](crate::core::ValidationContext).
///
/// Gates never mutate the table, so a gate set can be evaluated in any order
/// or concurrently.
///
/// # Examples
///
/// ```rust,ignore
/// use merge_guard::core::{GateResult, Level, QualityGate};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct NonEmpty;
///
/// #[async_trait]
/// impl QualityGate for NonEmpty {
///     async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult> {
///         // Count rows of current_validation_context().table_name()
///         Ok(GateResult::pass(self.name(), self.level(), "1", "> 0"))
///     }
///
///     fn name(&self) -> &str {
///         "non_empty"
///     }
///
///     fn level(&self) -> Level {
///         Level::Fatal
///     }
/// }
/// ```
#[async_trait]
pub trait QualityGate: Debug + Send + Sync {
    /// Evaluates the gate against the current table.
    async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult>;

    /// Returns the name of the gate.
    fn name(&self) -> &str;

    /// Returns the severity of the gate.
    fn level(&self) -> Level;

    /// Returns the metadata associated with this gate.
    fn metadata(&self) -> GateMetadata {
        GateMetadata::default()
    }

    /// The error that halts the run when this gate fails at fatal level.
    fn halt_error(&self, result: &GateResult) -> MergeError {
        MergeError::Internal(format!(
            "Fatal gate '{}' failed: observed {}, expected {}",
            result.name, result.observed, result.expected
        ))
    }
}
