//! Gate severity levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The severity of a quality gate.
///
/// Levels are ordered by severity: Fatal > Warning > Info.
///
/// - **Fatal**: a failing gate halts the run (critical nulls, duplicate keys).
/// - **Warning**: a finding worth investigating that never halts (nulls in
///   key columns, cardinality drift).
/// - **Info**: visibility metrics (negative sales, date span).
///
/// # Examples
///
/// ```rust
/// use merge_guard::core::Level;
///
/// assert!(Level::Fatal > Level::Warning);
/// assert!(Level::Warning > Level::Info);
/// assert!(Level::Fatal.is_fatal());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Informational metric, recorded only
    #[default]
    Info = 0,
    /// Non-fatal finding that should be reviewed
    Warning = 1,
    /// Failure halts the pipeline
    Fatal = 2,
}

impl Level {
    /// Returns the string representation of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Fatal => "fatal",
        }
    }

    /// Returns true if a failing gate at this level halts the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Level::Fatal)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
