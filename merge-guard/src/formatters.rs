//! Rendering of validation reports.
//!
//! A report renders as structured JSON for machines, as plain text for a
//! terminal, or as Markdown for a CI summary. Rendering is a pure function of
//! the report: sections and rows always appear in the order the run produced
//! them, and the timestamp is printed only when the report carries one.
//!
//! # Examples
//!
//! ```rust
//! use merge_guard::core::ValidationReport;
//! use merge_guard::formatters::{HumanFormatter, ResultFormatter};
//!
//! let report = ValidationReport::new("retail_sales_merge");
//! let text = HumanFormatter::new().format(&report).unwrap();
//! assert!(text.contains("retail_sales_merge"));
//! ```

use crate::core::{GateResult, GateStatus, RunStatus, ValidationReport};
use crate::prelude::*;
use std::fmt::{self, Write};

/// Configuration options for rendering a report.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Include the per-join diagnostics section
    pub include_joins: bool,
    /// Include the descriptive statistics section
    pub include_statistics: bool,
    /// Include informational findings that passed
    pub include_passing: bool,
    /// Maximum number of informational findings to display (`None` for all)
    pub max_findings: Option<usize>,
    /// Whether to use ANSI colors (human formatter only)
    pub use_colors: bool,
    /// Whether to print the report timestamp when present
    pub include_timestamp: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_joins: true,
            include_statistics: true,
            include_passing: true,
            max_findings: None,
            use_colors: false,
            include_timestamp: true,
        }
    }
}

impl FormatterConfig {
    /// Verdict, fatal findings and anomalies only.
    pub fn minimal() -> Self {
        Self {
            include_joins: false,
            include_statistics: false,
            include_passing: false,
            max_findings: Some(10),
            use_colors: false,
            include_timestamp: false,
        }
    }

    /// Everything, colored.
    pub fn detailed() -> Self {
        Self {
            use_colors: true,
            ..Self::default()
        }
    }

    /// Stable output for CI logs and golden files.
    pub fn ci() -> Self {
        Self {
            use_colors: false,
            include_timestamp: false,
            ..Self::default()
        }
    }

    pub fn with_joins(mut self, include: bool) -> Self {
        self.include_joins = include;
        self
    }

    pub fn with_statistics(mut self, include: bool) -> Self {
        self.include_statistics = include;
        self
    }

    pub fn with_passing(mut self, include: bool) -> Self {
        self.include_passing = include;
        self
    }

    pub fn with_max_findings(mut self, max: usize) -> Self {
        self.max_findings = Some(max);
        self
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn with_timestamp(mut self, include: bool) -> Self {
        self.include_timestamp = include;
        self
    }

    fn findings<'a>(&self, report: &'a ValidationReport) -> (Vec<&'a GateResult>, usize) {
        let selected: Vec<&GateResult> = report
            .informational_findings()
            .filter(|r| self.include_passing || !r.status.is_pass())
            .collect();
        let total = selected.len();
        let shown = match self.max_findings {
            Some(max) => selected.into_iter().take(max).collect(),
            None => selected,
        };
        let hidden = total - shown.len();
        (shown, hidden)
    }
}

/// Renders a [`ValidationReport`].
///
/// # Examples
///
/// ```rust
/// use merge_guard::core::ValidationReport;
/// use merge_guard::formatters::ResultFormatter;
///
/// struct Verdict;
///
/// impl ResultFormatter for Verdict {
///     fn format(&self, report: &ValidationReport) -> merge_guard::prelude::Result<String> {
///         Ok(report.status().to_string())
///     }
/// }
///
/// assert_eq!(Verdict.format(&ValidationReport::new("run")).unwrap(), "PASS");
/// ```
pub trait ResultFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String>;

    /// Renders with an explicit configuration. The default ignores it.
    fn format_with_config(
        &self,
        report: &ValidationReport,
        _config: &FormatterConfig,
    ) -> Result<String> {
        self.format(report)
    }
}

fn render_error(e: fmt::Error) -> MergeError {
    MergeError::Internal(format!("Failed to render report: {e}"))
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

/// Renders the report as JSON.
///
/// The JSON carries the full report; the configuration only drops optional
/// sections and the timestamp.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    config: FormatterConfig,
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            pretty: true,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            pretty: true,
        }
    }

    /// Sets whether to use pretty-printed JSON.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for JsonFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String> {
        self.format_with_config(report, &self.config)
    }

    fn format_with_config(
        &self,
        report: &ValidationReport,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut value = serde_json::to_value(report)
            .map_err(|e| MergeError::Serialization(format!("Failed to serialize report: {e}")))?;

        if let Some(object) = value.as_object_mut() {
            object.insert(
                "status".to_string(),
                serde_json::Value::String(report.status().to_string()),
            );
            if !config.include_timestamp {
                object.remove("timestamp");
            }
            if !config.include_joins {
                object.remove("joins");
            }
            if !config.include_statistics {
                object.remove("statistics");
            }
        }

        let rendered = if self.pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        };
        rendered.map_err(|e| MergeError::Serialization(format!("Failed to serialize report: {e}")))
    }
}

/// Renders the report as plain text for a terminal.
#[derive(Debug, Clone)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn paint(&self, config: &FormatterConfig, status: GateStatus, text: &str) -> String {
        if !config.use_colors {
            return text.to_string();
        }
        let code = match status {
            GateStatus::Pass => "32",
            GateStatus::Warning => "33",
            GateStatus::Fail => "31",
        };
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn write_finding(
        &self,
        out: &mut String,
        config: &FormatterConfig,
        result: &GateResult,
    ) -> fmt::Result {
        let label = self.paint(config, result.status, result.status.label());
        write!(
            out,
            "   [{label}] {}: observed {}, expected {}",
            result.name, result.observed, result.expected
        )?;
        if let Some(message) = &result.message {
            write!(out, " ({message})")?;
        }
        writeln!(out)
    }

    fn render(
        &self,
        out: &mut String,
        report: &ValidationReport,
        config: &FormatterConfig,
    ) -> fmt::Result {
        writeln!(out)?;
        let verdict = match report.status() {
            RunStatus::Pass => self.paint(config, GateStatus::Pass, "Merge PASSED"),
            RunStatus::Fail => self.paint(config, GateStatus::Fail, "Merge FAILED"),
        };
        writeln!(out, "{verdict}")?;
        writeln!(out)?;
        writeln!(out, "Run: {}", report.name)?;
        if config.include_timestamp {
            if let Some(ts) = report.timestamp {
                writeln!(out, "Timestamp: {}", ts.to_rfc3339())?;
            }
        }
        writeln!(out, "Stage: {}", report.stage)?;
        if let Some(failure) = &report.failure {
            writeln!(
                out,
                "Failed at: {} ({}): {}",
                failure.stage, failure.kind, failure.message
            )?;
        }

        if !report.sources.is_empty() {
            writeln!(out)?;
            writeln!(out, "Sources:")?;
            for source in &report.sources {
                writeln!(
                    out,
                    "   {}: {} rows, {} columns",
                    source.name, source.rows, source.columns
                )?;
            }
        }

        if !report.checkpoints.is_empty() {
            writeln!(out)?;
            writeln!(out, "Row counts:")?;
            for checkpoint in &report.checkpoints {
                writeln!(out, "   {}: {}", checkpoint.name, checkpoint.rows)?;
            }
        }

        if config.include_joins && !report.joins.is_empty() {
            writeln!(out)?;
            writeln!(out, "Joins:")?;
            for join in &report.joins {
                writeln!(
                    out,
                    "   {} ({} on {}): {} x {} -> {} rows, {} unmatched, {} duplicate right keys",
                    join.step,
                    join.join_type.to_sql(),
                    join.keys.join(", "),
                    join.left_rows,
                    join.right_rows,
                    join.output_rows,
                    join.unmatched_left_rows,
                    join.duplicate_right_keys
                )?;
            }
        }

        let fatal: Vec<&GateResult> = report.fatal_findings().collect();
        if !fatal.is_empty() {
            writeln!(out)?;
            writeln!(out, "FATAL checks:")?;
            for result in fatal {
                self.write_finding(out, config, result)?;
            }
        }

        let (findings, hidden) = config.findings(report);
        if !findings.is_empty() || hidden > 0 {
            writeln!(out)?;
            writeln!(out, "INFORMATIONAL findings ({} warnings):", report.warning_count())?;
            for result in findings {
                self.write_finding(out, config, result)?;
            }
            if hidden > 0 {
                writeln!(out, "   ... and {hidden} more")?;
            }
        }

        if let Some(range) = report.date_range {
            writeln!(out)?;
            writeln!(out, "Date range: {} .. {}", range.min, range.max)?;
        }

        if !report.distinct_counts.is_empty() {
            writeln!(out)?;
            writeln!(out, "Distinct counts:")?;
            for distinct in &report.distinct_counts {
                writeln!(out, "   {}: {}", distinct.column, distinct.count)?;
            }
        }

        if !report.markdown_fills.is_empty() {
            writeln!(out)?;
            writeln!(out, "Markdown zero-fill:")?;
            for fill in &report.markdown_fills {
                writeln!(out, "   {}: {} filled", fill.column, fill.filled)?;
            }
        }

        if config.include_statistics && !report.statistics.is_empty() {
            writeln!(out)?;
            writeln!(out, "Statistics:")?;
            writeln!(
                out,
                "   {:<14} {:>8} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
                "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
            )?;
            for s in &report.statistics {
                writeln!(
                    out,
                    "   {:<14} {:>8} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
                    s.column,
                    s.count,
                    fmt_opt(s.mean),
                    fmt_opt(s.std),
                    fmt_opt(s.min),
                    fmt_opt(s.p25),
                    fmt_opt(s.p50),
                    fmt_opt(s.p75),
                    fmt_opt(s.max)
                )?;
            }
        }

        writeln!(out)?;
        writeln!(out, "Overall: {}", report.status())?;
        Ok(())
    }
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for HumanFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String> {
        self.format_with_config(report, &self.config)
    }

    fn format_with_config(
        &self,
        report: &ValidationReport,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut output = String::new();
        self.render(&mut output, report, config)
            .map_err(render_error)?;
        Ok(output)
    }
}

/// Renders the report as Markdown.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    config: FormatterConfig,
    heading_level: u8,
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            heading_level: 2,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            heading_level: 2,
        }
    }

    /// Sets the level of the top heading, clamped to 1 through 6.
    pub fn with_heading_level(mut self, level: u8) -> Self {
        self.heading_level = level.clamp(1, 6);
        self
    }

    fn heading(&self, depth: u8) -> String {
        "#".repeat((self.heading_level + depth).min(6) as usize)
    }

    fn write_findings_table(&self, out: &mut String, results: &[&GateResult]) -> fmt::Result {
        writeln!(out, "| Check | Status | Observed | Expected |")?;
        writeln!(out, "|-------|--------|----------|----------|")?;
        for result in results {
            writeln!(
                out,
                "| {} | {} | {} | {} |",
                result.name,
                result.status.label(),
                result.observed.replace('|', "\\|"),
                result.expected.replace('|', "\\|")
            )?;
        }
        Ok(())
    }

    fn render(
        &self,
        out: &mut String,
        report: &ValidationReport,
        config: &FormatterConfig,
    ) -> fmt::Result {
        let h1 = self.heading(0);
        let h2 = self.heading(1);

        writeln!(out, "{h1} Merge Report: {}", report.name)?;
        writeln!(out)?;
        writeln!(out, "**Status:** {}", report.status())?;
        writeln!(out, "**Stage:** {}", report.stage)?;
        if config.include_timestamp {
            if let Some(ts) = report.timestamp {
                writeln!(out, "**Timestamp:** {}", ts.to_rfc3339())?;
            }
        }
        if let Some(failure) = &report.failure {
            writeln!(out)?;
            writeln!(
                out,
                "> **Failed at {}** (`{}`): {}",
                failure.stage, failure.kind, failure.message
            )?;
        }

        if !report.sources.is_empty() || !report.checkpoints.is_empty() {
            writeln!(out)?;
            writeln!(out, "{h2} Row Counts")?;
            writeln!(out)?;
            writeln!(out, "| Checkpoint | Rows |")?;
            writeln!(out, "|------------|------|")?;
            for checkpoint in &report.checkpoints {
                writeln!(out, "| {} | {} |", checkpoint.name, checkpoint.rows)?;
            }
        }

        if config.include_joins && !report.joins.is_empty() {
            writeln!(out)?;
            writeln!(out, "{h2} Joins")?;
            writeln!(out)?;
            writeln!(out, "| Step | Keys | Left | Right | Output | Unmatched | Duplicate keys |")?;
            writeln!(out, "|------|------|------|-------|--------|-----------|----------------|")?;
            for join in &report.joins {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} | {} |",
                    join.step,
                    join.keys.join(", "),
                    join.left_rows,
                    join.right_rows,
                    join.output_rows,
                    join.unmatched_left_rows,
                    join.duplicate_right_keys
                )?;
            }
        }

        let fatal: Vec<&GateResult> = report.fatal_findings().collect();
        if !fatal.is_empty() {
            writeln!(out)?;
            writeln!(out, "{h2} Fatal Checks")?;
            writeln!(out)?;
            self.write_findings_table(out, &fatal)?;
        }

        let (findings, hidden) = config.findings(report);
        if !findings.is_empty() || hidden > 0 {
            writeln!(out)?;
            writeln!(out, "{h2} Informational Findings")?;
            writeln!(out)?;
            self.write_findings_table(out, &findings)?;
            if hidden > 0 {
                writeln!(out)?;
                writeln!(out, "*... and {hidden} more*")?;
            }
        }

        if report.date_range.is_some()
            || !report.distinct_counts.is_empty()
            || !report.markdown_fills.is_empty()
        {
            writeln!(out)?;
            writeln!(out, "{h2} Output Profile")?;
            writeln!(out)?;
            if let Some(range) = report.date_range {
                writeln!(out, "- **Date range:** {} .. {}", range.min, range.max)?;
            }
            for distinct in &report.distinct_counts {
                writeln!(out, "- **Distinct {}:** {}", distinct.column, distinct.count)?;
            }
            for fill in &report.markdown_fills {
                writeln!(out, "- **{} zero-filled:** {}", fill.column, fill.filled)?;
            }
        }

        if config.include_statistics && !report.statistics.is_empty() {
            writeln!(out)?;
            writeln!(out, "{h2} Statistics")?;
            writeln!(out)?;
            writeln!(out, "| Column | Count | Mean | Std | Min | 25% | 50% | 75% | Max |")?;
            writeln!(out, "|--------|-------|------|-----|-----|-----|-----|-----|-----|")?;
            for s in &report.statistics {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                    s.column,
                    s.count,
                    fmt_opt(s.mean),
                    fmt_opt(s.std),
                    fmt_opt(s.min),
                    fmt_opt(s.p25),
                    fmt_opt(s.p50),
                    fmt_opt(s.p75),
                    fmt_opt(s.max)
                )?;
            }
        }

        Ok(())
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for MarkdownFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String> {
        self.format_with_config(report, &self.config)
    }

    fn format_with_config(
        &self,
        report: &ValidationReport,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut output = String::new();
        self.render(&mut output, report, config)
            .map_err(render_error)?;
        Ok(output)
    }
}
