//! Report and outcome types for a pipeline run.

use super::{GateResult, GateStatus, Level, PipelineStage};
use crate::error::MergeError;
use crate::join::JoinDiagnostics;
use crate::prelude::*;
use crate::stats::ColumnStatistics;
use crate::tracker::Checkpoint;
use arrow::csv::WriterBuilder;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pass,
    Fail,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pass => f.write_str("PASS"),
            RunStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// Shape of a source table at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
}

/// Observed calendar span of the merged table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

/// Distinct value count of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinctCount {
    pub column: String,
    pub count: u64,
}

/// Number of absent values the missing-value policy replaced in one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillCount {
    pub column: String,
    pub filled: u64,
}

/// The fatal error that halted a run, flattened for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalFailure {
    /// Stage that was being attempted
    pub stage: PipelineStage,
    /// Stable error kind, e.g. `row_count_divergence`
    pub kind: String,
    pub message: String,
}

/// Everything a run learned, in the order it learned it.
///
/// Every collection is an ordered `Vec` so rendering is a deterministic
/// function of the inputs. The timestamp is the only run-dependent field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Report title
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Final state of the run
    pub stage: PipelineStage,
    /// Stages completed, in order
    pub stages: Vec<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FatalFailure>,
    pub sources: Vec<SourceProfile>,
    pub schema_checks: Vec<GateResult>,
    pub checkpoints: Vec<Checkpoint>,
    pub reconciliation: Vec<GateResult>,
    pub joins: Vec<JoinDiagnostics>,
    pub gates: Vec<GateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    pub distinct_counts: Vec<DistinctCount>,
    pub markdown_fills: Vec<FillCount>,
    pub statistics: Vec<ColumnStatistics>,
}

impl ValidationReport {
    /// Creates an empty report for a run that has just ingested its sources.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: None,
            stage: PipelineStage::Ingested,
            stages: vec![PipelineStage::Ingested],
            failure: None,
            sources: Vec::new(),
            schema_checks: Vec::new(),
            checkpoints: Vec::new(),
            reconciliation: Vec::new(),
            joins: Vec::new(),
            gates: Vec::new(),
            date_range: None,
            distinct_counts: Vec::new(),
            markdown_fills: Vec::new(),
            statistics: Vec::new(),
        }
    }

    /// Stamps the report with the current time.
    pub fn with_timestamp(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }

    /// Advances the run to `stage`.
    pub fn advance(&mut self, stage: PipelineStage) -> Result<()> {
        if !self.stage.can_transition_to(stage) {
            return Err(MergeError::Internal(format!(
                "Invalid stage transition {} -> {stage}",
                self.stage
            )));
        }
        self.stage = stage;
        if stage != PipelineStage::Failed {
            self.stages.push(stage);
        }
        Ok(())
    }

    /// Moves the run to `FAILED`, recording the stage being attempted.
    pub fn fail(&mut self, attempted: PipelineStage, error: &MergeError) {
        self.stage = PipelineStage::Failed;
        self.failure = Some(FatalFailure {
            stage: attempted,
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    /// Overall verdict.
    pub fn status(&self) -> RunStatus {
        if self.failure.is_none() && !self.fatal_findings().any(|r| r.status.is_fail()) {
            RunStatus::Pass
        } else {
            RunStatus::Fail
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status() == RunStatus::Pass
    }

    /// Results of fatal-level checks: schema, reconciliation and fatal gates.
    pub fn fatal_findings(&self) -> impl Iterator<Item = &GateResult> {
        self.schema_checks
            .iter()
            .chain(self.reconciliation.iter())
            .chain(self.gates.iter())
            .filter(|r| r.level == Level::Fatal)
    }

    /// Results of non-fatal gates.
    pub fn informational_findings(&self) -> impl Iterator<Item = &GateResult> {
        self.gates.iter().filter(|r| r.level != Level::Fatal)
    }

    /// Number of non-fatal gates that observed an anomaly.
    pub fn warning_count(&self) -> usize {
        self.informational_findings()
            .filter(|r| r.status == GateStatus::Warning)
            .count()
    }

    /// Looks up a gate result by name.
    pub fn gate(&self, name: &str) -> Option<&GateResult> {
        self.gates.iter().find(|r| r.name == name)
    }

    /// Looks up a checkpoint row count by name.
    pub fn checkpoint(&self, name: &str) -> Option<usize> {
        self.checkpoints
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.rows)
    }
}

/// The validated, enriched output table.
#[derive(Debug, Clone)]
pub struct MergedTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl MergedTable {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Concatenates all batches into one.
    pub fn to_single_batch(&self) -> Result<RecordBatch> {
        Ok(arrow::compute::concat_batches(&self.schema, &self.batches)?)
    }

    /// Writes the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = WriterBuilder::new().with_header(true).build(writer);
        for batch in &self.batches {
            writer.write(batch)?;
        }
        Ok(())
    }
}

/// The result of a pipeline run.
///
/// A run that hits a fatal data-quality failure still produces its partial
/// report, but never a merged table.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed {
        merged: MergedTable,
        report: ValidationReport,
    },
    Failed {
        report: ValidationReport,
        error: MergeError,
    },
}

impl PipelineOutcome {
    pub fn report(&self) -> &ValidationReport {
        match self {
            PipelineOutcome::Completed { report, .. } | PipelineOutcome::Failed { report, .. } => {
                report
            }
        }
    }

    /// The merged table, present only for completed runs.
    pub fn merged(&self) -> Option<&MergedTable> {
        match self {
            PipelineOutcome::Completed { merged, .. } => Some(merged),
            PipelineOutcome::Failed { .. } => None,
        }
    }

    /// The fatal error, present only for failed runs.
    pub fn error(&self) -> Option<&MergeError> {
        match self {
            PipelineOutcome::Completed { .. } => None,
            PipelineOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Completed { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Renders the report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        use crate::formatters::{JsonFormatter, ResultFormatter};
        JsonFormatter::new().with_pretty(true).format(self.report())
    }

    /// Renders the report for a terminal.
    pub fn to_human(&self) -> Result<String> {
        use crate::formatters::{HumanFormatter, ResultFormatter};
        HumanFormatter::new().format(self.report())
    }

    /// Renders the report as Markdown.
    pub fn to_markdown(&self) -> Result<String> {
        use crate::formatters::{MarkdownFormatter, ResultFormatter};
        MarkdownFormatter::new().format(self.report())
    }
}
