//! Pipeline run state machine.
//!
//! A run moves strictly forward through
//! `INGESTED -> SCHEMA_VALIDATED -> JOINED -> QUALITY_CHECKED ->
//! FEATURES_DERIVED -> REPORTED -> DONE`. A fatal failure while attempting any
//! stage moves the run to the terminal `FAILED` state; the stage that was being
//! attempted is recorded separately in the report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Ingested,
    SchemaValidated,
    Joined,
    QualityChecked,
    FeaturesDerived,
    Reported,
    Done,
    Failed,
}

impl PipelineStage {
    /// The successful path, in order.
    pub const HAPPY_PATH: [PipelineStage; 7] = [
        PipelineStage::Ingested,
        PipelineStage::SchemaValidated,
        PipelineStage::Joined,
        PipelineStage::QualityChecked,
        PipelineStage::FeaturesDerived,
        PipelineStage::Reported,
        PipelineStage::Done,
    ];

    /// Returns the stage that follows this one on the successful path.
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Ingested => Some(PipelineStage::SchemaValidated),
            PipelineStage::SchemaValidated => Some(PipelineStage::Joined),
            PipelineStage::Joined => Some(PipelineStage::QualityChecked),
            PipelineStage::QualityChecked => Some(PipelineStage::FeaturesDerived),
            PipelineStage::FeaturesDerived => Some(PipelineStage::Reported),
            PipelineStage::Reported => Some(PipelineStage::Done),
            PipelineStage::Done | PipelineStage::Failed => None,
        }
    }

    /// Returns true if the run may move from this stage to `target`.
    ///
    /// Any non-terminal stage may fail.
    pub fn can_transition_to(&self, target: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == PipelineStage::Failed || self.next() == Some(target)
    }

    /// Returns true for `DONE` and `FAILED`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }

    /// Returns the upper-case stage name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Ingested => "INGESTED",
            PipelineStage::SchemaValidated => "SCHEMA_VALIDATED",
            PipelineStage::Joined => "JOINED",
            PipelineStage::QualityChecked => "QUALITY_CHECKED",
            PipelineStage::FeaturesDerived => "FEATURES_DERIVED",
            PipelineStage::Reported => "REPORTED",
            PipelineStage::Done => "DONE",
            PipelineStage::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
