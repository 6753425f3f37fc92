//! Core types shared by every pipeline stage.
//!
//! ## Overview
//!
//! - **[`MergeContext`]**: the DataFusion session every table lives in
//! - **[`QualityGate`]**: a read-only check over a table, producing a [`GateResult`]
//! - **[`Level`]**: gate severity (Fatal, Warning, Info)
//! - **[`PipelineStage`]**: the run state machine
//! - **[`ValidationReport`]** and **[`PipelineOutcome`]**: what a run hands back
//!
//! ## Architecture
//!
//! ```text
//! sources ──► schema ──► tracker ──► join ──► gates ──► temporal ──► policy ──► report
//!   INGESTED   SCHEMA_VALIDATED       JOINED   QUALITY_CHECKED  FEATURES_DERIVED  REPORTED
//! ```

pub mod context;
pub mod gate;
pub mod level;
pub mod result;
pub mod stage;
pub mod validation_context;

pub use context::{MergeContext, MergeContextConfig};
pub use gate::{GateMetadata, GateResult, GateStatus, QualityGate};
pub use level::Level;
pub use result::{
    DateRange, DistinctCount, FatalFailure, FillCount, MergedTable, PipelineOutcome, RunStatus,
    SourceProfile, ValidationReport,
};
pub use stage::PipelineStage;
pub use validation_context::{current_validation_context, ValidationContext, CURRENT_CONTEXT};
