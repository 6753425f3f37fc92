//! Prelude for commonly used types and traits in merge-guard.

pub use crate::config::PipelineConfig;
pub use crate::core::{
    GateResult, GateStatus, Level, MergeContext, MergeContextConfig, PipelineOutcome,
    PipelineStage, QualityGate, ValidationReport,
};
pub use crate::error::{ErrorContext, MergeError, Result};
pub use crate::formatters::{FormatterConfig, ResultFormatter};
pub use crate::logging::LogConfig;
