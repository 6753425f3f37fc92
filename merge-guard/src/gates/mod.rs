//! The quality gate set run against the merged table.
//!
//! Fatal gates (critical nulls, duplicate natural keys) halt the run when
//! they fail. Every other gate only records what it saw.
//!
//! | Gate | Level | Observes |
//! |------|-------|----------|
//! | [`NullCountGate`] | fatal for `Weekly_Sales`, warning otherwise | null count |
//! | [`DuplicateKeyGate`] | fatal | rows repeating a natural key |
//! | [`NegativeValueGate`] | info | rows below zero |
//! | [`CardinalityGate`] | warning | distinct count vs reference |
//! | [`DateRangeGate`] | info | earliest and latest date |
//! | [`UnresolvedReferenceGate`] | info | rows with no store metadata |
//! | [`DomainGate`] | info | values outside an allowed set |
//! | [`FlagAgreementGate`] | info | rows whose two flags disagree |

pub mod cardinality;
pub mod completeness;
pub mod range;
pub mod referential;
pub mod uniqueness;

pub use cardinality::CardinalityGate;
pub use completeness::NullCountGate;
pub use range::{DateRangeGate, NegativeValueGate};
pub use referential::{DomainGate, FlagAgreementGate, UnresolvedReferenceGate};
pub use uniqueness::DuplicateKeyGate;

use crate::config::PipelineConfig;
use crate::core::context::scalar_i64;
use crate::core::{
    current_validation_context, GateResult, GateStatus, Level, QualityGate, ValidationContext,
    CURRENT_CONTEXT,
};
use crate::prelude::*;
use crate::schema::columns;
use crate::security::SqlSecurity;
use datafusion::prelude::*;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Quoted name of the table in the current validation context.
pub(crate) fn current_table() -> Result<String> {
    SqlSecurity::escape_identifier(current_validation_context().table_name())
}

/// Counts rows of the current table matching `predicate`.
pub(crate) async fn count_where(ctx: &SessionContext, predicate: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {predicate}", current_table()?);
    let batches = ctx.sql(&sql).await?.collect().await?;
    Ok(scalar_i64(&batches, 0)?.unwrap_or(0).max(0) as u64)
}

/// Results of a gate set run.
#[derive(Debug)]
pub struct GateSetOutcome {
    /// One result per gate, in declaration order
    pub results: Vec<GateResult>,
    /// The error raised by the first failing fatal gate
    pub halt: Option<MergeError>,
}

/// An ordered collection of independent gates.
#[derive(Debug, Clone, Default)]
pub struct GateSet {
    gates: Vec<Arc<dyn QualityGate>>,
}

impl GateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(mut self, gate: impl QualityGate + 'static) -> Self {
        self.gates.push(Arc::new(gate));
        self
    }

    pub fn gates(&self) -> &[Arc<dyn QualityGate>] {
        &self.gates
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// The gates checked after the retail merge.
    pub fn retail(config: &PipelineConfig) -> Self {
        Self::new()
            .with_gate(NullCountGate::new(columns::STORE, Level::Warning))
            .with_gate(NullCountGate::new(columns::DEPT, Level::Warning))
            .with_gate(NullCountGate::new(columns::DATE, Level::Warning))
            .with_gate(NullCountGate::new(columns::WEEKLY_SALES, Level::Fatal))
            .with_gate(DuplicateKeyGate::new(columns::NATURAL_KEY))
            .with_gate(NegativeValueGate::new(columns::WEEKLY_SALES))
            .with_gate(CardinalityGate::new(
                columns::STORE,
                config.expected_store_count,
            ))
            .with_gate(CardinalityGate::new(
                columns::DEPT,
                config.expected_department_count,
            ))
            .with_gate(DateRangeGate::new(columns::DATE))
            .with_gate(UnresolvedReferenceGate::new(
                columns::STORE,
                columns::STORE_MATCH,
            ))
            .with_gate(DomainGate::new(
                columns::TYPE,
                config.allowed_store_types.clone(),
            ))
            .with_gate(FlagAgreementGate::new(
                columns::IS_HOLIDAY,
                columns::IS_HOLIDAY_INDICATOR,
            ))
    }

    /// Evaluates every gate concurrently against `table`.
    ///
    /// Results keep declaration order. Infrastructure errors abort the run;
    /// a failing fatal gate does not, so the report always holds every gate.
    #[instrument(skip(self, ctx), fields(gates = self.gates.len()))]
    pub async fn run(&self, ctx: &SessionContext, table: &str) -> Result<GateSetOutcome> {
        SqlSecurity::validate_identifier(table)?;
        let scope = ValidationContext::new(table);

        let evaluations = self.gates.iter().map(|gate| {
            let scope = scope.clone();
            async move { CURRENT_CONTEXT.scope(scope, gate.evaluate(ctx)).await }
        });
        let outcomes = join_all(evaluations).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut halt = None;
        for (gate, outcome) in self.gates.iter().zip(outcomes) {
            let result = outcome.with_context(|| format!("Gate '{}' failed to evaluate", gate.name()))?;
            match result.status {
                GateStatus::Pass => debug!(
                    gate.name = %result.name,
                    gate.level = %result.level,
                    gate.columns = ?gate.metadata().columns,
                    gate.observed = %result.observed,
                    "Gate passed"
                ),
                GateStatus::Warning | GateStatus::Fail => warn!(
                    gate.name = %result.name,
                    gate.level = %result.level,
                    gate.status = %result.status,
                    gate.observed = %result.observed,
                    gate.expected = %result.expected,
                    "Gate reported an anomaly"
                ),
            }
            if halt.is_none() && result.is_fatal_failure() {
                halt = Some(gate.halt_error(&result));
            }
            results.push(result);
        }

        Ok(GateSetOutcome { results, halt })
    }
}
