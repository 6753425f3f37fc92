//! Cross-source consistency findings: unresolved store references, store
//! type domain and holiday flag agreement.
//!
//! All three are informational. Left-join semantics keep an unresolved row
//! in the merged table with null metadata, so these gates make such rows
//! visible instead of dropping them.

use super::count_where;
use crate::core::{GateMetadata, GateResult, Level, QualityGate};
use crate::prelude::*;
use crate::security::SqlSecurity;
use async_trait::async_trait;
use datafusion::prelude::*;
use tracing::instrument;

/// Counts rows whose key is present but found no metadata match.
///
/// The probe is a match marker the join projects from the right-side key, so
/// a matched store with blank metadata still counts as resolved.
#[derive(Debug, Clone)]
pub struct UnresolvedReferenceGate {
    key: String,
    probe: String,
    name: String,
}

impl UnresolvedReferenceGate {
    /// `probe` is non-null exactly when the row found a match.
    pub fn new(key: impl Into<String>, probe: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: format!("unresolved_references.{key}"),
            key,
            probe: probe.into(),
        }
    }
}

#[async_trait]
impl QualityGate for UnresolvedReferenceGate {
    #[instrument(skip(self, ctx), fields(gate.name = %self.name))]
    async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult> {
        let key = SqlSecurity::escape_identifier(&self.key)?;
        let probe = SqlSecurity::escape_identifier(&self.probe)?;
        let unresolved = count_where(ctx, &format!("{key} IS NOT NULL AND {probe} IS NULL")).await?;

        Ok(GateResult::from_check(
            &self.name,
            Level::Info,
            unresolved == 0,
            unresolved.to_string(),
            "= 0 (rows kept)",
        )
        .with_metric(unresolved as f64))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Level {
        Level::Info
    }

    fn metadata(&self) -> GateMetadata {
        GateMetadata::for_columns([&self.key, &self.probe])
            .with_description("Counts rows whose key has no metadata match")
    }
}

/// Counts rows whose value lies outside an allowed set. Nulls are not
/// counted.
#[derive(Debug, Clone)]
pub struct DomainGate {
    column: String,
    allowed: Vec<String>,
    name: String,
}

impl DomainGate {
    pub fn new(column: impl Into<String>, allowed: Vec<String>) -> Self {
        let column = column.into();
        Self {
            name: format!("domain.{column}"),
            column,
            allowed,
        }
    }

    fn allowed_list(&self) -> String {
        self.allowed
            .iter()
            .map(|v| format!("'{}'", v.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl QualityGate for DomainGate {
    #[instrument(skip(self, ctx), fields(gate.name = %self.name))]
    async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult> {
        let column = SqlSecurity::escape_identifier(&self.column)?;
        let predicate = if self.allowed.is_empty() {
            format!("{column} IS NOT NULL")
        } else {
            format!("{column} IS NOT NULL AND {column} NOT IN ({})", self.allowed_list())
        };
        let outside = count_where(ctx, &predicate).await?;

        Ok(GateResult::from_check(
            &self.name,
            Level::Info,
            outside == 0,
            outside.to_string(),
            format!("in {{{}}}", self.allowed.join(", ")),
        )
        .with_metric(outside as f64))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Level {
        Level::Info
    }

    fn metadata(&self) -> GateMetadata {
        GateMetadata::for_column(&self.column)
            .with_description(format!("Values must be one of {}", self.allowed.join(", ")))
    }
}

/// Counts rows where two boolean flags are both present and disagree.
#[derive(Debug, Clone)]
pub struct FlagAgreementGate {
    left: String,
    right: String,
    name: String,
}

impl FlagAgreementGate {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        let left = left.into();
        Self {
            name: format!("flag_agreement.{left}"),
            left,
            right: right.into(),
        }
    }
}

#[async_trait]
impl QualityGate for FlagAgreementGate {
    #[instrument(skip(self, ctx), fields(gate.name = %self.name))]
    async fn evaluate(&self, ctx: &SessionContext) -> Result<GateResult> {
        let left = SqlSecurity::escape_identifier(&self.left)?;
        let right = SqlSecurity::escape_identifier(&self.right)?;
        let disagreements = count_where(ctx, &format!("{left} <> {right}")).await?;

        Ok(GateResult::from_check(
            &self.name,
            Level::Info,
            disagreements == 0,
            disagreements.to_string(),
            format!("{} = {}", self.left, self.right),
        )
        .with_metric(disagreements as f64))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Level {
        Level::Info
    }
}
