//! Test helpers for gates that read the ValidationContext.

use crate::core::{validation_context::CURRENT_CONTEXT, GateResult, QualityGate, ValidationContext};
use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::prelude::SessionContext;
use std::sync::Arc;

/// Evaluates a gate with the given table name in the validation context.
pub async fn evaluate_gate_with_context(
    gate: &dyn QualityGate,
    ctx: &SessionContext,
    table_name: &str,
) -> Result<GateResult, Box<dyn std::error::Error>> {
    let validation_ctx = ValidationContext::new(table_name.to_string());
    let result = CURRENT_CONTEXT.scope(validation_ctx, gate.evaluate(ctx)).await?;
    Ok(result)
}

/// Creates a session holding one table built from named, nullable columns.
pub fn session_with_table(name: &str, columns: Vec<(&str, ArrayRef)>) -> SessionContext {
    let ctx = SessionContext::new();
    let fields: Vec<Field> = columns
        .iter()
        .map(|(n, a)| Field::new(*n, a.data_type().clone(), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let arrays = columns.into_iter().map(|(_, a)| a).collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays).unwrap();
    let provider = MemTable::try_new(schema, vec![vec![batch]]).unwrap();
    ctx.register_table(name, Arc::new(provider)).unwrap();
    ctx
}
