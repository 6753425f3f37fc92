//! Zero-fill for promotional markdown columns.
//!
//! An absent markdown means no promotion ran that week, so it is recorded as
//! zero. The policy is fixed to the five markdown columns and cannot be
//! pointed at anything else; a null anywhere else is a data problem for the
//! gates to report.

use crate::core::FillCount;
use crate::prelude::*;
use crate::schema::columns;
use arrow::array::{Array, ArrayRef, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use tracing::{debug, instrument};

/// The missing-value policy applied before the merged table is emitted.
#[derive(Debug, Clone)]
pub struct MissingValuePolicy {
    columns: Vec<&'static str>,
}

impl MissingValuePolicy {
    /// The only policy there is: `MarkDown1` through `MarkDown5` filled with 0.
    pub fn markdowns() -> Self {
        Self {
            columns: columns::MARKDOWNS.to_vec(),
        }
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Fills absent values of the policy columns with `0.0`.
    ///
    /// The filled columns become non-nullable `Float64`. Returns the new batch
    /// and the number of values filled per column, in policy order.
    #[instrument(skip(self, batch), fields(rows = batch.num_rows()))]
    pub fn apply(&self, batch: &RecordBatch) -> Result<(RecordBatch, Vec<FillCount>)> {
        let schema = batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut arrays: Vec<ArrayRef> = batch.columns().to_vec();
        let mut fills = Vec::with_capacity(self.columns.len());

        for column in &self.columns {
            let index = schema
                .index_of(column)
                .map_err(|_| MergeError::column_not_found("merged", *column))?;

            let values = cast(&arrays[index], &DataType::Float64)?;
            let values = values
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| MergeError::Internal(format!("Cannot read '{column}' as Float64")))?;

            let filled = values.null_count() as u64;
            let complete: Float64Array = values.iter().map(|v| Some(v.unwrap_or(0.0))).collect();

            debug!(policy.column = %column, filled, "Filled absent markdowns");
            arrays[index] = Arc::new(complete);
            fields[index] = Field::new(*column, DataType::Float64, false);
            fills.push(FillCount {
                column: column.to_string(),
                filled,
            });
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
        Ok((batch, fills))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, NullArray};

    fn markdown_batch(first: ArrayRef) -> RecordBatch {
        let mut fields = vec![Field::new("Temperature", DataType::Float64, true)];
        let mut arrays: Vec<ArrayRef> = vec![Arc::new(Float64Array::from(vec![None, Some(3.0)]))];
        fields.push(Field::new("MarkDown1", first.data_type().clone(), true));
        arrays.push(first);
        for name in &columns::MARKDOWNS[1..] {
            fields.push(Field::new(*name, DataType::Float64, true));
            arrays.push(Arc::new(Float64Array::from(vec![Some(1.5), None])));
        }
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    #[test]
    fn test_fills_only_markdowns() {
        let batch = markdown_batch(Arc::new(Float64Array::from(vec![None, None])));
        let (filled, counts) = MissingValuePolicy::markdowns().apply(&batch).unwrap();

        let md1 = filled
            .column_by_name("MarkDown1")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(md1.values().to_vec(), vec![0.0, 0.0]);
        assert_eq!(md1.null_count(), 0);

        let md2 = filled
            .column_by_name("MarkDown2")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(md2.values().to_vec(), vec![1.5, 0.0]);

        // Temperature keeps its null.
        assert_eq!(filled.column_by_name("Temperature").unwrap().null_count(), 1);

        let filled_counts: Vec<u64> = counts.iter().map(|c| c.filled).collect();
        assert_eq!(filled_counts, vec![2, 1, 1, 1, 1]);
    }

    #[test]
    fn test_null_typed_and_integer_markdowns() {
        let batch = markdown_batch(Arc::new(NullArray::new(2)));
        let (filled, counts) = MissingValuePolicy::markdowns().apply(&batch).unwrap();
        assert_eq!(
            filled.schema().field_with_name("MarkDown1").unwrap().data_type(),
            &DataType::Float64
        );
        assert_eq!(counts[0].filled, 2);

        let batch = markdown_batch(Arc::new(Int64Array::from(vec![Some(7), None])));
        let (filled, _) = MissingValuePolicy::markdowns().apply(&batch).unwrap();
        let md1 = filled
            .column_by_name("MarkDown1")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(md1.values().to_vec(), vec![7.0, 0.0]);
    }

    #[test]
    fn test_missing_markdown_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("MarkDown1", DataType::Float64, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Float64Array::from(vec![1.0]))]).unwrap();
        assert!(MissingValuePolicy::markdowns().apply(&batch).is_err());
    }
}
