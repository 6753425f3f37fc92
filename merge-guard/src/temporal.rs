//! Calendar features derived from the date column.
//!
//! `Week` follows ISO-8601 (weeks start on Monday, week 1 holds the year's
//! first Thursday) and `DayOfWeek` counts from Monday = 0. `Year` is the
//! calendar year, which can differ from the ISO week-year around January 1st.

use crate::join::{days_to_date, normalize_dates};
use crate::prelude::*;
use crate::schema::columns;
use arrow::array::{Array, ArrayRef, Date32Array, Int32Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Calendar features of one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    pub year: i32,
    /// 1 through 12
    pub month: u32,
    /// ISO week number, 1 through 53
    pub week: u32,
    /// Monday = 0 through Sunday = 6
    pub day_of_week: u32,
}

impl CalendarFeatures {
    /// # Examples
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use merge_guard::temporal::CalendarFeatures;
    ///
    /// let features = CalendarFeatures::from_date(NaiveDate::from_ymd_opt(2010, 2, 5).unwrap());
    /// assert_eq!((features.year, features.month, features.week), (2010, 2, 5));
    /// assert_eq!(features.day_of_week, 4); // Friday
    /// ```
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            week: date.iso_week().week(),
            day_of_week: date.weekday().num_days_from_monday(),
        }
    }
}

/// Appends `Year`, `Month`, `Week` and `DayOfWeek` to a table.
#[derive(Debug, Clone)]
pub struct TemporalFeatureDeriver {
    date_column: String,
    date_format: String,
}

impl TemporalFeatureDeriver {
    /// `date_format` applies only when the date column is textual.
    pub fn new(date_column: impl Into<String>, date_format: impl Into<String>) -> Self {
        Self {
            date_column: date_column.into(),
            date_format: date_format.into(),
        }
    }

    /// Returns `batch` with the four feature columns appended.
    ///
    /// A null date yields null features. A textual date that does not match
    /// the format fails with [`MergeError::DateParse`].
    #[instrument(skip(self, batch), fields(rows = batch.num_rows()))]
    pub fn derive(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let index = schema
            .index_of(&self.date_column)
            .map_err(|_| MergeError::column_not_found("merged", &self.date_column))?;
        let dates = normalize_dates(batch.column(index), &self.date_column, &self.date_format)?;
        let dates = dates
            .as_any()
            .downcast_ref::<Date32Array>()
            .ok_or_else(|| MergeError::Internal("Normalized dates are not Date32".to_string()))?;

        let rows = dates.len();
        let mut year = Int32Builder::with_capacity(rows);
        let mut month = Int32Builder::with_capacity(rows);
        let mut week = Int32Builder::with_capacity(rows);
        let mut day_of_week = Int32Builder::with_capacity(rows);

        for row in 0..rows {
            let features = if dates.is_null(row) {
                None
            } else {
                let days = dates.value(row);
                let date = days_to_date(days).ok_or_else(|| {
                    MergeError::Internal(format!("Date out of range at row {row}: {days}"))
                })?;
                Some(CalendarFeatures::from_date(date))
            };
            match features {
                Some(f) => {
                    year.append_value(f.year);
                    month.append_value(f.month as i32);
                    week.append_value(f.week as i32);
                    day_of_week.append_value(f.day_of_week as i32);
                }
                None => {
                    year.append_null();
                    month.append_null();
                    week.append_null();
                    day_of_week.append_null();
                }
            }
        }

        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut arrays: Vec<ArrayRef> = batch.columns().to_vec();
        for (name, mut builder) in [
            (columns::YEAR, year),
            (columns::MONTH, month),
            (columns::WEEK, week),
            (columns::DAY_OF_WEEK, day_of_week),
        ] {
            if schema.index_of(name).is_ok() {
                return Err(MergeError::Internal(format!(
                    "Column '{name}' already exists"
                )));
            }
            fields.push(Field::new(name, DataType::Int32, true));
            arrays.push(Arc::new(builder.finish()));
        }

        debug!(rows, "Derived calendar features");
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::date_to_days;
    use arrow::array::{Int32Array, StringArray};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reference_date() {
        let f = CalendarFeatures::from_date(date(2010, 2, 5));
        assert_eq!(f.year, 2010);
        assert_eq!(f.month, 2);
        assert_eq!(f.week, 5);
        assert_eq!(f.day_of_week, 4);
    }

    #[test]
    fn test_iso_week_edges() {
        // 2010-01-03 is a Sunday belonging to ISO week 53 of 2009.
        let f = CalendarFeatures::from_date(date(2010, 1, 3));
        assert_eq!((f.year, f.week, f.day_of_week), (2010, 53, 6));

        // 2012-12-31 is a Monday in ISO week 1 of 2013.
        let f = CalendarFeatures::from_date(date(2012, 12, 31));
        assert_eq!((f.year, f.month, f.week, f.day_of_week), (2012, 12, 1, 0));
    }

    fn single_column(name: &str, array: ArrayRef) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new(
            name,
            array.data_type().clone(),
            true,
        )]));
        RecordBatch::try_new(schema, vec![array]).unwrap()
    }

    #[test]
    fn test_derive_appends_columns() {
        let batch = single_column(
            "Date",
            Arc::new(Date32Array::from(vec![
                Some(date_to_days(date(2010, 2, 5))),
                None,
            ])),
        );
        let derived = TemporalFeatureDeriver::new("Date", "%Y-%m-%d")
            .derive(&batch)
            .unwrap();

        assert_eq!(derived.num_columns(), 5);
        let week = derived
            .column_by_name("Week")
            .unwrap()
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert_eq!(week.value(0), 5);
        assert!(week.is_null(1));
    }

    #[test]
    fn test_textual_date_parse_error() {
        let batch = single_column(
            "Date",
            Arc::new(StringArray::from(vec!["2010-02-05", "not a date"])),
        );
        let err = TemporalFeatureDeriver::new("Date", "%Y-%m-%d")
            .derive(&batch)
            .unwrap_err();
        assert!(matches!(err, MergeError::DateParse { row: 1, .. }));
    }

    #[test]
    fn test_missing_date_column() {
        let batch = single_column("Day", Arc::new(Int32Array::from(vec![1])));
        assert!(TemporalFeatureDeriver::new("Date", "%Y-%m-%d")
            .derive(&batch)
            .is_err());
    }
}
