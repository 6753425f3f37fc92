//! Typed builders for the three sources, used by tests and benchmarks.
//!
//! Rows are written as plain structs and turned into Arrow batches with the
//! source column layout. Dates stay textual, the way a CSV source delivers
//! them, so every run exercises date normalization.

use crate::config::TableNames;
use crate::core::MergeContext;
use crate::error::Result;
use crate::schema::columns;
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// One weekly sales observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesRow {
    pub store: i64,
    pub dept: i64,
    pub date: String,
    pub weekly_sales: Option<f64>,
    pub is_holiday: bool,
}

impl SalesRow {
    pub fn new(store: i64, dept: i64, date: &str, weekly_sales: f64, is_holiday: bool) -> Self {
        Self {
            store,
            dept,
            date: date.to_string(),
            weekly_sales: Some(weekly_sales),
            is_holiday,
        }
    }

    pub fn without_sales(mut self) -> Self {
        self.weekly_sales = None;
        self
    }
}

/// One store-week of economic indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub store: i64,
    pub date: String,
    pub temperature: Option<f64>,
    pub fuel_price: Option<f64>,
    pub markdowns: [Option<f64>; 5],
    pub cpi: Option<f64>,
    pub unemployment: Option<f64>,
    pub is_holiday: bool,
}

impl IndicatorRow {
    /// A row with typical indicator values and no markdowns.
    pub fn new(store: i64, date: &str, is_holiday: bool) -> Self {
        Self {
            store,
            date: date.to_string(),
            temperature: Some(42.31),
            fuel_price: Some(2.572),
            markdowns: [None; 5],
            cpi: Some(211.096),
            unemployment: Some(8.106),
            is_holiday,
        }
    }

    pub fn with_markdowns(mut self, markdowns: [Option<f64>; 5]) -> Self {
        self.markdowns = markdowns;
        self
    }
}

/// Static metadata of one store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRow {
    pub store: i64,
    pub store_type: String,
    pub size: i64,
}

impl StoreRow {
    pub fn new(store: i64, store_type: &str, size: i64) -> Self {
        Self {
            store,
            store_type: store_type.to_string(),
            size,
        }
    }
}

fn batch(fields: Vec<Field>, arrays: Vec<ArrayRef>) -> Result<RecordBatch> {
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// `Store, Dept, Date, Weekly_Sales, IsHoliday`
pub fn sales_batch(rows: &[SalesRow]) -> Result<RecordBatch> {
    batch(
        vec![
            Field::new(columns::STORE, DataType::Int64, true),
            Field::new(columns::DEPT, DataType::Int64, true),
            Field::new(columns::DATE, DataType::Utf8, true),
            Field::new(columns::WEEKLY_SALES, DataType::Float64, true),
            Field::new(columns::IS_HOLIDAY, DataType::Boolean, true),
        ],
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.store))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.dept))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.date.as_str()))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.weekly_sales))),
            Arc::new(BooleanArray::from_iter(rows.iter().map(|r| Some(r.is_holiday)))),
        ],
    )
}

/// `Store, Date, Temperature, Fuel_Price, MarkDown1..5, CPI, Unemployment, IsHoliday`
pub fn indicators_batch(rows: &[IndicatorRow]) -> Result<RecordBatch> {
    let mut fields = vec![
        Field::new(columns::STORE, DataType::Int64, true),
        Field::new(columns::DATE, DataType::Utf8, true),
        Field::new(columns::TEMPERATURE, DataType::Float64, true),
        Field::new(columns::FUEL_PRICE, DataType::Float64, true),
    ];
    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.store))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.date.as_str()))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.temperature))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.fuel_price))),
    ];
    for (i, name) in columns::MARKDOWNS.iter().enumerate() {
        fields.push(Field::new(*name, DataType::Float64, true));
        arrays.push(Arc::new(Float64Array::from_iter(
            rows.iter().map(|r| r.markdowns[i]),
        )));
    }
    fields.extend([
        Field::new(columns::CPI, DataType::Float64, true),
        Field::new(columns::UNEMPLOYMENT, DataType::Float64, true),
        Field::new(columns::IS_HOLIDAY, DataType::Boolean, true),
    ]);
    arrays.extend([
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.cpi))) as ArrayRef,
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.unemployment))),
        Arc::new(BooleanArray::from_iter(rows.iter().map(|r| Some(r.is_holiday)))),
    ]);
    batch(fields, arrays)
}

/// `Store, Type, Size`
pub fn stores_batch(rows: &[StoreRow]) -> Result<RecordBatch> {
    batch(
        vec![
            Field::new(columns::STORE, DataType::Int64, true),
            Field::new(columns::TYPE, DataType::Utf8, true),
            Field::new(columns::SIZE, DataType::Int64, true),
        ],
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.store))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.store_type.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.size))),
        ],
    )
}

/// Registers the three sources in `ctx` under `tables`.
pub fn register_sources(
    ctx: &mut MergeContext,
    tables: &TableNames,
    sales: &[SalesRow],
    indicators: &[IndicatorRow],
    stores: &[StoreRow],
) -> Result<()> {
    for (name, batch) in [
        (&tables.sales, sales_batch(sales)?),
        (&tables.indicators, indicators_batch(indicators)?),
        (&tables.stores, stores_batch(stores)?),
    ] {
        ctx.register_batches(name, batch.schema(), vec![batch])?;
    }
    Ok(())
}

/// Writes a batch to `path` as CSV with a header row.
pub fn write_csv(path: impl AsRef<Path>, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch)?;
    Ok(())
}

/// A generated, internally consistent set of sources.
#[derive(Debug, Clone)]
pub struct RetailDataset {
    pub sales: Vec<SalesRow>,
    pub indicators: Vec<IndicatorRow>,
    pub stores: Vec<StoreRow>,
}

impl RetailDataset {
    /// Generates `stores x departments x weeks` sales rows starting on
    /// Friday 2010-02-05, with one indicator row per store-week.
    ///
    /// The same seed always yields the same dataset.
    pub fn generate(stores: i64, departments: i64, weeks: i64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let start = chrono::NaiveDate::from_ymd_opt(2010, 2, 5).unwrap_or_default();
        let dates: Vec<String> = (0..weeks)
            .map(|w| (start + chrono::Duration::weeks(w)).format("%Y-%m-%d").to_string())
            .collect();
        let holidays: Vec<bool> = (0..weeks).map(|_| rng.random_bool(0.07)).collect();

        let store_rows = (1..=stores)
            .map(|s| {
                let store_type = ["A", "B", "C"][rng.random_range(0..3)];
                StoreRow::new(s, store_type, rng.random_range(30_000..220_000))
            })
            .collect();

        let mut indicators = Vec::with_capacity((stores * weeks) as usize);
        let mut sales = Vec::with_capacity((stores * departments * weeks) as usize);
        for store in 1..=stores {
            for (week, date) in dates.iter().enumerate() {
                let mut markdowns = [None; 5];
                for markdown in markdowns.iter_mut() {
                    if rng.random_bool(0.3) {
                        *markdown = Some(rng.random_range(0.0..10_000.0));
                    }
                }
                let mut row = IndicatorRow::new(store, date, holidays[week]).with_markdowns(markdowns);
                row.temperature = Some(rng.random_range(-5.0..100.0));
                row.fuel_price = Some(rng.random_range(2.4..4.5));
                indicators.push(row);

                for dept in 1..=departments {
                    let weekly_sales = rng.random_range(-500.0..60_000.0);
                    sales.push(SalesRow::new(store, dept, date, weekly_sales, holidays[week]));
                }
            }
        }

        Self {
            sales,
            indicators,
            stores: store_rows,
        }
    }

    pub fn register(&self, ctx: &mut MergeContext, tables: &TableNames) -> Result<()> {
        register_sources(ctx, tables, &self.sales, &self.indicators, &self.stores)
    }
}
