//! Shared source builders for the integration tests.

#![allow(dead_code)]

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use merge_guard::config::TableNames;
use merge_guard::core::{MergeContext, MergeContextConfig, PipelineOutcome};
use merge_guard::pipeline::{Pipeline, SourcePaths};
use merge_guard::prelude::PipelineConfig;
use std::path::Path;
use std::sync::Arc;

pub const MARKDOWNS: [&str; 5] = ["MarkDown1", "MarkDown2", "MarkDown3", "MarkDown4", "MarkDown5"];

/// (Store, Dept, Date, Weekly_Sales, IsHoliday)
pub type Sale = (i64, i64, &'static str, Option<f64>, bool);

pub fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(n, a)| Field::new(*n, a.data_type().clone(), true))
        .collect();
    let arrays = columns.into_iter().map(|(_, a)| a).collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
}

pub fn sales(rows: &[Sale]) -> RecordBatch {
    batch(vec![
        ("Store", Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0)))),
        ("Dept", Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1)))),
        ("Date", Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.2)))),
        ("Weekly_Sales", Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.3)))),
        ("IsHoliday", Arc::new(BooleanArray::from_iter(rows.iter().map(|r| Some(r.4))))),
    ])
}

/// Indicator rows with fixed readings; `markdown` is used for every markdown
/// column.
pub fn indicators(rows: &[(i64, &'static str, Option<f64>, bool)]) -> RecordBatch {
    let mut columns: Vec<(&str, ArrayRef)> = vec![
        ("Store", Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0)))),
        ("Date", Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.1)))),
        ("Temperature", Arc::new(Float64Array::from_iter_values(rows.iter().map(|_| 42.31)))),
        ("Fuel_Price", Arc::new(Float64Array::from_iter_values(rows.iter().map(|_| 2.572)))),
    ];
    for name in MARKDOWNS {
        columns.push((name, Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.2)))));
    }
    columns.extend([
        ("CPI", Arc::new(Float64Array::from_iter_values(rows.iter().map(|_| 211.1))) as ArrayRef),
        ("Unemployment", Arc::new(Float64Array::from_iter_values(rows.iter().map(|_| 8.1)))),
        ("IsHoliday", Arc::new(BooleanArray::from_iter(rows.iter().map(|r| Some(r.3))))),
    ]);
    batch(columns)
}

pub fn stores(rows: &[(i64, &'static str, i64)]) -> RecordBatch {
    batch(vec![
        ("Store", Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0)))),
        ("Type", Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.1)))),
        ("Size", Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2)))),
    ])
}

pub fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_timestamp(false)
        .with_expected_cardinality(2, 2)
}

pub fn register(ctx: &mut MergeContext, tables: &TableNames, sources: [RecordBatch; 3]) {
    let [s, i, st] = sources;
    for (name, batch) in [(&tables.sales, s), (&tables.indicators, i), (&tables.stores, st)] {
        ctx.register_batches(name, batch.schema(), vec![batch]).unwrap();
    }
}

pub async fn run_with_context(
    context: MergeContextConfig,
    config: PipelineConfig,
    sources: [RecordBatch; 3],
) -> PipelineOutcome {
    let mut ctx = MergeContext::with_config(context).unwrap();
    register(&mut ctx, &config.tables, sources);
    Pipeline::new(config).unwrap().run(&mut ctx).await.unwrap()
}

pub async fn run(sources: [RecordBatch; 3]) -> PipelineOutcome {
    run_with_context(MergeContextConfig::default(), config(), sources).await
}

/// Two stores, two departments, two weeks; store 2 ran promotions.
pub fn standard_sources() -> [RecordBatch; 3] {
    [
        sales(&[
            (1, 1, "2010-02-05", Some(24924.5), false),
            (1, 2, "2010-02-05", Some(50605.27), false),
            (2, 1, "2010-02-12", Some(-12.5), true),
            (2, 2, "2010-02-12", Some(13740.12), true),
            (1, 1, "2010-02-12", Some(46039.49), true),
        ]),
        indicators(&[
            (1, "2010-02-05", None, false),
            (1, "2010-02-12", Some(0.0), true),
            (2, "2010-02-12", Some(120.5), true),
        ]),
        stores(&[(1, "A", 151315), (2, "B", 202307)]),
    ]
}

/// Writes the three sources as CSV files into `dir`.
pub fn write_sources(dir: &Path, sales: &str, indicators: &str, stores: &str) -> SourcePaths {
    let paths = SourcePaths {
        sales: dir.join("train.csv"),
        indicators: dir.join("features.csv"),
        stores: dir.join("stores.csv"),
    };
    std::fs::write(&paths.sales, sales).unwrap();
    std::fs::write(&paths.indicators, indicators).unwrap();
    std::fs::write(&paths.stores, stores).unwrap();
    paths
}

pub const SALES_CSV: &str = "\
Store,Dept,Date,Weekly_Sales,IsHoliday
1,1,2010-02-05,24924.5,false
1,2,2010-02-05,50605.27,false
2,1,2010-02-12,-12.5,true
";

pub const INDICATORS_CSV: &str = "\
Store,Date,Temperature,Fuel_Price,MarkDown1,MarkDown2,MarkDown3,MarkDown4,MarkDown5,CPI,Unemployment,IsHoliday
1,2010-02-05,42.31,2.572,,,,,,211.096,8.106,false
2,2010-02-12,38.51,2.548,10.5,2.25,1.0,4.75,3.5,211.242,8.106,true
";

pub const STORES_CSV: &str = "\
Store,Type,Size
1,A,151315
2,B,202307
";
