//! # merge-guard - Validation-Gated Retail Sales Merge
//!
//! merge-guard joins three retail sources into one analysis-ready table and
//! refuses to hand that table over unless every fatal quality check holds.
//! It runs on DataFusion, so every stage is a query over named Arrow tables.
//!
//! ## Overview
//!
//! The sources are:
//!
//! - **Sales**: weekly sales per (Store, Dept, Date)
//! - **Indicators**: weekly economic indicators and markdowns per (Store, Date)
//! - **Stores**: static metadata per Store
//!
//! A run validates each source's schema, left-joins Sales with Indicators and
//! then with Stores while checking that no row is gained or lost, evaluates a
//! set of quality gates, appends calendar features, zero-fills markdowns and
//! returns the merged table together with a [`core::ValidationReport`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use merge_guard::prelude::*;
//! use merge_guard::pipeline::{Pipeline, SourcePaths};
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let mut ctx = MergeContext::new()?;
//! pipeline
//!     .register_sources(
//!         &mut ctx,
//!         &SourcePaths {
//!             sales: "train.csv".into(),
//!             indicators: "features.csv".into(),
//!             stores: "stores.csv".into(),
//!         },
//!     )
//!     .await?;
//!
//! match pipeline.run(&mut ctx).await? {
//!     PipelineOutcome::Completed { merged, report } => {
//!         println!("{} rows merged, {} warnings", merged.num_rows(), report.warning_count());
//!     }
//!     PipelineOutcome::Failed { report, error } => {
//!         eprintln!("halted at {}: {error}", report.stage);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Gate Severity
//!
//! Gates are either fatal or informational. A failing fatal gate (null
//! `Weekly_Sales`, duplicate natural keys) halts the run and no merged table
//! is produced. Informational gates (cardinality drift, negative sales,
//! unresolved store references, store type domain, holiday flag agreement)
//! only add findings to the report.
//!
//! ## Logging
//!
//! The pipeline is instrumented with `tracing`. Install a subscriber with
//! [`logging::setup::init_logging`] or your own.

pub mod config;
pub mod core;
pub mod error;
pub mod formatters;
pub mod gates;
pub mod join;
pub mod logging;
pub mod pipeline;
pub mod policy;
pub mod prelude;
pub mod schema;
pub mod security;
pub mod stats;
pub mod temporal;
pub mod tracker;

#[cfg(test)]
pub mod test_helpers;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
