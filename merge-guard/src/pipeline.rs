//! The merge pipeline.
//!
//! [`Pipeline::run`] drives one run through the stage machine:
//!
//! 1. `SCHEMA_VALIDATED`: each source is checked against its contract
//! 2. `JOINED`: keys are normalized, then Sales is left-joined with
//!    Indicators on (Store, Date) and with Stores on Store, reconciling row
//!    counts after each step
//! 3. `QUALITY_CHECKED`: the gate set runs over the merged table
//! 4. `FEATURES_DERIVED`: calendar features are appended and markdowns are
//!    zero-filled
//! 5. `REPORTED`: the output profile is computed
//!
//! A fatal data-quality failure stops the run where it happened and yields
//! [`PipelineOutcome::Failed`] with the partial report. Infrastructure
//! failures are returned as errors.

use crate::core::{
    DistinctCount, MergeContext, MergedTable, PipelineOutcome, PipelineStage, SourceProfile,
    ValidationReport,
};
use crate::config::intermediate::{INDICATORS_KEYED, SALES_INDICATORS, SALES_KEYED, STORES_KEYED};
use crate::gates::GateSet;
use crate::join::{self, KeyNormalization};
use crate::logging::truncate_field;
use crate::policy::MissingValuePolicy;
use crate::prelude::*;
use crate::schema::{columns, ExpectedSchema};
use crate::security::SqlSecurity;
use crate::stats;
use crate::temporal::TemporalFeatureDeriver;
use crate::tracker::{checkpoints, RowCountTracker};
use crate::{log_gate, log_stage};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument};


/// CSV locations of the three sources.
#[derive(Debug, Clone)]
pub struct SourcePaths {
    pub sales: PathBuf,
    pub indicators: PathBuf,
    pub stores: PathBuf,
}

/// State carried from stage to stage.
struct Run {
    report: ValidationReport,
    tracker: RowCountTracker,
}

impl Run {
    fn sync_checkpoints(&mut self) {
        self.report.checkpoints = self.tracker.checkpoints().to_vec();
    }
}

/// A configured merge pipeline.
///
/// # Examples
///
/// ```rust,no_run
/// use merge_guard::core::MergeContext;
/// use merge_guard::pipeline::{Pipeline, SourcePaths};
/// use merge_guard::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let pipeline = Pipeline::new(PipelineConfig::default())?;
/// let mut ctx = MergeContext::new()?;
/// pipeline
///     .register_sources(
///         &mut ctx,
///         &SourcePaths {
///             sales: "data/train.csv".into(),
///             indicators: "data/features.csv".into(),
///             stores: "data/stores.csv".into(),
///         },
///     )
///     .await?;
///
/// let outcome = pipeline.run(&mut ctx).await?;
/// println!("{}", outcome.to_human()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    log: LogConfig,
}

impl Pipeline {
    /// Creates a pipeline, rejecting an invalid configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            log: LogConfig::default(),
        })
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Registers the three source CSV files under the configured table names.
    pub async fn register_sources(&self, ctx: &mut MergeContext, paths: &SourcePaths) -> Result<()> {
        let tables = &self.config.tables;
        for (name, path) in [
            (&tables.sales, &paths.sales),
            (&tables.indicators, &paths.indicators),
            (&tables.stores, &paths.stores),
        ] {
            if !path.is_file() {
                return Err(MergeError::Configuration(format!(
                    "Source '{name}' not found at {}",
                    path.display()
                )));
            }
            ctx.register_csv_with_nulls(name, &path.to_string_lossy(), self.config.null_regex())
                .await
                .with_context(|| format!("Cannot read source '{name}' from {}", path.display()))?;
        }
        Ok(())
    }

    /// Runs the pipeline over the sources registered in `ctx`.
    #[instrument(skip(self, ctx), fields(run = %self.config.name))]
    pub async fn run(&self, ctx: &mut MergeContext) -> Result<PipelineOutcome> {
        let mut report = ValidationReport::new(&self.config.name);
        if self.config.include_timestamp {
            report = report.with_timestamp();
        }
        let mut run = Run {
            report,
            tracker: RowCountTracker::new(),
        };

        self.ingest(ctx, &mut run).await?;
        log_stage!(self.log, stage = %PipelineStage::Ingested, "Sources ingested");

        if let Err(e) = self.validate_schemas(ctx, &mut run).await {
            return self.halt(run, PipelineStage::SchemaValidated, e);
        }
        self.advance(&mut run, PipelineStage::SchemaValidated)?;

        if let Err(e) = self.join(ctx, &mut run).await {
            return self.halt(run, PipelineStage::Joined, e);
        }
        self.advance(&mut run, PipelineStage::Joined)?;

        if let Err(e) = self.check_quality(ctx, &mut run).await {
            return self.halt(run, PipelineStage::QualityChecked, e);
        }
        self.advance(&mut run, PipelineStage::QualityChecked)?;

        let merged = match self.derive_features(ctx, &mut run).await {
            Ok(merged) => merged,
            Err(e) => return self.halt(run, PipelineStage::FeaturesDerived, e),
        };
        self.advance(&mut run, PipelineStage::FeaturesDerived)?;

        if let Err(e) = self.profile_output(ctx, &mut run, &merged).await {
            return self.halt(run, PipelineStage::Reported, e);
        }
        self.advance(&mut run, PipelineStage::Reported)?;
        self.advance(&mut run, PipelineStage::Done)?;

        info!(
            rows = merged.num_rows(),
            warnings = run.report.warning_count(),
            "Merge complete"
        );
        Ok(PipelineOutcome::Completed {
            merged,
            report: run.report,
        })
    }

    fn advance(&self, run: &mut Run, stage: PipelineStage) -> Result<()> {
        run.report.advance(stage)?;
        log_stage!(self.log, stage = %stage, "Stage complete");
        Ok(())
    }

    /// Turns a fatal error into a failed outcome; anything else propagates.
    fn halt(&self, mut run: Run, stage: PipelineStage, error: MergeError) -> Result<PipelineOutcome> {
        if !error.is_fatal() {
            return Err(error);
        }
        error!(
            stage = %stage,
            error.kind = error.kind(),
            error.message = %truncate_field(&error.to_string(), self.log.max_field_length),
            "Run halted"
        );
        run.sync_checkpoints();
        run.report.fail(stage, &error);
        Ok(PipelineOutcome::Failed {
            report: run.report,
            error,
        })
    }

    async fn ingest(&self, ctx: &MergeContext, run: &mut Run) -> Result<()> {
        let tables = &self.config.tables;
        for (table, checkpoint) in [
            (&tables.sales, checkpoints::SALES_INGESTED),
            (&tables.indicators, checkpoints::INDICATORS_INGESTED),
            (&tables.stores, checkpoints::STORES_INGESTED),
        ] {
            let rows = run.tracker.record_table(ctx, checkpoint, table).await?;
            let columns = ctx.table_schema(table).await?.fields().len();
            run.report.sources.push(SourceProfile {
                name: table.clone(),
                rows,
                columns,
            });
        }
        run.sync_checkpoints();
        Ok(())
    }

    async fn validate_schemas(&self, ctx: &MergeContext, run: &mut Run) -> Result<()> {
        let tables = &self.config.tables;
        let mut first_mismatch = None;
        for (contract, table) in [
            (ExpectedSchema::sales(), &tables.sales),
            (ExpectedSchema::indicators(), &tables.indicators),
            (ExpectedSchema::stores(), &tables.stores),
        ] {
            let validation = contract.validate_table(ctx, table).await?;
            run.report.schema_checks.push(validation.to_gate_result());
            if first_mismatch.is_none() && !validation.is_valid() {
                first_mismatch = Some(validation);
            }
        }
        match first_mismatch {
            Some(validation) => validation.into_result(),
            None => Ok(()),
        }
    }

    async fn join(&self, ctx: &mut MergeContext, run: &mut Run) -> Result<()> {
        let tables = &self.config.tables;
        let date_format = self.config.date_format.clone();

        join::normalize_keys(
            ctx,
            &tables.sales,
            SALES_KEYED,
            &KeyNormalization {
                date_format: date_format.clone(),
                has_date: true,
                assign_row_id: true,
            },
        )
        .await?;
        join::normalize_keys(
            ctx,
            &tables.indicators,
            INDICATORS_KEYED,
            &KeyNormalization {
                date_format: date_format.clone(),
                has_date: true,
                assign_row_id: false,
            },
        )
        .await?;
        join::normalize_keys(
            ctx,
            &tables.stores,
            STORES_KEYED,
            &KeyNormalization {
                date_format,
                has_date: false,
                assign_row_id: false,
            },
        )
        .await?;

        let steps = [
            (
                join::indicators_step(SALES_KEYED, INDICATORS_KEYED, SALES_INDICATORS)?,
                checkpoints::SALES_INGESTED,
                checkpoints::JOINED_INDICATORS,
            ),
            (
                join::stores_step(SALES_INDICATORS, STORES_KEYED, &tables.merged)?,
                checkpoints::JOINED_INDICATORS,
                checkpoints::JOINED_STORES,
            ),
        ];

        for (step, expected, actual) in steps {
            let diagnostics = step.execute(ctx).await?;
            run.tracker.record(actual, diagnostics.output_rows);
            run.report.joins.push(diagnostics);
            run.report
                .reconciliation
                .push(run.tracker.reconcile(expected, actual)?);
            run.tracker.assert_preserved(expected, actual)?;
        }

        run.sync_checkpoints();
        Ok(())
    }

    async fn check_quality(&self, ctx: &MergeContext, run: &mut Run) -> Result<()> {
        let gates = GateSet::retail(&self.config);
        let outcome = gates.run(ctx.inner(), &self.config.tables.merged).await?;
        for result in &outcome.results {
            log_gate!(
                self.log,
                gate.name = %result.name,
                gate.status = result.status.label(),
                "Gate evaluated"
            );
        }
        run.report.gates = outcome.results;
        match outcome.halt {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn derive_features(&self, ctx: &mut MergeContext, run: &mut Run) -> Result<MergedTable> {
        let merged = &self.config.tables.merged;
        let sql = format!(
            "SELECT * FROM {} ORDER BY {}",
            SqlSecurity::escape_identifier(merged)?,
            SqlSecurity::escape_identifier(columns::ROW_ID)?
        );
        let df = ctx.inner().sql(&sql).await?;
        let logical_schema: SchemaRef = Arc::new(df.schema().as_arrow().clone());
        let batches = df.collect().await?;
        let schema = batches
            .first()
            .map(|b| b.schema())
            .unwrap_or(logical_schema);
        let batch = concat_batches(&schema, &batches)?;

        let batch = TemporalFeatureDeriver::new(columns::DATE, &self.config.date_format)
            .derive(&batch)?;
        let (batch, fills) = MissingValuePolicy::markdowns().apply(&batch)?;
        let batch = drop_columns(&batch, &columns::HIDDEN)?;

        run.report.markdown_fills = fills;
        ctx.register_batches(merged, batch.schema(), vec![batch.clone()])?;
        Ok(MergedTable::new(batch.schema(), vec![batch]))
    }

    async fn profile_output(
        &self,
        ctx: &MergeContext,
        run: &mut Run,
        output: &MergedTable,
    ) -> Result<()> {
        let merged = &self.config.tables.merged;
        run.tracker
            .record(checkpoints::MERGED_OUTPUT, output.num_rows());
        run.report
            .reconciliation
            .push(run.tracker.reconcile(checkpoints::SALES_INGESTED, checkpoints::MERGED_OUTPUT)?);
        run.sync_checkpoints();
        run.tracker
            .assert_preserved(checkpoints::SALES_INGESTED, checkpoints::MERGED_OUTPUT)?;

        let session = ctx.inner();
        run.report.date_range = stats::date_range(session, merged, columns::DATE).await?;
        for column in [columns::STORE, columns::DEPT] {
            let count = stats::distinct_count(session, merged, column).await?;
            run.report.distinct_counts.push(DistinctCount {
                column: column.to_string(),
                count,
            });
        }
        run.report.statistics = stats::describe(session, merged, &stats::SUMMARY_COLUMNS).await?;
        Ok(())
    }
}

fn drop_columns(batch: &RecordBatch, names: &[&str]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let keep: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !names.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    Ok(batch.project(&keep)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use crate::test_fixtures::{register_sources, IndicatorRow, SalesRow, StoreRow};

    async fn run_with(
        sales: Vec<SalesRow>,
        indicators: Vec<IndicatorRow>,
        stores: Vec<StoreRow>,
    ) -> PipelineOutcome {
        let config = PipelineConfig::default()
            .with_timestamp(false)
            .with_expected_cardinality(2, 2);
        let mut ctx = MergeContext::new().unwrap();
        register_sources(&mut ctx, &config.tables, &sales, &indicators, &stores).unwrap();
        Pipeline::new(config).unwrap().run(&mut ctx).await.unwrap()
    }

    fn standard_inputs() -> (Vec<SalesRow>, Vec<IndicatorRow>, Vec<StoreRow>) {
        (
            vec![
                SalesRow::new(1, 1, "2010-02-05", 24924.5, false),
                SalesRow::new(1, 2, "2010-02-05", 50605.27, false),
                SalesRow::new(2, 1, "2010-02-12", -10.0, true),
            ],
            vec![
                IndicatorRow::new(1, "2010-02-05", false),
                IndicatorRow::new(2, "2010-02-12", true).with_markdowns([Some(10.0); 5]),
            ],
            vec![StoreRow::new(1, "A", 151315), StoreRow::new(2, "B", 202307)],
        )
    }

    #[tokio::test]
    async fn test_happy_path_reaches_done() {
        let (sales, indicators, stores) = standard_inputs();
        let outcome = run_with(sales, indicators, stores).await;

        assert!(outcome.is_success());
        let report = outcome.report();
        assert_eq!(report.stage, PipelineStage::Done);
        assert_eq!(report.stages, PipelineStage::HAPPY_PATH.to_vec());
        assert_eq!(report.status(), RunStatus::Pass);
        assert_eq!(report.checkpoint(checkpoints::MERGED_OUTPUT), Some(3));

        let merged = outcome.merged().unwrap();
        assert_eq!(merged.num_rows(), 3);
        let names = merged.column_names();
        assert!(!names.iter().any(|n| columns::HIDDEN.contains(&n.as_str())));
        assert!(names.iter().any(|n| n == columns::IS_HOLIDAY_INDICATOR));
        assert!(names.ends_with(&[
            columns::YEAR.to_string(),
            columns::MONTH.to_string(),
            columns::WEEK.to_string(),
            columns::DAY_OF_WEEK.to_string(),
        ]));

        let fills: Vec<u64> = report.markdown_fills.iter().map(|f| f.filled).collect();
        assert_eq!(fills, vec![2; 5]);
        assert_eq!(report.gate("negative_values.Weekly_Sales").unwrap().metric, Some(1.0));
    }

    #[tokio::test]
    async fn test_duplicate_sales_key_fails_at_quality_check() {
        let (mut sales, indicators, stores) = standard_inputs();
        sales.push(SalesRow::new(1, 1, "2010-02-05", 1.0, false));
        let outcome = run_with(sales, indicators, stores).await;

        assert!(outcome.is_failure());
        assert!(outcome.merged().is_none());
        assert!(matches!(
            outcome.error(),
            Some(MergeError::DuplicateKey { count: 1, .. })
        ));
        let failure = outcome.report().failure.as_ref().unwrap();
        assert_eq!(failure.stage, PipelineStage::QualityChecked);
        // Every gate still reported.
        assert_eq!(outcome.report().gates.len(), GateSet::retail(&PipelineConfig::default()).len());
    }

    #[tokio::test]
    async fn test_duplicate_indicator_key_fails_at_join() {
        let (sales, mut indicators, stores) = standard_inputs();
        indicators.push(IndicatorRow::new(1, "2010-02-05", false));
        let outcome = run_with(sales, indicators, stores).await;

        assert!(matches!(
            outcome.error(),
            Some(MergeError::RowCountDivergence { expected: 3, actual: 5, .. })
        ));
        let report = outcome.report();
        assert_eq!(report.failure.as_ref().unwrap().stage, PipelineStage::Joined);
        assert_eq!(report.joins[0].duplicate_right_keys, 1);
        assert!(report.reconciliation[0].is_fatal_failure());
    }

    #[tokio::test]
    async fn test_unknown_store_is_kept_and_reported() {
        let (mut sales, indicators, stores) = standard_inputs();
        sales.push(SalesRow::new(99, 1, "2010-02-05", 5.0, false));
        let outcome = run_with(sales, indicators, stores).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.merged().unwrap().num_rows(), 4);
        let gate = outcome.report().gate("unresolved_references.Store").unwrap();
        assert_eq!(gate.metric, Some(1.0));
    }

    #[tokio::test]
    async fn test_unparseable_date_fails_at_join() {
        let (mut sales, indicators, stores) = standard_inputs();
        sales.push(SalesRow::new(1, 3, "05/02/2010", 5.0, false));
        let outcome = run_with(sales, indicators, stores).await;

        match outcome.error() {
            Some(MergeError::DateParse { row, value, .. }) => {
                assert_eq!(*row, 3);
                assert_eq!(value, "05/02/2010");
            }
            other => panic!("expected date parse failure, got {other:?}"),
        }
        assert_eq!(
            outcome.report().failure.as_ref().unwrap().stage,
            PipelineStage::Joined
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig::default().with_expected_cardinality(0, 81);
        assert!(Pipeline::new(config).is_err());
    }
}
