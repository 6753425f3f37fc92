//! DataFusion context management for pipeline runs.
//!
//! [`MergeContext`] is the single tabular abstraction every stage works
//! against: sources, intermediate join results and the merged table are all
//! named tables inside one DataFusion [`SessionContext`]. Whether execution is
//! spread over one or many partitions is a [`MergeContextConfig`] setting and
//! never changes results.

use crate::prelude::*;
use crate::security::SqlSecurity;
use arrow::array::{Array, Int64Array};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use datafusion::datasource::{MemTable, TableProvider};
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::execution::memory_pool::{FairSpillPool, MemoryPool};
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use datafusion::prelude::CsvReadOptions;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Configuration for creating a [`MergeContext`].
#[derive(Debug, Clone)]
pub struct MergeContextConfig {
    /// Batch size for query execution
    pub batch_size: usize,
    /// Target number of partitions for parallel execution
    pub target_partitions: usize,
    /// Maximum memory for query execution (in bytes)
    pub max_memory: usize,
}

impl Default for MergeContextConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            target_partitions: num_cpus::get(),
            max_memory: 2 * 1024 * 1024 * 1024, // 2GB
        }
    }
}

impl MergeContextConfig {
    /// A configuration that executes every query on a single partition.
    pub fn single_partition() -> Self {
        Self {
            target_partitions: 1,
            ..Default::default()
        }
    }
}

/// A managed DataFusion context for pipeline runs.
///
/// # Examples
///
/// ```rust,no_run
/// use merge_guard::core::MergeContext;
///
/// # async fn example() -> merge_guard::prelude::Result<()> {
/// let mut ctx = MergeContext::new()?;
/// ctx.register_csv("sales", "data/train.csv").await?;
/// assert_eq!(ctx.row_count("sales").await? > 0, true);
/// # Ok(())
/// # }
/// ```
pub struct MergeContext {
    inner: SessionContext,
    tables: BTreeMap<String, Arc<dyn TableProvider>>,
    config: MergeContextConfig,
}

impl MergeContext {
    /// Creates a new context with default configuration.
    #[instrument]
    pub fn new() -> Result<Self> {
        Self::with_config(MergeContextConfig::default())
    }

    /// Creates a new context with custom configuration.
    #[instrument(skip(config))]
    pub fn with_config(config: MergeContextConfig) -> Result<Self> {
        let session_config = SessionConfig::new()
            .with_batch_size(config.batch_size)
            .with_target_partitions(config.target_partitions)
            .with_information_schema(true);

        let memory_pool = Arc::new(FairSpillPool::new(config.max_memory)) as Arc<dyn MemoryPool>;

        let runtime_env = RuntimeEnvBuilder::new()
            .with_memory_pool(memory_pool)
            .with_temp_file_path(std::env::temp_dir())
            .build()
            .map(Arc::new)?;

        let inner = SessionContext::new_with_config_rt(session_config, runtime_env);

        Ok(Self {
            inner,
            tables: BTreeMap::new(),
            config,
        })
    }

    /// Returns a reference to the underlying DataFusion [`SessionContext`].
    pub fn inner(&self) -> &SessionContext {
        &self.inner
    }

    /// Returns the configuration used to create this context.
    pub fn config(&self) -> &MergeContextConfig {
        &self.config
    }

    /// Returns the names of all registered tables in sorted order.
    pub fn registered_tables(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    /// Checks if a table is registered.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Registers a CSV file with a header row as a table, inferring its schema.
    pub async fn register_csv(&mut self, name: &str, path: &str) -> Result<()> {
        self.register_csv_with_nulls(name, path, None).await
    }

    /// Registers a CSV file, reading every field that matches `null_regex` as
    /// null. Without a pattern only empty fields are null.
    #[instrument(skip(self))]
    pub async fn register_csv_with_nulls(
        &mut self,
        name: &str,
        path: &str,
        null_regex: Option<String>,
    ) -> Result<()> {
        SqlSecurity::validate_identifier(name)?;
        if self.has_table(name) {
            self.deregister_table(name)?;
        }
        let options = CsvReadOptions::new()
            .has_header(true)
            .null_regex(null_regex);
        self.inner.register_csv(name, path, options).await?;

        let source = self.inner.table_provider(name).await?;
        self.tables.insert(name.to_string(), source);

        Ok(())
    }

    /// Registers in-memory record batches as a table, replacing any table of
    /// the same name.
    #[instrument(skip(self, schema, batches), fields(batches = batches.len()))]
    pub fn register_batches(
        &mut self,
        name: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<()> {
        SqlSecurity::validate_identifier(name)?;
        let table = MemTable::try_new(schema, vec![batches])?;
        self.register_table_provider(name, Arc::new(table))
    }

    /// Registers a table provider directly and tracks it.
    pub fn register_table_provider(
        &mut self,
        name: &str,
        provider: Arc<dyn TableProvider>,
    ) -> Result<()> {
        if self.has_table(name) || self.inner.table_exist(name)? {
            self.deregister_table(name)?;
        }
        self.inner.register_table(name, provider.clone())?;
        self.tables.insert(name.to_string(), provider);
        debug!(table.name = %name, "Registered table");
        Ok(())
    }

    /// Deregisters a table from the context.
    pub fn deregister_table(&mut self, name: &str) -> Result<()> {
        self.inner.deregister_table(name)?;
        self.tables.remove(name);
        Ok(())
    }

    /// Clears all registered tables.
    pub fn clear_tables(&mut self) -> Result<()> {
        let table_names: Vec<_> = self.tables.keys().cloned().collect();
        for name in table_names {
            self.deregister_table(&name)?;
        }
        Ok(())
    }

    /// Returns the Arrow schema of a registered table.
    pub async fn table_schema(&self, name: &str) -> Result<SchemaRef> {
        let df = self.inner.table(name).await?;
        Ok(Arc::new(df.schema().as_arrow().clone()))
    }

    /// Counts the rows of a registered table.
    pub async fn row_count(&self, name: &str) -> Result<usize> {
        let table = SqlSecurity::escape_identifier(name)?;
        let batches = self
            .inner
            .sql(&format!("SELECT COUNT(*) AS row_count FROM {table}"))
            .await?
            .collect()
            .await?;
        let count = scalar_i64(&batches, 0)?.unwrap_or(0);
        usize::try_from(count)
            .map_err(|_| MergeError::Internal(format!("Negative row count for '{name}'")))
    }

    /// Collects all batches of a registered table.
    pub async fn collect_table(&self, name: &str) -> Result<Vec<RecordBatch>> {
        Ok(self.inner.table(name).await?.collect().await?)
    }
}

/// Ensure proper cleanup when the context is dropped.
impl Drop for MergeContext {
    fn drop(&mut self) {
        if let Err(e) = self.clear_tables() {
            tracing::warn!("Failed to clear tables during MergeContext drop: {}", e);
        }
    }
}

/// Reads an `Int64` value from the first row of a single-row aggregate result.
///
/// Returns `None` when the value is null or the result is empty.
pub(crate) fn scalar_i64(batches: &[RecordBatch], column: usize) -> Result<Option<i64>> {
    let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(None);
    };
    let array = batch
        .column(column)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| {
            MergeError::Internal(format!(
                "Expected Int64 aggregate in column {column}, found {}",
                batch.column(column).data_type()
            ))
        })?;
    if array.is_null(0) {
        Ok(None)
    } else {
        Ok(Some(array.value(0)))
    }
}
