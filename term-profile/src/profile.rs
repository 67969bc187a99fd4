//! Live, single-writer profile accumulators.
//!
//! [`ColumnProfile`] and [`DatasetProfile`] are updated in place through `&mut self`; the
//! borrow checker enforces the single-writer rule. Fan-in across workers goes through
//! [`view`](DatasetProfile::view) snapshots and [`DatasetProfileView::merge`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{ErrorContext, Result};
use crate::logging::{truncate_field, MAX_LOGGED_NAME_LENGTH};
use crate::metrics::{AnyMetric, MetricKind, OperationResult};
use crate::preprocessing::{PreprocessedColumn, Value};
use crate::schema::{ColumnSchema, ColumnType, DatasetSchema};
use crate::view::{ColumnProfileView, DatasetProfileView};

/// Live metrics of one column.
#[derive(Debug, Clone)]
pub struct ColumnProfile {
    name: String,
    schema: ColumnSchema,
    metrics: BTreeMap<MetricKind, AnyMetric>,
    successes: usize,
    failures: usize,
}

impl ColumnProfile {
    /// Creates the zero value of every metric the schema lists.
    pub fn new(name: impl Into<String>, schema: ColumnSchema) -> Result<Self> {
        let metrics = schema
            .metrics
            .iter()
            .map(|kind| Ok((*kind, AnyMetric::zero(*kind, &schema)?)))
            .collect::<Result<_>>()?;
        Ok(Self {
            name: name.into(),
            schema,
            metrics,
            successes: 0,
            failures: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Totals accumulated over every update of every metric.
    pub fn operation_totals(&self) -> OperationResult {
        OperationResult {
            successes: self.successes,
            failures: self.failures,
        }
    }

    /// Feeds one classified batch to every metric.
    ///
    /// The returned result sums the per-metric results. Updates are staged: when any
    /// metric fails, none of them keep the batch.
    pub fn track_column(&mut self, column: &PreprocessedColumn<'_>) -> Result<OperationResult> {
        let mut staged = self.metrics.clone();
        let mut total = OperationResult::default();
        for metric in staged.values_mut() {
            let result = metric
                .columnar_update(column)
                .with_context(|| format!("column '{}'", self.name))?;
            total = total + result;
        }
        self.metrics = staged;
        self.successes += total.successes;
        self.failures += total.failures;
        Ok(total)
    }

    pub fn track_values(&mut self, values: &[Value]) -> Result<OperationResult> {
        let column = PreprocessedColumn::apply_with(values, &self.schema.config);
        self.track_column(&column)
    }

    pub fn track_array(&mut self, array: &dyn Array) -> Result<OperationResult> {
        let column = PreprocessedColumn::from_arrow_with(array, &self.schema.config);
        self.track_column(&column)
    }

    /// Snapshots the current state.
    pub fn view(&self) -> ColumnProfileView {
        ColumnProfileView::new(self.metrics.values().cloned())
    }
}

/// Live profile of a dataset.
#[derive(Debug, Clone)]
pub struct DatasetProfile {
    schema: DatasetSchema,
    columns: BTreeMap<String, ColumnProfile>,
    dataset_timestamp: DateTime<Utc>,
    creation_timestamp: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
}

impl DatasetProfile {
    /// Creates an empty profile. Declared columns are created up front; both timestamps
    /// start at the current time.
    pub fn new(schema: DatasetSchema) -> Result<Self> {
        let now = Utc::now();
        let mut profile = Self {
            schema,
            columns: BTreeMap::new(),
            dataset_timestamp: now,
            creation_timestamp: now,
            metadata: BTreeMap::new(),
        };
        let declared: Vec<(String, ColumnType)> = profile
            .schema
            .columns()
            .iter()
            .map(|(name, dtype)| (name.clone(), *dtype))
            .collect();
        for (name, dtype) in declared {
            profile.column_mut(&name, dtype)?;
        }
        Ok(profile)
    }

    pub fn with_dataset_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.dataset_timestamp = timestamp;
        self
    }

    pub fn set_dataset_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.dataset_timestamp = timestamp;
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.get(name)
    }

    /// True until a column has been created.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the live column, resolving it on first sight.
    fn column_mut(&mut self, name: &str, observed: ColumnType) -> Result<&mut ColumnProfile> {
        match self.columns.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let schema = self.schema.resolve_column(name, observed);
                debug!(
                    column = %truncate_field(name, MAX_LOGGED_NAME_LENGTH),
                    dtype = %schema.dtype,
                    metrics = schema.metrics.len(),
                    "Resolved new column"
                );
                Ok(entry.insert(ColumnProfile::new(name, schema)?))
            }
        }
    }

    /// Tracks one batch of values for one column.
    pub fn track(&mut self, column: &str, values: &[Value]) -> Result<OperationResult> {
        self.column_mut(column, ColumnType::Unknown)?
            .track_values(values)
    }

    /// Tracks several columns at once.
    pub fn track_columns<'a, I>(&mut self, columns: I) -> Result<OperationResult>
    where
        I: IntoIterator<Item = (&'a str, &'a [Value])>,
    {
        let mut total = OperationResult::default();
        for (name, values) in columns {
            total = total + self.track(name, values)?;
        }
        Ok(total)
    }

    /// Tracks a single row: one value per column.
    pub fn track_row<K, V>(
        &mut self,
        row: impl IntoIterator<Item = (K, V)>,
    ) -> Result<OperationResult>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut total = OperationResult::default();
        for (name, value) in row {
            let value = value.into();
            total = total + self.track(name.as_ref(), std::slice::from_ref(&value))?;
        }
        Ok(total)
    }

    /// Tracks every column of an arrow batch. Undeclared columns take their arrow type.
    pub fn track_record_batch(&mut self, batch: &RecordBatch) -> Result<OperationResult> {
        let schema = batch.schema();
        let mut total = OperationResult::default();
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let observed = ColumnType::from_arrow(field.data_type());
            total = total
                + self
                    .column_mut(field.name(), observed)?
                    .track_array(array.as_ref())?;
        }
        Ok(total)
    }

    /// Snapshots the current state.
    pub fn view(&self) -> DatasetProfileView {
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| (name.clone(), column.view()))
            .collect();
        let mut view =
            DatasetProfileView::new(columns, self.dataset_timestamp, self.creation_timestamp);
        for (key, value) in &self.metadata {
            view = view.with_metadata(key.clone(), value.clone());
        }
        view
    }
}
