//! Value and null counts.

use std::collections::BTreeMap;

use super::{
    add_count, component_or_default, merge_counts, IntegralComponent, Metric, MetricComponent,
    MetricKind, MetricValue, OperationResult,
};
use crate::error::Result;
use crate::preprocessing::PreprocessedColumn;
use crate::schema::ColumnSchema;
use crate::wire::MetricComponentMessage;

/// Counts every value seen (`n`) and the nulls among them (`null`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountsMetric {
    pub n: IntegralComponent,
    pub null: IntegralComponent,
}

impl Metric for CountsMetric {
    const KIND: MetricKind = MetricKind::Counts;
    const COMPONENT_NAMES: &'static [&'static str] = &["n", "null"];

    fn zero(_schema: &ColumnSchema) -> Result<Self> {
        Ok(Self::default())
    }

    fn columnar_update(&mut self, column: &PreprocessedColumn<'_>) -> Result<OperationResult> {
        let n = add_count(&self.n, column.len(), "counts/n")?;
        let null = add_count(&self.null, column.null_count(), "counts/null")?;
        self.n = n;
        self.null = null;
        Ok(OperationResult::ok(column.len()))
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            n: merge_counts(&self.n, &other.n, "counts/n")?,
            null: merge_counts(&self.null, &other.null, "counts/null")?,
        })
    }

    fn to_components(&self) -> BTreeMap<&'static str, MetricComponentMessage> {
        BTreeMap::from([("n", self.n.to_message()), ("null", self.null.to_message())])
    }

    fn from_components(components: &BTreeMap<&'static str, MetricComponentMessage>) -> Result<Self> {
        Ok(Self {
            n: component_or_default(components, "n")?,
            null: component_or_default(components, "null")?,
        })
    }

    fn summary(&self) -> BTreeMap<String, MetricValue> {
        BTreeMap::from([
            ("n".to_string(), MetricValue::Long(self.n.value())),
            ("null".to_string(), MetricValue::Long(self.null.value())),
        ])
    }
}
