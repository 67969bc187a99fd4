//! Per-lane value counters.

use std::collections::BTreeMap;

use super::{
    add_count, component_or_default, merge_counts, IntegralComponent, Metric, MetricComponent,
    MetricKind, MetricValue, OperationResult,
};
use crate::error::Result;
use crate::preprocessing::PreprocessedColumn;
use crate::schema::ColumnSchema;
use crate::wire::MetricComponentMessage;

/// How many values landed in each typed lane.
///
/// Nulls are not counted here; see [`CountsMetric`](super::CountsMetric).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeCountersMetric {
    pub boolean: IntegralComponent,
    pub integral: IntegralComponent,
    pub fractional: IntegralComponent,
    pub string: IntegralComponent,
    pub object: IntegralComponent,
    pub tensor: IntegralComponent,
}

impl TypeCountersMetric {
    fn fields(&self) -> [(&'static str, &IntegralComponent); 6] {
        [
            ("boolean", &self.boolean),
            ("integral", &self.integral),
            ("fractional", &self.fractional),
            ("string", &self.string),
            ("object", &self.object),
            ("tensor", &self.tensor),
        ]
    }
}

impl Metric for TypeCountersMetric {
    const KIND: MetricKind = MetricKind::Types;
    const COMPONENT_NAMES: &'static [&'static str] = &[
        "boolean",
        "integral",
        "fractional",
        "string",
        "object",
        "tensor",
    ];

    fn zero(_schema: &ColumnSchema) -> Result<Self> {
        Ok(Self::default())
    }

    fn columnar_update(&mut self, column: &PreprocessedColumn<'_>) -> Result<OperationResult> {
        // Build the whole update before assigning so an overflow leaves the metric untouched.
        let updated = Self {
            boolean: add_count(&self.boolean, column.bools().len(), "types/boolean")?,
            integral: add_count(&self.integral, column.ints().len(), "types/integral")?,
            fractional: add_count(&self.fractional, column.floats().len(), "types/fractional")?,
            string: add_count(&self.string, column.strings().len(), "types/string")?,
            object: add_count(&self.object, column.object_count(), "types/object")?,
            tensor: add_count(&self.tensor, column.tensors().len(), "types/tensor")?,
        };
        *self = updated;

        Ok(OperationResult {
            successes: column.classified_count(),
            failures: column.failures(),
        })
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            boolean: merge_counts(&self.boolean, &other.boolean, "types/boolean")?,
            integral: merge_counts(&self.integral, &other.integral, "types/integral")?,
            fractional: merge_counts(&self.fractional, &other.fractional, "types/fractional")?,
            string: merge_counts(&self.string, &other.string, "types/string")?,
            object: merge_counts(&self.object, &other.object, "types/object")?,
            tensor: merge_counts(&self.tensor, &other.tensor, "types/tensor")?,
        })
    }

    fn to_components(&self) -> BTreeMap<&'static str, MetricComponentMessage> {
        self.fields()
            .into_iter()
            .map(|(name, component)| (name, component.to_message()))
            .collect()
    }

    fn from_components(components: &BTreeMap<&'static str, MetricComponentMessage>) -> Result<Self> {
        Ok(Self {
            boolean: component_or_default(components, "boolean")?,
            integral: component_or_default(components, "integral")?,
            fractional: component_or_default(components, "fractional")?,
            string: component_or_default(components, "string")?,
            object: component_or_default(components, "object")?,
            tensor: component_or_default(components, "tensor")?,
        })
    }

    fn summary(&self) -> BTreeMap<String, MetricValue> {
        self.fields()
            .into_iter()
            .map(|(name, component)| (name.to_string(), MetricValue::Long(component.value())))
            .collect()
    }
}
