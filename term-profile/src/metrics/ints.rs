//! Integer extrema.

use std::collections::BTreeMap;

use super::{
    component_or_default, MaxIntegralComponent, Metric, MetricComponent, MetricKind, MetricValue,
    MinIntegralComponent, OperationResult,
};
use crate::error::Result;
use crate::preprocessing::PreprocessedColumn;
use crate::schema::ColumnSchema;
use crate::wire::MetricComponentMessage;

/// Running maximum and minimum of the integral lane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntsMetric {
    pub max: MaxIntegralComponent,
    pub min: MinIntegralComponent,
}

impl IntsMetric {
    /// True until the first integer is seen.
    pub fn is_empty(&self) -> bool {
        self.min.value() > self.max.value()
    }
}

impl Metric for IntsMetric {
    const KIND: MetricKind = MetricKind::Ints;
    const COMPONENT_NAMES: &'static [&'static str] = &["max", "min"];

    fn zero(_schema: &ColumnSchema) -> Result<Self> {
        Ok(Self::default())
    }

    fn columnar_update(&mut self, column: &PreprocessedColumn<'_>) -> Result<OperationResult> {
        for &value in column.ints() {
            self.max.update(value);
            self.min.update(value);
        }
        Ok(OperationResult::ok(column.ints().len()))
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            max: self.max.merge(&other.max),
            min: self.min.merge(&other.min),
        })
    }

    fn to_components(&self) -> BTreeMap<&'static str, MetricComponentMessage> {
        BTreeMap::from([("max", self.max.to_message()), ("min", self.min.to_message())])
    }

    fn from_components(components: &BTreeMap<&'static str, MetricComponentMessage>) -> Result<Self> {
        Ok(Self {
            max: component_or_default(components, "max")?,
            min: component_or_default(components, "min")?,
        })
    }

    fn summary(&self) -> BTreeMap<String, MetricValue> {
        if self.is_empty() {
            return BTreeMap::new();
        }
        BTreeMap::from([
            ("max".to_string(), MetricValue::Long(self.max.value())),
            ("min".to_string(), MetricValue::Long(self.min.value())),
        ])
    }
}
