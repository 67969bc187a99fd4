//! Numeric distribution: quantile sketch plus running mean and variance.
//!
//! Mean and `m2` (the sum of squared deviations from the mean) are combined with the
//! parallel-variance formula, so a batch update is equivalent to merging a one-batch
//! metric into the running one. The number of observations is the sketch count.

use std::collections::BTreeMap;

use super::{
    FractionalComponent, KllComponent, Metric, MetricComponent, MetricKind, MetricValue,
    OperationResult,
};
use crate::config::DEFAULT_KLL_K;
use crate::error::Result;
use crate::preprocessing::PreprocessedColumn;
use crate::schema::ColumnSchema;
use crate::wire::MetricComponentMessage;

/// Quantiles rendered by [`DistributionMetric::summary`].
const SUMMARY_QUANTILES: [(&str, f64); 5] = [
    ("q_10", 0.10),
    ("q_25", 0.25),
    ("median", 0.50),
    ("q_75", 0.75),
    ("q_90", 0.90),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionMetric {
    pub kll: KllComponent,
    pub mean: FractionalComponent,
    pub m2: FractionalComponent,
}

/// Running moments of a sample.
#[derive(Debug, Clone, Copy)]
struct Moments {
    n: f64,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                n: 0.0,
                mean: 0.0,
                m2: 0.0,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let m2 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        Self { n, mean, m2 }
    }

    fn combine(self, other: Moments) -> Moments {
        if other.n == 0.0 {
            return self;
        }
        if self.n == 0.0 {
            return other;
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        Moments {
            n,
            mean: self.mean + delta * other.n / n,
            m2: self.m2 + other.m2 + delta * delta * self.n * other.n / n,
        }
    }
}

impl DistributionMetric {
    /// Number of numeric values seen.
    pub fn n(&self) -> u64 {
        self.kll.sketch().count()
    }

    pub fn mean(&self) -> Option<f64> {
        (self.n() > 0).then_some(self.mean.value())
    }

    /// Sample variance, defined once two values are seen.
    pub fn variance(&self) -> Option<f64> {
        let n = self.n();
        (n > 1).then(|| self.m2.value() / (n - 1) as f64)
    }

    pub fn stddev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    pub fn quantile(&self, phi: f64) -> Result<f64> {
        self.kll.sketch().get_quantile(phi)
    }

    fn moments(&self) -> Moments {
        Moments {
            n: self.n() as f64,
            mean: self.mean.value(),
            m2: self.m2.value(),
        }
    }
}

impl Metric for DistributionMetric {
    const KIND: MetricKind = MetricKind::Distribution;
    const COMPONENT_NAMES: &'static [&'static str] = &["kll", "m2", "mean"];

    fn zero(schema: &ColumnSchema) -> Result<Self> {
        Ok(Self {
            kll: KllComponent::empty(schema.config.kll_k as usize)?,
            mean: FractionalComponent::default(),
            m2: FractionalComponent::default(),
        })
    }

    fn columnar_update(&mut self, column: &PreprocessedColumn<'_>) -> Result<OperationResult> {
        let values: Vec<f64> = column.numbers().collect();
        if values.is_empty() {
            return Ok(OperationResult::default());
        }

        let moments = self.moments().combine(Moments::of(&values));
        for &value in &values {
            self.kll.update(value);
        }
        self.mean = FractionalComponent::new(moments.mean);
        self.m2 = FractionalComponent::new(moments.m2);

        Ok(OperationResult::ok(values.len()))
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        let kll = self.kll.merge(&other.kll)?;
        let moments = self.moments().combine(other.moments());
        Ok(Self {
            kll,
            mean: FractionalComponent::new(moments.mean),
            m2: FractionalComponent::new(moments.m2),
        })
    }

    fn to_components(&self) -> BTreeMap<&'static str, MetricComponentMessage> {
        BTreeMap::from([
            ("kll", self.kll.to_message()),
            ("m2", self.m2.to_message()),
            ("mean", self.mean.to_message()),
        ])
    }

    fn from_components(components: &BTreeMap<&'static str, MetricComponentMessage>) -> Result<Self> {
        let kll = match components.get("kll") {
            Some(msg) => KllComponent::from_message(msg)?,
            None => KllComponent::empty(DEFAULT_KLL_K as usize)?,
        };
        Ok(Self {
            kll,
            mean: super::component_or_default(components, "mean")?,
            m2: super::component_or_default(components, "m2")?,
        })
    }

    fn summary(&self) -> BTreeMap<String, MetricValue> {
        let mut summary = BTreeMap::new();
        summary.insert("n".to_string(), MetricValue::Long(self.n() as i64));

        let sketch = self.kll.sketch();
        if let (Some(min), Some(max), Some(mean)) = (sketch.min(), sketch.max(), self.mean()) {
            summary.insert("min".to_string(), MetricValue::Double(min));
            summary.insert("max".to_string(), MetricValue::Double(max));
            summary.insert("mean".to_string(), MetricValue::Double(mean));
            for (name, phi) in SUMMARY_QUANTILES {
                if let Ok(q) = sketch.get_quantile(phi) {
                    summary.insert(name.to_string(), MetricValue::Double(q));
                }
            }
        }
        if let Some(stddev) = self.stddev() {
            summary.insert("stddev".to_string(), MetricValue::Double(stddev));
        }
        summary
    }
}
