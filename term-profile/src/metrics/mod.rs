//! Mergeable metrics and the components they are built from.
//!
//! A [`Metric`] is a fixed, named bundle of components describing one facet of a column.
//! Live metrics are updated in place from a [`PreprocessedColumn`]; merging is pure and
//! returns a new metric. The metric kinds a column carries are held as [`AnyMetric`], a
//! closed enum, so that merging two different kinds is a reported error rather than a
//! silent drop.
//!
//! ## Component naming
//!
//! On the wire every component is addressed by `"<kind>/<component>"`, e.g.
//! `"counts/n"` or `"distribution/kll"`. [`ComponentPath`] is the parsed form.

pub mod components;
pub mod counts;
pub mod distribution;
pub mod ints;
pub mod kll_sketch;
pub mod type_counters;
pub mod types;


use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};
use crate::preprocessing::PreprocessedColumn;
use crate::schema::ColumnSchema;
use crate::wire::MetricComponentMessage;

pub use components::{
    FractionalComponent, IntegralComponent, KllComponent, MaxIntegralComponent, MetricComponent,
    MinIntegralComponent,
};
pub use counts::CountsMetric;
pub use distribution::DistributionMetric;
pub use ints::IntsMetric;
pub use kll_sketch::KllSketch;
pub use type_counters::TypeCountersMetric;
pub use types::MetricValue;

/// The kinds of metric a column can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Value and null counts.
    Counts,
    /// Per-lane counters.
    Types,
    /// Quantile sketch plus running mean and variance.
    Distribution,
    /// Integer extrema.
    Ints,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Counts,
        MetricKind::Types,
        MetricKind::Distribution,
        MetricKind::Ints,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counts => "counts",
            MetricKind::Types => "types",
            MetricKind::Distribution => "distribution",
            MetricKind::Ints => "ints",
        }
    }

    /// The fixed component names of this kind.
    pub fn component_names(&self) -> &'static [&'static str] {
        match self {
            MetricKind::Counts => CountsMetric::COMPONENT_NAMES,
            MetricKind::Types => TypeCountersMetric::COMPONENT_NAMES,
            MetricKind::Distribution => DistributionMetric::COMPONENT_NAMES,
            MetricKind::Ints => IntsMetric::COMPONENT_NAMES,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProfileError::deserialization(format!("unknown metric kind '{s}'")))
    }
}

/// A parsed `"<kind>/<component>"` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentPath {
    pub kind: MetricKind,
    pub component: &'static str,
}

impl ComponentPath {
    /// Builds a path, checking that `component` belongs to `kind`.
    pub fn new(kind: MetricKind, component: &str) -> Result<Self> {
        let component = kind
            .component_names()
            .iter()
            .copied()
            .find(|name| *name == component)
            .ok_or_else(|| {
                ProfileError::deserialization(format!(
                    "unknown component '{component}' for metric '{kind}'"
                ))
            })?;
        Ok(Self { kind, component })
    }
}

impl fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.component)
    }
}

impl FromStr for ComponentPath {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, component) = s.split_once('/').ok_or_else(|| {
            ProfileError::deserialization(format!(
                "component name '{s}' is not of the form <metric>/<component>"
            ))
        })?;
        ComponentPath::new(kind.parse()?, component)
    }
}

/// Outcome of one columnar update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationResult {
    /// Values this metric accepted.
    pub successes: usize,
    /// Values this metric could not represent.
    pub failures: usize,
}

impl OperationResult {
    pub fn ok(successes: usize) -> Self {
        Self {
            successes,
            failures: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failures == 0
    }
}

impl std::ops::Add for OperationResult {
    type Output = OperationResult;

    fn add(self, rhs: Self) -> Self::Output {
        OperationResult {
            successes: self.successes + rhs.successes,
            failures: self.failures + rhs.failures,
        }
    }
}

/// A named bundle of mergeable components.
pub trait Metric: Clone + Debug + PartialEq + Send + Sync + Sized {
    const KIND: MetricKind;

    /// Component names, in wire order.
    const COMPONENT_NAMES: &'static [&'static str];

    /// The merge identity for a column with this schema.
    fn zero(schema: &ColumnSchema) -> Result<Self>;

    /// Folds one classified batch into this live metric.
    fn columnar_update(&mut self, column: &PreprocessedColumn<'_>) -> Result<OperationResult>;

    /// Merges two metrics of this kind into a new one.
    fn merge(&self, other: &Self) -> Result<Self>;

    /// Encodes every component, keyed by component name.
    fn to_components(&self) -> BTreeMap<&'static str, MetricComponentMessage>;

    /// Decodes a metric from its components. Missing components take their zero value.
    fn from_components(components: &BTreeMap<&'static str, MetricComponentMessage>) -> Result<Self>;

    /// Renders the metric, keyed by component or derived statistic name.
    fn summary(&self) -> BTreeMap<String, MetricValue>;
}

/// Decodes the component called `name`, or returns its zero value when absent.
pub(crate) fn component_or_default<C>(
    components: &BTreeMap<&'static str, MetricComponentMessage>,
    name: &str,
) -> Result<C>
where
    C: MetricComponent + Default,
{
    match components.get(name) {
        Some(msg) => C::from_message(msg),
        None => Ok(C::default()),
    }
}

/// Checked addition of a count to a counter, reporting the component on overflow.
pub(crate) fn add_count(
    counter: &IntegralComponent,
    delta: usize,
    path: &str,
) -> Result<IntegralComponent> {
    counter
        .checked_add(delta)
        .ok_or_else(|| ProfileError::overflow(path))
}

/// Checked merge of two counters, reporting the component on overflow.
pub(crate) fn merge_counts(
    left: &IntegralComponent,
    right: &IntegralComponent,
    path: &str,
) -> Result<IntegralComponent> {
    left.checked_merge(right)
        .ok_or_else(|| ProfileError::overflow(path))
}

/// One metric of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyMetric {
    Counts(CountsMetric),
    Types(TypeCountersMetric),
    Distribution(DistributionMetric),
    Ints(IntsMetric),
}

macro_rules! dispatch {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            AnyMetric::Counts($m) => $body,
            AnyMetric::Types($m) => $body,
            AnyMetric::Distribution($m) => $body,
            AnyMetric::Ints($m) => $body,
        }
    };
}

impl AnyMetric {
    /// The zero value of `kind` for a column with this schema.
    pub fn zero(kind: MetricKind, schema: &ColumnSchema) -> Result<Self> {
        Ok(match kind {
            MetricKind::Counts => AnyMetric::Counts(CountsMetric::zero(schema)?),
            MetricKind::Types => AnyMetric::Types(TypeCountersMetric::zero(schema)?),
            MetricKind::Distribution => {
                AnyMetric::Distribution(DistributionMetric::zero(schema)?)
            }
            MetricKind::Ints => AnyMetric::Ints(IntsMetric::zero(schema)?),
        })
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            AnyMetric::Counts(_) => MetricKind::Counts,
            AnyMetric::Types(_) => MetricKind::Types,
            AnyMetric::Distribution(_) => MetricKind::Distribution,
            AnyMetric::Ints(_) => MetricKind::Ints,
        }
    }

    pub fn columnar_update(&mut self, column: &PreprocessedColumn<'_>) -> Result<OperationResult> {
        dispatch!(self, m => m.columnar_update(column))
    }

    /// Merges two metrics of the same kind. Different kinds are a [`ProfileError::MergeMismatch`].
    pub fn merge(&self, other: &AnyMetric) -> Result<AnyMetric> {
        match (self, other) {
            (AnyMetric::Counts(a), AnyMetric::Counts(b)) => a.merge(b).map(AnyMetric::Counts),
            (AnyMetric::Types(a), AnyMetric::Types(b)) => a.merge(b).map(AnyMetric::Types),
            (AnyMetric::Distribution(a), AnyMetric::Distribution(b)) => {
                a.merge(b).map(AnyMetric::Distribution)
            }
            (AnyMetric::Ints(a), AnyMetric::Ints(b)) => a.merge(b).map(AnyMetric::Ints),
            (a, b) => Err(ProfileError::merge_mismatch(
                a.kind().as_str(),
                b.kind().as_str(),
            )),
        }
    }

    /// Components keyed by their full path.
    pub fn to_components(&self) -> BTreeMap<ComponentPath, MetricComponentMessage> {
        let kind = self.kind();
        let components = dispatch!(self, m => m.to_components());
        components
            .into_iter()
            .map(|(component, msg)| (ComponentPath { kind, component }, msg))
            .collect()
    }

    /// Paths of every component, without encoding any value.
    pub fn component_paths(&self) -> impl Iterator<Item = ComponentPath> {
        let kind = self.kind();
        kind.component_names()
            .iter()
            .map(move |component| ComponentPath {
                kind,
                component: *component,
            })
    }

    /// Decodes a metric of `kind` from components already grouped by kind.
    pub fn from_components(
        kind: MetricKind,
        components: &BTreeMap<&'static str, MetricComponentMessage>,
    ) -> Result<Self> {
        Ok(match kind {
            MetricKind::Counts => AnyMetric::Counts(CountsMetric::from_components(components)?),
            MetricKind::Types => {
                AnyMetric::Types(TypeCountersMetric::from_components(components)?)
            }
            MetricKind::Distribution => {
                AnyMetric::Distribution(DistributionMetric::from_components(components)?)
            }
            MetricKind::Ints => AnyMetric::Ints(IntsMetric::from_components(components)?),
        })
    }

    pub fn summary(&self) -> BTreeMap<String, MetricValue> {
        dispatch!(self, m => m.summary())
    }

    pub fn as_counts(&self) -> Option<&CountsMetric> {
        match self {
            AnyMetric::Counts(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_types(&self) -> Option<&TypeCountersMetric> {
        match self {
            AnyMetric::Types(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_distribution(&self) -> Option<&DistributionMetric> {
        match self {
            AnyMetric::Distribution(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&IntsMetric> {
        match self {
            AnyMetric::Ints(m) => Some(m),
            _ => None,
        }
    }
}
