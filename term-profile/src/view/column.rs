//! Immutable per-column profile.

use std::collections::{BTreeMap, BTreeSet};

use prost::Message;

use crate::error::{ProfileError, Result};
use crate::metrics::{
    AnyMetric, ComponentPath, CountsMetric, DistributionMetric, IntsMetric, MetricKind,
    MetricValue, TypeCountersMetric,
};
use crate::wire::{ColumnMessage, MetricComponentMessage};

/// The metrics of one column, frozen.
///
/// A view is produced by snapshotting a live [`ColumnProfile`](crate::profile::ColumnProfile),
/// by merging, or by deserialization. It has no mutating methods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnProfileView {
    metrics: BTreeMap<MetricKind, AnyMetric>,
}

impl ColumnProfileView {
    /// Builds a view from metrics. A later metric of the same kind replaces an earlier one.
    pub fn new(metrics: impl IntoIterator<Item = AnyMetric>) -> Self {
        Self {
            metrics: metrics.into_iter().map(|m| (m.kind(), m)).collect(),
        }
    }

    pub fn get_metric(&self, kind: MetricKind) -> Option<&AnyMetric> {
        self.metrics.get(&kind)
    }

    pub fn metric_kinds(&self) -> impl Iterator<Item = MetricKind> + '_ {
        self.metrics.keys().copied()
    }

    pub fn metrics(&self) -> impl Iterator<Item = &AnyMetric> {
        self.metrics.values()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn counts(&self) -> Option<&CountsMetric> {
        self.get_metric(MetricKind::Counts).and_then(AnyMetric::as_counts)
    }

    pub fn types(&self) -> Option<&TypeCountersMetric> {
        self.get_metric(MetricKind::Types).and_then(AnyMetric::as_types)
    }

    pub fn distribution(&self) -> Option<&DistributionMetric> {
        self.get_metric(MetricKind::Distribution)
            .and_then(AnyMetric::as_distribution)
    }

    pub fn ints(&self) -> Option<&IntsMetric> {
        self.get_metric(MetricKind::Ints).and_then(AnyMetric::as_ints)
    }

    /// Merges two views of the same column.
    ///
    /// Metric kinds present on one side only pass through unchanged.
    pub fn merge(&self, other: &ColumnProfileView) -> Result<ColumnProfileView> {
        let mut metrics = self.metrics.clone();
        for (kind, theirs) in &other.metrics {
            let merged = match metrics.get(kind) {
                Some(ours) => ours.merge(theirs)?,
                None => theirs.clone(),
            };
            metrics.insert(*kind, merged);
        }
        Ok(ColumnProfileView { metrics })
    }

    /// Every component path this column carries, without encoding values.
    pub fn get_metric_component_paths(&self) -> BTreeSet<ComponentPath> {
        self.metrics
            .values()
            .flat_map(AnyMetric::component_paths)
            .collect()
    }

    /// All components keyed by their parsed path.
    pub fn to_components(&self) -> BTreeMap<ComponentPath, MetricComponentMessage> {
        self.metrics
            .values()
            .flat_map(AnyMetric::to_components)
            .collect()
    }

    /// Rebuilds a view from components grouped by metric kind.
    pub fn from_components(
        components: impl IntoIterator<Item = (ComponentPath, MetricComponentMessage)>,
    ) -> Result<Self> {
        let mut grouped: BTreeMap<MetricKind, BTreeMap<&'static str, MetricComponentMessage>> =
            BTreeMap::new();
        for (path, msg) in components {
            grouped
                .entry(path.kind)
                .or_default()
                .insert(path.component, msg);
        }

        let metrics = grouped
            .into_iter()
            .map(|(kind, components)| AnyMetric::from_components(kind, &components))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(metrics))
    }

    /// Flattens all metrics into `"<kind>/<component>"` names.
    pub fn to_wire(&self) -> BTreeMap<String, MetricComponentMessage> {
        self.to_components()
            .into_iter()
            .map(|(path, msg)| (path.to_string(), msg))
            .collect()
    }

    /// Inverse of [`to_wire`](Self::to_wire). Every name must parse into a known
    /// `<kind>/<component>` pair.
    pub fn from_wire(components: BTreeMap<String, MetricComponentMessage>) -> Result<Self> {
        let parsed = components
            .into_iter()
            .map(|(name, msg)| Ok((name.parse::<ComponentPath>()?, msg)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_components(parsed)
    }

    pub fn to_message(&self) -> ColumnMessage {
        ColumnMessage {
            metric_components: self.to_wire(),
        }
    }

    pub fn from_message(msg: ColumnMessage) -> Result<Self> {
        Self::from_wire(msg.metric_components)
    }

    /// Encodes the column on its own, outside of a dataset file.
    pub fn serialize(&self) -> Vec<u8> {
        self.to_message().encode_to_vec()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let msg = ColumnMessage::decode(bytes).map_err(|e| {
            ProfileError::deserialization(format!("invalid column message: {e}"))
        })?;
        Self::from_message(msg)
    }

    /// Summary of every metric, keyed `"<kind>/<name>"`.
    pub fn summary(&self) -> BTreeMap<String, MetricValue> {
        self.metrics
            .values()
            .flat_map(|metric| {
                let kind = metric.kind();
                metric
                    .summary()
                    .into_iter()
                    .map(move |(name, value)| (format!("{kind}/{name}"), value))
            })
            .collect()
    }
}
