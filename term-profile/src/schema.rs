//! Column types, schemas and metric resolvers.
//!
//! A [`Resolver`] decides which [`MetricKind`]s a column carries. It is consulted once per
//! column, before the first update; the resulting [`ColumnSchema`] is what every metric's
//! zero value is built from.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug};
use std::sync::Arc;

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

use crate::config::MetricConfig;
use crate::error::Result;
use crate::metrics::MetricKind;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    Integral,
    Fractional,
    String,
    Tensor,
    Object,
    /// No declared type; values are classified one by one.
    Unknown,
}

impl ColumnType {
    /// Maps an arrow type onto the declared column type.
    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => ColumnType::Boolean,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnType::Integral,
            DataType::Float16 | DataType::Float32 | DataType::Float64 => ColumnType::Fractional,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => ColumnType::String,
            DataType::List(_) | DataType::LargeList(_) | DataType::FixedSizeList(_, _) => {
                ColumnType::Tensor
            }
            DataType::Null => ColumnType::Unknown,
            _ => ColumnType::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Integral => "integral",
            ColumnType::Fractional => "fractional",
            ColumnType::String => "string",
            ColumnType::Tensor => "tensor",
            ColumnType::Object => "object",
            ColumnType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a column to the metric kinds it carries.
pub trait Resolver: Debug + Send + Sync {
    fn resolve(&self, column_name: &str, dtype: ColumnType) -> BTreeSet<MetricKind>;

    /// Stable description of this resolver's rules. Two resolvers with the same description
    /// must resolve every column the same way.
    fn describe(&self) -> String;
}

/// Counts and type counters for every column; distribution for numbers; extrema for integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardResolver;

impl Resolver for StandardResolver {
    fn resolve(&self, _column_name: &str, dtype: ColumnType) -> BTreeSet<MetricKind> {
        let mut kinds = BTreeSet::from([MetricKind::Counts, MetricKind::Types]);
        match dtype {
            ColumnType::Integral => {
                kinds.insert(MetricKind::Distribution);
                kinds.insert(MetricKind::Ints);
            }
            ColumnType::Fractional => {
                kinds.insert(MetricKind::Distribution);
            }
            _ => {}
        }
        kinds
    }

    fn describe(&self) -> String {
        "standard".to_string()
    }
}

/// Explicit per-column metric sets; unlisted columns go to the fallback resolver.
#[derive(Debug, Clone)]
pub struct DeclarativeResolver {
    columns: BTreeMap<String, BTreeSet<MetricKind>>,
    fallback: Arc<dyn Resolver>,
}

impl DeclarativeResolver {
    /// Creates a resolver that falls back to [`StandardResolver`].
    pub fn new() -> Self {
        Self {
            columns: BTreeMap::new(),
            fallback: Arc::new(StandardResolver),
        }
    }

    /// Pins the metric set of `column`.
    pub fn with_column(
        mut self,
        column: impl Into<String>,
        kinds: impl IntoIterator<Item = MetricKind>,
    ) -> Self {
        self.columns
            .insert(column.into(), kinds.into_iter().collect());
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Resolver>) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Default for DeclarativeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for DeclarativeResolver {
    fn resolve(&self, column_name: &str, dtype: ColumnType) -> BTreeSet<MetricKind> {
        match self.columns.get(column_name) {
            Some(kinds) => kinds.clone(),
            None => self.fallback.resolve(column_name, dtype),
        }
    }

    fn describe(&self) -> String {
        let rules: Vec<String> = self
            .columns
            .iter()
            .map(|(column, kinds)| {
                let kinds: Vec<&str> = kinds.iter().map(MetricKind::as_str).collect();
                format!("{column}={}", kinds.join("+"))
            })
            .collect();
        format!(
            "declarative[{}];fallback={}",
            rules.join(","),
            self.fallback.describe()
        )
    }
}

/// Everything a metric needs to build its zero value.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub dtype: ColumnType,
    pub config: MetricConfig,
    pub metrics: BTreeSet<MetricKind>,
}

impl ColumnSchema {
    pub fn new(dtype: ColumnType, config: MetricConfig, metrics: BTreeSet<MetricKind>) -> Self {
        Self {
            dtype,
            config,
            metrics,
        }
    }

    /// The default configuration and the [`StandardResolver`] metrics for `dtype`.
    pub fn for_type(dtype: ColumnType) -> Self {
        Self::new(
            dtype,
            MetricConfig::default(),
            StandardResolver.resolve("", dtype),
        )
    }
}

/// Declared columns, the resolver and the metric configuration of a dataset.
#[derive(Debug, Clone)]
pub struct DatasetSchema {
    columns: BTreeMap<String, ColumnType>,
    resolver: Arc<dyn Resolver>,
    config: MetricConfig,
}

impl Default for DatasetSchema {
    fn default() -> Self {
        Self {
            columns: BTreeMap::new(),
            resolver: Arc::new(StandardResolver),
            config: MetricConfig::default(),
        }
    }
}

impl DatasetSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name` with type `dtype`.
    pub fn with_column(mut self, name: impl Into<String>, dtype: ColumnType) -> Self {
        self.columns.insert(name.into(), dtype);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Sets the metric configuration, rejecting invalid values.
    pub fn with_config(mut self, config: MetricConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn columns(&self) -> &BTreeMap<String, ColumnType> {
        &self.columns
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    /// Declared type of `name`, if any.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).copied()
    }

    /// Resolves the schema of one column.
    ///
    /// Declared columns use their declared type; otherwise `observed` is used.
    pub fn resolve_column(&self, name: &str, observed: ColumnType) -> ColumnSchema {
        let dtype = self.column_type(name).unwrap_or(observed);
        ColumnSchema::new(
            dtype,
            self.config.clone(),
            self.resolver.resolve(name, dtype),
        )
    }
}
