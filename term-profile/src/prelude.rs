//! Prelude for commonly used types and traits in term-profile.

pub use crate::cache::ProfileCache;
pub use crate::config::MetricConfig;
pub use crate::error::{ErrorContext, ProfileError, Result};
pub use crate::logging::LogConfig;
pub use crate::metrics::{AnyMetric, Metric, MetricKind, MetricValue, OperationResult};
pub use crate::preprocessing::{PreprocessedColumn, Value};
pub use crate::profile::{ColumnProfile, DatasetProfile};
pub use crate::schema::{
    ColumnSchema, ColumnType, DatasetSchema, DeclarativeResolver, Resolver, StandardResolver,
};
pub use crate::session::ProfileSession;
pub use crate::view::{ColumnProfileView, DatasetProfileReader, DatasetProfileView};
pub use crate::writer::{InMemoryWriter, LocalWriter, ProfileWriter, WriteResponse};
