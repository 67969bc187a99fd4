//! Thin `log`/`close` orchestration over the profile cache and writers.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use tracing::{instrument, warn};

use crate::cache::ProfileCache;
use crate::error::{ProfileError, Result};
use crate::logging::{truncate_field, LogConfig};
use crate::metrics::OperationResult;
use crate::preprocessing::Value;
use crate::schema::DatasetSchema;
use crate::view::DatasetProfileView;
use crate::writer::{ProfileWriter, WriteResponse};
use crate::{log_column, log_io_op};

/// A profiling session.
///
/// Batches are routed to a live profile chosen by schema fingerprint. `close` snapshots
/// every live profile and hands it to each registered writer; afterwards the session
/// rejects further input.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use term_profile::prelude::*;
///
/// # async fn run() -> term_profile::Result<()> {
/// let mut session = ProfileSession::new(DatasetSchema::new())
///     .with_writer(Arc::new(LocalWriter::new("/tmp/profiles")?));
/// session.log_values([("age", vec![Value::Int(31), Value::Int(45)])])?;
/// let responses = session.close().await?;
/// assert!(responses.iter().all(|r| r.success));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ProfileSession {
    schema: DatasetSchema,
    cache: ProfileCache,
    writers: Vec<Arc<dyn ProfileWriter>>,
    log_config: LogConfig,
    closed: bool,
}

impl ProfileSession {
    pub fn new(schema: DatasetSchema) -> Self {
        Self::with_cache(schema, ProfileCache::new())
    }

    /// Creates a session that accumulates into an existing cache.
    pub fn with_cache(schema: DatasetSchema, cache: ProfileCache) -> Self {
        Self {
            schema,
            cache,
            writers: Vec::new(),
            log_config: LogConfig::default(),
            closed: false,
        }
    }

    pub fn with_writer(mut self, writer: Arc<dyn ProfileWriter>) -> Self {
        self.writers.push(writer);
        self
    }

    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ProfileError::ClosedSession);
        }
        Ok(())
    }

    /// Tracks an arrow batch.
    pub fn log(&mut self, batch: &RecordBatch) -> Result<OperationResult> {
        self.ensure_open()?;
        if batch.num_columns() == 0 {
            return Err(ProfileError::EmptyBatch);
        }

        log_column!(
            self.log_config,
            columns = batch.num_columns(),
            rows = batch.num_rows(),
            "Logging record batch"
        );
        self.cache
            .get_or_create(&self.schema)?
            .track_record_batch(batch)
    }

    /// Tracks named columns of values.
    pub fn log_values<K, I>(&mut self, columns: I) -> Result<OperationResult>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Vec<Value>)>,
    {
        self.ensure_open()?;
        let columns: Vec<(K, Vec<Value>)> = columns.into_iter().collect();
        if columns.is_empty() {
            return Err(ProfileError::EmptyBatch);
        }

        let profile = self.cache.get_or_create(&self.schema)?;
        let mut total = OperationResult::default();
        for (name, values) in &columns {
            log_column!(
                self.log_config,
                column = %truncate_field(name.as_ref(), self.log_config.max_field_length),
                values = values.len(),
                "Logging column"
            );
            total = total + profile.track(name.as_ref(), values)?;
        }
        Ok(total)
    }

    /// Snapshot of the live profile for this session's schema, if anything was logged.
    pub fn view(&self) -> Result<Option<DatasetProfileView>> {
        Ok(self.cache.get(&self.schema)?.map(|profile| profile.view()))
    }

    /// Closes the session and writes every live profile to every writer.
    ///
    /// Every writer is offered every profile. A writer that fails, or returns an error,
    /// shows up as an unsuccessful response and does not stop the remaining writes.
    #[instrument(skip(self), fields(writers = self.writers.len()))]
    pub async fn close(&mut self) -> Result<Vec<WriteResponse>> {
        self.ensure_open()?;
        self.closed = true;

        let views: Vec<DatasetProfileView> = self
            .cache
            .drain()
            .into_iter()
            .map(|profile| profile.view())
            .collect();

        let mut responses = Vec::with_capacity(views.len() * self.writers.len());
        for view in &views {
            for writer in &self.writers {
                let response = match writer.write(view).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(writer = writer.name(), error = %e, "Writer rejected profile");
                        WriteResponse::failed(format!("{}: {e}", writer.name()))
                    }
                };
                log_io_op!(
                    self.log_config,
                    writer = writer.name(),
                    success = response.success,
                    message = %response.message,
                    "Profile handed to writer"
                );
                responses.push(response);
            }
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::InMemoryWriter;
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};

    #[tokio::test]
    async fn test_log_then_close_writes_once_per_writer() {
        let first = Arc::new(InMemoryWriter::new());
        let second = Arc::new(InMemoryWriter::new());
        let mut session = ProfileSession::new(DatasetSchema::new())
            .with_writer(first.clone())
            .with_writer(second.clone())
            .with_log_config(LogConfig::verbose());

        session
            .log_values([("a", vec![Value::Int(1), Value::Null])])
            .unwrap();
        session.log_values([("a", vec![Value::Int(5)])]).unwrap();

        let responses = session.close().await.unwrap();
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.success));

        let stored = first.profiles().await.unwrap();
        assert_eq!(stored.len(), 1);
        let a = stored[0].get_column("a").unwrap();
        assert_eq!(a.counts().unwrap().n.value(), 3);
        assert_eq!(second.len().await, 1);
    }

    #[derive(Debug)]
    struct RejectingWriter;

    #[async_trait::async_trait]
    impl ProfileWriter for RejectingWriter {
        async fn write(&self, _profile: &DatasetProfileView) -> Result<WriteResponse> {
            Err(ProfileError::invalid_config("destination is not configured"))
        }

        fn name(&self) -> &str {
            "rejecting"
        }
    }

    #[tokio::test]
    async fn test_writer_error_does_not_drop_profiles() {
        let memory = Arc::new(InMemoryWriter::new());
        let mut session = ProfileSession::new(DatasetSchema::new())
            .with_writer(Arc::new(RejectingWriter))
            .with_writer(memory.clone());
        session.log_values([("a", vec![Value::Int(7)])]).unwrap();

        let responses = session.close().await.unwrap();
        assert_eq!(responses.len(), 2);
        assert!(!responses[0].success);
        assert!(responses[0].message.contains("destination is not configured"));
        assert!(responses[1].success);

        let stored = memory.profiles().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get_column("a").unwrap().counts().unwrap().n.value(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_input() {
        let mut session = ProfileSession::new(DatasetSchema::new());
        session.close().await.unwrap();

        let err = session.log_values([("a", vec![Value::Int(1)])]).unwrap_err();
        assert!(matches!(err, ProfileError::ClosedSession));
        assert!(matches!(
            session.close().await.unwrap_err(),
            ProfileError::ClosedSession
        ));
    }

    #[test]
    fn test_empty_batches_are_rejected() {
        let mut session = ProfileSession::new(DatasetSchema::new());
        let err = session
            .log_values(Vec::<(&str, Vec<Value>)>::new())
            .unwrap_err();
        assert!(matches!(err, ProfileError::EmptyBatch));

        let empty = RecordBatch::new_empty(Arc::new(Schema::empty()));
        assert!(matches!(
            session.log(&empty).unwrap_err(),
            ProfileError::EmptyBatch
        ));
    }

    #[test]
    fn test_log_record_batch() {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
        let columns: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(vec![4, 8, 15]))];
        let batch = RecordBatch::try_new(schema, columns).unwrap();

        let mut session = ProfileSession::new(DatasetSchema::new());
        assert!(session.view().unwrap().is_none());
        session.log(&batch).unwrap();

        let view = session.view().unwrap().unwrap();
        assert_eq!(view.get_column("n").unwrap().ints().unwrap().max.value(), 15);
    }
}
