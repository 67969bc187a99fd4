//! Error types for term-profile.
//!
//! All fallible operations in this crate return [`ProfileError`]. Values that cannot be
//! classified during a columnar update are *not* errors: they are counted and reported
//! through [`OperationResult`](crate::metrics::OperationResult). Everything here is
//! structural or format corruption and is always surfaced to the caller.

use thiserror::Error;

/// The main error type for profile accumulation, merging and persistence.
#[derive(Error, Debug)]
pub enum ProfileError {
    /// The binary profile could not be decoded, or decoded into something inconsistent.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A profile could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A chunk payload was shorter than its header declared.
    #[error(
        "IO error: invalid message for column '{column}': expecting buffer length of {expected}, got {actual} (offset {offset})"
    )]
    TruncatedChunk {
        /// Column whose chunk was being read
        column: String,
        /// Length recorded in the chunk header
        expected: u64,
        /// Bytes actually available
        actual: u64,
        /// Absolute byte offset of the chunk header
        offset: u64,
    },

    /// A chunk referenced a name index the header does not define.
    #[error("Missing metric name in the header for column '{column}'. Index: {index}")]
    MissingMetricName { column: String, index: i32 },

    /// Two metrics (or two columns' metrics) of different kinds were merged.
    #[error("Cannot merge metric '{left}' with metric '{right}'")]
    MergeMismatch { left: String, right: String },

    /// A counter exceeded its representable range.
    #[error("Counter overflow in component '{component}'")]
    CounterOverflow { component: String },

    /// Error related to configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A session was used after `close()`.
    #[error("Cannot log to a closed session")]
    ClosedSession,

    /// `log()` was called without any column data.
    #[error("log() was called without passing in any input")]
    EmptyBatch,

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, ProfileError>`.
pub type Result<T> = std::result::Result<T, ProfileError>;

impl ProfileError {
    /// Creates a deserialization error with the given message.
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a counter overflow error for the named component.
    pub fn overflow(component: impl Into<String>) -> Self {
        Self::CounterOverflow {
            component: component.into(),
        }
    }

    /// Creates a merge mismatch error.
    pub fn merge_mismatch(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::MergeMismatch {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Returns true for errors caused by corrupt or unreadable profile data.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Deserialization(_) | Self::TruncatedChunk { .. } | Self::MissingMetricName { .. }
        )
    }
}

impl From<prost::DecodeError> for ProfileError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Deserialization(err.to_string())
    }
}

impl From<prost::EncodeError> for ProfileError {
    fn from(err: prost::EncodeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfiguration(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ProfileError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.with_context(|| msg.to_string())
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            match e.into() {
                ProfileError::Deserialization(inner) => {
                    ProfileError::Deserialization(format!("{msg}: {inner}"))
                }
                ProfileError::Serialization(inner) => {
                    ProfileError::Serialization(format!("{msg}: {inner}"))
                }
                ProfileError::Internal(inner) => ProfileError::Internal(format!("{msg}: {inner}")),
                other => other,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_chunk_message_names_lengths() {
        let err = ProfileError::TruncatedChunk {
            column: "age".to_string(),
            expected: 120,
            actual: 97,
            offset: 64,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("IO error"));
        assert!(msg.contains("120"));
        assert!(msg.contains("97"));
        assert!(msg.contains("age"));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_overflow_error() {
        let err = ProfileError::overflow("counts/n");
        assert_eq!(err.to_string(), "Counter overflow in component 'counts/n'");
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_error_context_prefixes_deserialization() {
        fn failing() -> Result<()> {
            Err(ProfileError::deserialization("bad varint"))
        }

        let err = failing().context("Reading header").unwrap_err();
        assert_eq!(err.to_string(), "Deserialization error: Reading header: bad varint");
    }

    #[test]
    fn test_error_context_keeps_structured_variants() {
        let result: Result<()> = Err(ProfileError::ClosedSession);
        let err = result.context("ignored").unwrap_err();
        assert!(matches!(err, ProfileError::ClosedSession));
    }
}
