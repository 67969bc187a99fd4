//! Profile writers.
//!
//! A [`ProfileWriter`] persists a finished [`DatasetProfileView`] somewhere. Expected
//! storage failures are reported in the [`WriteResponse`], not as errors; an `Err` means the
//! writer itself is misconfigured.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::error::{ProfileError, Result};
use crate::view::DatasetProfileView;

/// Outcome of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    pub success: bool,
    pub message: String,
}

impl WriteResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Destination for finished profiles.
#[async_trait]
pub trait ProfileWriter: Debug + Send + Sync {
    /// Persists `profile`.
    async fn write(&self, profile: &DatasetProfileView) -> Result<WriteResponse>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Writes profiles as files in a local directory.
///
/// Files are named `profile_<dataset_ts_ms>_<creation_ts_ms>.bin`.
#[derive(Debug, Clone)]
pub struct LocalWriter {
    base_dir: PathBuf,
}

impl LocalWriter {
    /// Creates a writer for `base_dir`. The directory is created on first write; a path
    /// that exists and is not a directory is rejected.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        check_base_dir(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path a profile will be written to.
    pub fn path_for(&self, profile: &DatasetProfileView) -> PathBuf {
        self.base_dir.join(format!(
            "profile_{}_{}.bin",
            profile.dataset_timestamp().timestamp_millis(),
            profile.creation_timestamp().timestamp_millis()
        ))
    }
}

fn check_base_dir(base_dir: &Path) -> Result<()> {
    if base_dir.exists() && !base_dir.is_dir() {
        return Err(ProfileError::invalid_config(format!(
            "{} exists and is not a directory",
            base_dir.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl ProfileWriter for LocalWriter {
    #[instrument(skip(self, profile), fields(writer = "local", base_dir = %self.base_dir.display()))]
    async fn write(&self, profile: &DatasetProfileView) -> Result<WriteResponse> {
        check_base_dir(&self.base_dir)?;

        let path = self.path_for(profile);
        let base_dir = self.base_dir.clone();
        let view = profile.clone();
        let target = path.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&base_dir)?;
            view.write(&target)
        })
        .await;

        let response = match outcome {
            Ok(Ok(())) => {
                info!(path = %path.display(), "Profile written");
                WriteResponse::ok(path.display().to_string())
            }
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "Profile write failed");
                WriteResponse::failed(format!("failed to write {}: {e}", path.display()))
            }
            Err(e) => {
                warn!(error = %e, "Profile write task failed");
                WriteResponse::failed(format!("write task failed: {e}"))
            }
        };
        Ok(response)
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Keeps serialized profiles in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWriter {
    storage: Arc<RwLock<Vec<Vec<u8>>>>,
}

impl InMemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }

    /// Decodes every stored profile, in write order.
    pub async fn profiles(&self) -> Result<Vec<DatasetProfileView>> {
        let storage = self.storage.read().await;
        storage
            .iter()
            .map(|bytes| DatasetProfileView::deserialize(bytes))
            .collect()
    }

    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl ProfileWriter for InMemoryWriter {
    #[instrument(skip(self, profile), fields(writer = "in_memory"))]
    async fn write(&self, profile: &DatasetProfileView) -> Result<WriteResponse> {
        let bytes = match profile.serialize() {
            Ok(bytes) => bytes,
            Err(e) => return Ok(WriteResponse::failed(e.to_string())),
        };
        let size = bytes.len();
        let mut storage = self.storage.write().await;
        storage.push(bytes);
        Ok(WriteResponse::ok(format!(
            "stored profile #{} ({size} bytes)",
            storage.len()
        )))
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
