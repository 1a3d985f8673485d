//! Sharded on-disk artifact store.
//!
//! Artifacts are pretty-printed JSON files under a two-level shard taken from
//! the first four characters of the key. Writes go to a temp file that is
//! renamed into place, so a reader never observes a half-written artifact.

use super::{check_component, ArtifactStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

/// Shortest key that can be sharded.
const MIN_KEY_LEN: usize = 4;

/// Counters for store operations.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Artifacts written.
    pub artifacts_stored: u64,
    /// Artifacts read back.
    pub artifacts_retrieved: u64,
    /// Bytes written.
    pub bytes_stored: u64,
    /// Bytes read.
    pub bytes_retrieved: u64,
    /// Writes skipped because the key existed.
    pub duplicates: u64,
    /// Reads that found a file that was not valid JSON.
    pub corrupt_reads: u64,
}

/// Artifact store rooted at a directory.
pub struct DiskArtifactStore {
    root_dir: PathBuf,
    stats: parking_lot::RwLock<StorageStats>,
}

impl DiskArtifactStore {
    /// Open a store under `root_dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn new(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        fs::create_dir_all(&root_dir)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create artifact directory: {e}")))?;

        debug!("Opened artifact store at {}", root_dir.display());

        Ok(Self {
            root_dir,
            stats: parking_lot::RwLock::new(StorageStats::default()),
        })
    }

    /// Whether an artifact exists.
    #[must_use]
    pub fn exists(&self, kind: &str, key: &str) -> bool {
        self.artifact_path(kind, key)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StorageStats {
        self.stats.read().clone()
    }

    /// Store root.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn artifact_path(&self, kind: &str, key: &str) -> Result<PathBuf> {
        check_component("kind", kind, 1)?;
        check_component("key", key, MIN_KEY_LEN)?;
        let key = key.to_ascii_lowercase();
        Ok(self
            .root_dir
            .join(kind)
            .join(&key[0..2])
            .join(&key[2..4])
            .join(format!("{key}.json")))
    }
}

#[async_trait]
impl ArtifactStore for DiskArtifactStore {
    async fn put(&self, kind: &str, key: &str, artifact: &Value) -> Result<bool> {
        let path = self.artifact_path(kind, key)?;

        if path.exists() {
            trace!("Artifact {kind}/{key} already stored");
            self.stats.write().duplicates += 1;
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create shard directory: {e}")))?;
        }

        let content = serde_json::to_vec_pretty(artifact)
            .map_err(|e| Error::Serialization(format!("Failed to encode artifact: {e}")))?;

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create temp file: {e}")))?;
        file.write_all(&content)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write artifact: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::Storage(format!("Failed to flush artifact: {e}")))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to rename temp file: {e}")))?;

        {
            let mut stats = self.stats.write();
            stats.artifacts_stored += 1;
            stats.bytes_stored += content.len() as u64;
        }
        debug!("Stored {kind} artifact {key} ({} bytes)", content.len());
        Ok(true)
    }

    async fn get(&self, kind: &str, key: &str) -> Result<Option<Value>> {
        let path = self.artifact_path(kind, key)?;
        if !path.exists() {
            trace!("Artifact {kind}/{key} not found");
            return Ok(None);
        }

        let content = fs::read(&path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read artifact: {e}")))?;
        let value: Value = match serde_json::from_slice(&content) {
            Ok(value) => value,
            Err(e) => {
                self.stats.write().corrupt_reads += 1;
                warn!("Artifact {kind}/{key} is corrupt: {e}");
                return Err(Error::Storage(format!("Artifact {kind}/{key} is corrupt: {e}")));
            }
        };

        {
            let mut stats = self.stats.write();
            stats.artifacts_retrieved += 1;
            stats.bytes_retrieved += content.len() as u64;
        }
        Ok(Some(value))
    }
}

impl std::fmt::Debug for DiskArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskArtifactStore")
            .field("root_dir", &self.root_dir)
            .finish_non_exhaustive()
    }
}
