//! Persistence of protocol artifacts.
//!
//! Every message a purchase sends or accepts is kept under its field hash,
//! grouped by message kind:
//!
//! ```text
//! {artifact_dir}/{kind}/{xx}/{yy}/{field_hash}.json
//! ```

mod disk;
mod memory;

pub use disk::{DiskArtifactStore, StorageStats};
pub use memory::MemoryArtifactStore;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Key-value store for protocol artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `artifact` under `(kind, key)`.
    ///
    /// Returns `true` if newly stored, `false` if the key already existed.
    async fn put(&self, kind: &str, key: &str, artifact: &Value) -> Result<bool>;

    /// Fetch the artifact stored under `(kind, key)`.
    async fn get(&self, kind: &str, key: &str) -> Result<Option<Value>>;
}

/// Reject kinds and keys that are unsafe as path components.
pub(crate) fn check_component(label: &str, value: &str, min_len: usize) -> Result<()> {
    let safe = value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if value.len() < min_len || !safe {
        return Err(Error::Storage(format!("invalid artifact {label}: {value:?}")));
    }
    Ok(())
}
