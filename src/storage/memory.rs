//! In-memory artifact store.

use super::{check_component, ArtifactStore};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Artifact store backed by a map. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Keys stored under `kind`.
    #[must_use]
    pub fn keys(&self, kind: &str) -> Vec<String> {
        self.entries
            .read()
            .keys()
            .filter(|(k, _)| k == kind)
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, kind: &str, key: &str, artifact: &Value) -> Result<bool> {
        check_component("kind", kind, 1)?;
        check_component("key", key, 1)?;
        let mut entries = self.entries.write();
        let slot = (kind.to_string(), key.to_string());
        if entries.contains_key(&slot) {
            return Ok(false);
        }
        entries.insert(slot, artifact.clone());
        Ok(true)
    }

    async fn get(&self, kind: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .entries
            .read()
            .get(&(kind.to_string(), key.to_string()))
            .cloned())
    }
}
