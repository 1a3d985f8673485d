//! Read-only chain access.
//!
//! [`OpenNodeApi`] talks to the public OpenNode HTTP API. It serves both the
//! [`ChainReader`] queries and the raw supernode list for the directory.

use crate::error::{Error, Result};
use crate::routing::directory::{DirectorySource, SupernodeRecord};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Read-only chain queries. Timeouts and non-2xx replies map to
/// [`Error::Network`].
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current best block height.
    async fn block_count(&self) -> Result<u64>;

    /// Hash of the block at `height`.
    async fn block_hash(&self, height: u64) -> Result<String>;

    /// Merkle root of the block at `height`.
    async fn merkle_root(&self, height: u64) -> Result<String>;

    /// Raw transaction lookup.
    async fn raw_transaction(&self, txid: &str) -> Result<Value>;
}

/// OpenNode HTTP API client.
#[derive(Debug, Clone)]
pub struct OpenNodeApi {
    base_url: String,
    client: reqwest::Client,
}

impl OpenNodeApi {
    /// Create a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pastel-credit/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn fetch_json(&self, endpoint: &str) -> Result<Value> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("request to {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "{url} returned status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Network(format!("invalid JSON from {url}: {e}")))
    }
}

#[async_trait]
impl ChainReader for OpenNodeApi {
    async fn block_count(&self) -> Result<u64> {
        let value = self.fetch_json("/getblockcount").await?;
        value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| Error::Network(format!("unexpected block count: {value}")))
    }

    async fn block_hash(&self, height: u64) -> Result<String> {
        let value = self.fetch_json(&format!("/getblockhash/{height}")).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Network(format!("unexpected block hash: {value}")))
    }

    async fn merkle_root(&self, height: u64) -> Result<String> {
        let hash = self.block_hash(height).await?;
        let block = self.fetch_json(&format!("/getblock/{hash}")).await?;
        block
            .get("merkleroot")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Network(format!("block {hash} has no merkle root")))
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Value> {
        self.fetch_json(&format!("/getrawtransaction/{txid}")).await
    }
}

#[async_trait]
impl DirectorySource for OpenNodeApi {
    async fn fetch_supernodes(&self) -> Result<Vec<SupernodeRecord>> {
        let value = self.fetch_json("/supernode_data").await?;
        parse_supernode_list(value)
    }
}

/// Decode a supernode list delivered as JSON text, as an object keyed by
/// collateral outpoint, or as an array. Malformed entries are skipped.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the payload has none of those shapes.
pub fn parse_supernode_list(value: Value) -> Result<Vec<SupernodeRecord>> {
    let value = match value {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| Error::Serialization(format!("supernode list is not JSON: {e}")))?,
        other => other,
    };
    let entries: Vec<Value> = match value {
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        Value::Array(items) => items,
        other => {
            return Err(Error::Serialization(format!(
                "unexpected supernode list shape: {other}"
            )))
        }
    };

    let total = entries.len();
    let records: Vec<SupernodeRecord> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if records.len() < total {
        warn!(
            "Skipped {} malformed supernode list entries",
            total - records.len()
        );
    }
    Ok(records)
}
