//! HTTP transport to supernodes.
//!
//! Every outbound call goes through [`SupernodeTransport`] so the negotiator
//! and the directory can run against an in-memory network in tests.
//! [`HttpTransport`] bounds simultaneous requests with a semaphore.

use crate::config::DirectoryConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::trace;

/// JSON-over-HTTP access to supernodes.
#[async_trait]
pub trait SupernodeTransport: Send + Sync {
    /// GET `url` and return the round-trip time of a successful reply.
    async fn ping(&self, url: &str, timeout: Duration) -> Result<Duration>;

    /// GET `url` and decode the JSON body.
    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value>;

    /// POST `body` to `url` and decode the JSON reply.
    async fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpTransport {
    /// Create a transport allowing `max_concurrent` requests in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(max_concurrent: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pastel-credit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Create a transport sized by the directory settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &DirectoryConfig) -> Result<Self> {
        Self::new(config.max_concurrent_requests)
    }

    /// Send `request` under a permit. The permit is returned with the
    /// response so the body is read within the concurrency cap.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<(SemaphorePermit<'_>, reqwest::Response)> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::Network(format!("request limiter closed: {e}")))?;
        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("request to {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "{url} returned status {}",
                response.status()
            )));
        }
        Ok((permit, response))
    }

    async fn read_json(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Value> {
        let (_permit, response) = self.send(request, url).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Network(format!("invalid JSON from {url}: {e}")))
    }
}

#[async_trait]
impl SupernodeTransport for HttpTransport {
    async fn ping(&self, url: &str, timeout: Duration) -> Result<Duration> {
        let started = Instant::now();
        self.send(self.client.get(url).timeout(timeout), url).await?;
        let elapsed = started.elapsed();
        trace!("{url} answered in {elapsed:?}");
        Ok(elapsed)
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value> {
        self.read_json(self.client.get(url).timeout(timeout), url).await
    }

    async fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value> {
        self.read_json(self.client.post(url).json(body).timeout(timeout), url).await
    }
}
