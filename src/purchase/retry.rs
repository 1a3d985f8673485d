//! Storage retry on fallback supernodes.

use crate::error::{Error, Result};
use crate::identity::is_valid_pastel_id;
use crate::policy::RetryPolicy;
use crate::protocol::messages::is_success_outcome;
use crate::protocol::{
    self, PurchaseResponse, StorageRetryRequest, StorageRetryResponse,
};
use crate::purchase::negotiator::{bind, to_value, PurchaseContext};
use crate::routing::PeerSelector;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Asks the closest untried agreeing supernode to store a paid ticket.
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    ctx: Arc<PurchaseContext>,
    policy: RetryPolicy,
}

impl RetryCoordinator {
    /// Create a coordinator trying at most `policy.max_attempts` peers.
    #[must_use]
    pub fn new(ctx: Arc<PurchaseContext>, policy: RetryPolicy) -> Self {
        Self { ctx, policy }
    }

    /// Try untried members of `agreeing` in order of distance to the
    /// requester until one stores the ticket, then re-announce its answer
    /// to the whole agreeing set.
    ///
    /// A validation failure aborts immediately; any other failure moves on
    /// to the next peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetryExhausted`] carrying the last failure when no
    /// candidate succeeds, or [`Error::Validation`] when a reply fails its
    /// checks.
    pub async fn retry_storage(
        &self,
        response: &PurchaseResponse,
        agreeing: &[String],
        tried: &HashSet<String>,
    ) -> Result<StorageRetryResponse> {
        let ctx = &self.ctx;
        let candidates: Vec<&String> = PeerSelector::rank_ids(&ctx.identity, agreeing)
            .into_iter()
            .filter(|id| is_valid_pastel_id(id) && !tried.contains(id.as_str()))
            .collect();

        let mut attempts = 0;
        let mut last_error = None;
        for id in candidates.into_iter().take(self.policy.max_attempts) {
            if attempts > 0 {
                tokio::time::sleep(self.policy.backoff_for(attempts)).await;
            }
            attempts += 1;
            let Some(url) = ctx.directory.url_for(id) else {
                warn!("No address known for fallback supernode {id}");
                last_error = Some(Error::NotFound(format!("no address for {id}")));
                continue;
            };
            info!("Retrying storage with {id} (attempt {attempts})");
            match self.attempt(&url, id, response).await {
                Ok(stored) => {
                    ctx.announce(
                        protocol::STORAGE_RETRY_ANNOUNCEMENT,
                        &to_value(&stored)?,
                        agreeing,
                    )
                    .await;
                    return Ok(stored);
                }
                Err(e) if e.is_validation() => return Err(e),
                Err(e) => {
                    warn!("Storage retry with {id} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::RetryExhausted {
            attempts,
            last_error: Box::new(last_error.unwrap_or_else(|| {
                Error::NotFound("no untried agreeing supernode remains".to_string())
            })),
        })
    }

    async fn attempt(
        &self,
        url: &str,
        supernode: &str,
        response: &PurchaseResponse,
    ) -> Result<StorageRetryResponse> {
        let ctx = &self.ctx;
        let height = ctx.wallet.current_block_height().await?;
        let mut request = StorageRetryRequest::draft(response, &ctx.identity, supernode, height);
        ctx.validator.seal(&mut request, &ctx.identity).await?;
        ctx.persist("storage_retry_request", &request).await?;

        let raw = ctx
            .auth
            .post(url, &ctx.identity, protocol::STORAGE_RETRY, to_value(&request)?)
            .await?;
        let stored: StorageRetryResponse = ctx.validator.validate(&raw, height).await?;
        bind::<StorageRetryResponse>(&stored.request_hash, &response.request_hash)?;
        bind::<StorageRetryResponse>(&stored.retry_supernode_pastelid, supernode)?;
        ctx.persist("storage_retry_response", &stored).await?;

        if !is_success_outcome(&stored.outcome) {
            return Err(Error::Rejected(format!(
                "{supernode} could not store the ticket: {}",
                stored.failure_reason.as_deref().unwrap_or(&stored.outcome)
            )));
        }
        Ok(stored)
    }
}
