//! Credit pack purchase negotiation.
//!
//! One [`PurchaseNegotiator::purchase`] call drives a single attempt through
//! quote, price agreement, burn payment, confirmation, completion broadcast
//! and status polling. Each step consumes the validated output of the one
//! before it; nothing in the chain is shared with other attempts.

use crate::auth::ChallengeAuthenticator;
use crate::chain::ChainReader;
use crate::config::{NegotiationConfig, PricingConfig};
use crate::error::{Error, FailureKind, Result, ValidationError};
use crate::identity::is_valid_pastel_id;
use crate::integrity::IntegrityValidator;
use crate::market::{estimate_price_per_credit, PriceOracle};
use crate::protocol::messages::{decode_request_fields, is_success_outcome};
use crate::protocol::{
    self, Confirmation, ConfirmationResponse, Endpoint, PreliminaryPriceQuote,
    PriceQuoteReply, PriceQuoteResponse, PurchaseRequest, PurchaseResponse, QuoteReply,
    SignedMessage, StatusCheck, StatusReply,
};
use crate::purchase::pricing::{burn_amount, evaluate_quote, PriceCeilings, QuoteEvaluation};
use crate::purchase::retry::RetryCoordinator;
use crate::purchase::state::{PurchaseState, PurchaseTrace};
use crate::routing::{FilteredPeer, PeerSelector, SupernodeDirectory};
use crate::storage::ArtifactStore;
use crate::wallet::Wallet;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every purchase attempt of one client.
#[derive(Clone)]
pub struct PurchaseContext {
    /// Local PastelID acting as requester.
    pub identity: String,
    /// Supernode directory.
    pub directory: Arc<SupernodeDirectory>,
    /// Challenge authenticator for every POST.
    pub auth: ChallengeAuthenticator,
    /// Message sealing and validation.
    pub validator: IntegrityValidator,
    /// Block height and burn payments.
    pub wallet: Arc<dyn Wallet>,
    /// Read-only chain queries.
    pub chain: Arc<dyn ChainReader>,
    /// PSL market price.
    pub oracle: Arc<dyn PriceOracle>,
    /// Persistence of sent and accepted messages.
    pub store: Arc<dyn ArtifactStore>,
    /// Negotiation tolerances.
    pub negotiation: NegotiationConfig,
    /// Fair-price parameters.
    pub pricing: PricingConfig,
    /// Address burn payments go to.
    pub burn_address: String,
}

impl PurchaseContext {
    /// Persist a message under its field hash.
    pub(crate) async fn persist<M: SignedMessage>(&self, kind: &str, message: &M) -> Result<()> {
        let value =
            serde_json::to_value(message).map_err(|e| Error::Serialization(e.to_string()))?;
        self.store.put(kind, message.field_hash(), &value).await?;
        Ok(())
    }

    /// Best-effort POST of `payload` to every well-formed identifier in
    /// `recipients` the directory can resolve. Returns the number delivered.
    pub(crate) async fn announce(
        &self,
        endpoint: Endpoint,
        payload: &Value,
        recipients: &[String],
    ) -> usize {
        let mut targets = Vec::new();
        for id in recipients {
            if !is_valid_pastel_id(id) {
                debug!("Skipping malformed agreeing identifier {id}");
                continue;
            }
            match self.directory.url_for(id) {
                Some(url) => targets.push((id, url)),
                None => warn!("No address known for agreeing supernode {id}"),
            }
        }

        let sends = targets.iter().map(|(id, url)| async move {
            let result = self
                .auth
                .post(url, &self.identity, endpoint, payload.clone())
                .await;
            (id, result)
        });
        let mut delivered = 0;
        for (id, result) in join_all(sends).await {
            match result {
                Ok(_) => delivered += 1,
                Err(e) => warn!("Announcement to {id} via {} failed: {e}", endpoint.path),
            }
        }
        info!(
            "Announced {} to {delivered}/{} agreeing supernodes",
            endpoint.path,
            targets.len()
        );
        delivered
    }
}

impl std::fmt::Debug for PurchaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseContext")
            .field("identity", &self.identity)
            .field("burn_address", &self.burn_address)
            .finish_non_exhaustive()
    }
}

/// Proof of a completed purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    /// Hash of the purchase request.
    pub request_hash: String,
    /// Hash of the agreed purchase response.
    pub response_hash: String,
    /// Burn transaction id.
    pub burn_txid: String,
    /// PSL burned.
    pub amount_psl: f64,
    /// Credit pack ticket registration txid.
    pub registration_txid: String,
    /// Supernode that stored the ticket after a retry, if one was needed.
    pub stored_by_retry: Option<String>,
}

/// How an attempt ended short of an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PurchaseOutcome {
    /// Credit pack stored and registered.
    Completed(PurchaseReceipt),
    /// Supernode refused the request.
    Rejected {
        /// Reason given by the supernode.
        reason: String,
    },
    /// Supernode ended the negotiation after the price response.
    Terminated {
        /// Reason given by the supernode.
        reason: String,
    },
    /// Local checks refused the quote; nothing was paid.
    PriceNotAgreed(QuoteEvaluation),
}

/// Outcome plus the states the attempt passed through.
#[derive(Debug, Clone)]
pub struct PurchaseReport {
    /// Final outcome.
    pub outcome: PurchaseOutcome,
    /// State log.
    pub trace: PurchaseTrace,
}

/// Drives purchase attempts.
#[derive(Debug, Clone)]
pub struct PurchaseNegotiator {
    ctx: Arc<PurchaseContext>,
    selector: PeerSelector,
    retry: RetryCoordinator,
}

impl PurchaseNegotiator {
    /// Create a negotiator with `retry` as its storage fallback.
    #[must_use]
    pub fn new(ctx: Arc<PurchaseContext>, retry: RetryCoordinator) -> Self {
        let selector = PeerSelector::new(Arc::clone(&ctx.directory));
        Self {
            ctx,
            selector,
            retry,
        }
    }

    /// Buy a pack of `credits` tracked against `tracking_address`.
    ///
    /// Rejections, terminations and refused quotes are reported as
    /// [`PurchaseOutcome`]s. Failures are errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no supernode is reachable,
    /// [`Error::Validation`] if any received message fails its checks,
    /// [`Error::RetryExhausted`] if storage could not be completed, and
    /// network, wallet or pricing errors from the collaborators.
    pub async fn purchase(
        &self,
        credits: u64,
        tracking_address: &str,
        ceilings: PriceCeilings,
    ) -> Result<PurchaseReport> {
        let ctx = &self.ctx;
        let ceilings = ceilings.resolve(credits, ctx.negotiation.default_max_per_credit_psl)?;

        let peers = ctx.directory.filtered().await?;
        let status_peers = self
            .selector
            .closest_n(
                ctx.negotiation.status_check_peers.max(1),
                &ctx.identity,
                &peers,
            )
            .await?;
        if status_peers.is_empty() {
            return Err(Error::NotFound("no supernode for purchase".to_string()));
        }
        info!(
            "Purchasing {credits} credits, {} candidate supernodes",
            status_peers.len()
        );

        let height = ctx.wallet.current_block_height().await?;
        let mut request =
            PurchaseRequest::draft(&ctx.identity, credits, tracking_address, height);
        ctx.validator.seal(&mut request, &ctx.identity).await?;
        ctx.persist("purchase_request", &request).await?;
        let mut trace = PurchaseTrace::new(short(&request.field_hash));

        trace.advance(PurchaseState::QuoteRequested)?;
        let (primary, reply) = self.first_quote(&status_peers, &request, height).await?;
        let quote = match reply {
            QuoteReply::Quote(quote) => quote,
            QuoteReply::Rejection(rejection) => {
                warn!("Purchase request rejected: {}", rejection.reason);
                trace.advance(PurchaseState::Rejected)?;
                return Ok(PurchaseReport {
                    outcome: PurchaseOutcome::Rejected {
                        reason: rejection.reason,
                    },
                    trace,
                });
            }
        };
        trace.advance(PurchaseState::QuoteReceived)?;

        let psl_usd = ctx.oracle.psl_usd().await?;
        let estimated = estimate_price_per_credit(&ctx.pricing, psl_usd)?;
        let evaluation = evaluate_quote(
            &quote,
            &ceilings,
            estimated,
            ctx.negotiation.price_deviation_tolerance,
        )?;
        let agreed = evaluation.agreed();
        info!(
            "Quote {:.5} PSL/credit ({:.5} total), estimate {:.5}, deviation {:.3}: {}",
            evaluation.quoted_per_credit,
            evaluation.quoted_total,
            evaluation.estimated_per_credit,
            evaluation.deviation,
            if agreed { "accepting" } else { "declining" }
        );

        let mut answer = PriceQuoteResponse::draft(&request, &quote, agreed, height);
        ctx.validator.seal(&mut answer, &ctx.identity).await?;
        ctx.persist("price_quote_response", &answer).await?;

        if !agreed {
            if let Err(e) = ctx
                .auth
                .post(
                    &primary.url,
                    &ctx.identity,
                    protocol::PRICE_QUOTE_RESPONSE,
                    to_value(&answer)?,
                )
                .await
            {
                warn!("Failed to deliver price refusal: {e}");
            }
            return Ok(PurchaseReport {
                outcome: PurchaseOutcome::PriceNotAgreed(evaluation),
                trace,
            });
        }
        trace.advance(PurchaseState::PriceAgreed)?;

        let response = match self
            .send_agreement(&primary, &request, &answer, height)
            .await?
        {
            PriceQuoteReply::Purchase(response) => *response,
            PriceQuoteReply::Termination(termination) => {
                warn!("Purchase terminated: {}", termination.reason);
                trace.advance(PurchaseState::Terminal)?;
                return Ok(PurchaseReport {
                    outcome: PurchaseOutcome::Terminated {
                        reason: termination.reason,
                    },
                    trace,
                });
            }
        };

        let amount = burn_amount(response.total_cost);
        if !ceilings.allows_total(amount) || !ceilings.allows_per_credit(response.price_per_credit)
        {
            trace.advance(PurchaseState::Terminal)?;
            return Err(ValidationError::Mismatch {
                message: PurchaseResponse::KIND,
                detail: format!(
                    "proposed {amount} PSL ({} per credit) exceeds ceilings {} / {}",
                    response.price_per_credit,
                    ceilings.max_total_psl,
                    ceilings.max_per_credit_psl
                ),
            }
            .into());
        }

        let burn_txid = ctx
            .wallet
            .submit_burn_payment(&ctx.burn_address, amount)
            .await?;
        trace.advance(PurchaseState::Paid)?;
        info!("Burned {amount} PSL in {burn_txid}");

        let completion = self
            .finish_paid(&primary, &status_peers, &request, &response, &burn_txid, &mut trace)
            .await;
        match completion {
            Ok((registration_txid, stored_by_retry)) => {
                trace.advance(PurchaseState::Completed)?;
                Ok(PurchaseReport {
                    outcome: PurchaseOutcome::Completed(PurchaseReceipt {
                        request_hash: request.field_hash.clone(),
                        response_hash: response.field_hash.clone(),
                        burn_txid,
                        amount_psl: amount,
                        registration_txid,
                        stored_by_retry,
                    }),
                    trace,
                })
            }
            Err(e) => {
                error!(
                    "Purchase {} failed after burn {burn_txid}: {e}",
                    request.field_hash
                );
                Err(e)
            }
        }
    }

    /// Latest status of `request_hash`, asking the closest reachable
    /// supernodes in turn.
    ///
    /// # Errors
    ///
    /// Returns the last peer's error if none answers with a valid reply.
    pub async fn status(&self, request_hash: &str) -> Result<StatusReply> {
        let peers = self.ctx.directory.filtered().await?;
        let candidates = self
            .selector
            .closest_n(
                self.ctx.negotiation.status_check_peers.max(1),
                &self.ctx.identity,
                &peers,
            )
            .await?;
        let mut last_error = None;
        for peer in &candidates {
            match self.check_status(peer, request_hash).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    warn!("Status check with {} failed: {e}", peer.pastelid);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| Error::NotFound(format!("no supernode to ask about {request_hash}"))))
    }

    /// Ask `peers` in order for a quote, moving on only while a peer is
    /// unreachable. Returns the answering peer with its reply.
    async fn first_quote(
        &self,
        peers: &[FilteredPeer],
        request: &PurchaseRequest,
        height: u64,
    ) -> Result<(FilteredPeer, QuoteReply)> {
        let mut last_error = None;
        for peer in peers {
            match self.request_quote(peer, request, height).await {
                Ok(reply) => {
                    info!("Negotiating with {} ({})", peer.pastelid, peer.url);
                    return Ok((peer.clone(), reply));
                }
                Err(e) if e.kind() == FailureKind::Unavailable => {
                    warn!("Purchase request to {} failed: {e}", peer.pastelid);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::NotFound("no supernode for purchase".to_string())))
    }

    async fn request_quote(
        &self,
        peer: &FilteredPeer,
        request: &PurchaseRequest,
        height: u64,
    ) -> Result<QuoteReply> {
        let ctx = &self.ctx;
        let raw = ctx
            .auth
            .post(
                &peer.url,
                &ctx.identity,
                protocol::INITIAL_REQUEST,
                to_value(request)?,
            )
            .await?;
        let reply = QuoteReply::parse(&raw)?;
        match &reply {
            QuoteReply::Quote(quote) => {
                ctx.validator.check(&raw, quote, height).await?;
                bind::<PreliminaryPriceQuote>(&quote.request_hash, &request.field_hash)?;
                ctx.persist("preliminary_price_quote", quote).await?;
            }
            QuoteReply::Rejection(rejection) => {
                ctx.validator.check(&raw, rejection, height).await?;
                bind::<protocol::Rejection>(&rejection.request_hash, &request.field_hash)?;
                ctx.persist("rejection", rejection).await?;
            }
        }
        Ok(reply)
    }

    async fn send_agreement(
        &self,
        peer: &FilteredPeer,
        request: &PurchaseRequest,
        answer: &PriceQuoteResponse,
        height: u64,
    ) -> Result<PriceQuoteReply> {
        let ctx = &self.ctx;
        let raw = ctx
            .auth
            .post(
                &peer.url,
                &ctx.identity,
                protocol::PRICE_QUOTE_RESPONSE,
                to_value(answer)?,
            )
            .await?;
        let reply = PriceQuoteReply::parse(&raw)?;
        match &reply {
            PriceQuoteReply::Termination(termination) => {
                ctx.validator.check(&raw, termination, height).await?;
                bind::<protocol::Termination>(&termination.request_hash, &request.field_hash)?;
                ctx.persist("termination", termination).await?;
            }
            PriceQuoteReply::Purchase(response) => {
                let response = response.as_ref();
                ctx.validator.check(&raw, response, height).await?;
                bind::<PurchaseResponse>(&response.request_hash, &request.field_hash)?;
                check_request_fields(response, request)?;
                let merkle_root = ctx.chain.merkle_root(response.best_block_height).await?;
                if merkle_root != response.best_block_merkle_root {
                    return Err(ValidationError::Mismatch {
                        message: PurchaseResponse::KIND,
                        detail: format!(
                            "merkle root {} at height {} does not match chain {merkle_root}",
                            response.best_block_merkle_root, response.best_block_height
                        ),
                    }
                    .into());
                }
                ctx.persist("purchase_response", response).await?;
            }
        }
        Ok(reply)
    }

    /// Confirm, announce, poll status and fall back to a storage retry.
    /// Returns the registration txid and the retry supernode, if any.
    async fn finish_paid(
        &self,
        primary: &FilteredPeer,
        status_peers: &[FilteredPeer],
        request: &PurchaseRequest,
        response: &PurchaseResponse,
        burn_txid: &str,
        trace: &mut PurchaseTrace,
    ) -> Result<(String, Option<String>)> {
        let ctx = &self.ctx;
        let height = ctx.wallet.current_block_height().await?;
        let mut confirmation = Confirmation::draft(request, response, burn_txid, height);
        ctx.validator.seal(&mut confirmation, &ctx.identity).await?;
        ctx.persist("confirmation", &confirmation).await?;
        let confirmation_payload = to_value(&confirmation)?;

        let raw = ctx
            .auth
            .post(
                &primary.url,
                &ctx.identity,
                protocol::CONFIRM,
                confirmation_payload.clone(),
            )
            .await?;
        trace.advance(PurchaseState::ConfirmationSent)?;
        let confirmed: ConfirmationResponse = ctx.validator.validate(&raw, height).await?;
        bind::<ConfirmationResponse>(&confirmed.confirmation_hash, &confirmation.field_hash)?;
        ctx.persist("confirmation_response", &confirmed).await?;
        if !is_success_outcome(&confirmed.outcome) {
            warn!(
                "Confirmation outcome '{}': {}",
                confirmed.outcome,
                confirmed.failure_reason.as_deref().unwrap_or("no reason given")
            );
        }

        let agreeing = response.agreeing_supernodes()?;
        ctx.announce(
            protocol::COMPLETION_ANNOUNCEMENT,
            &confirmation_payload,
            &agreeing,
        )
        .await;

        trace.advance(PurchaseState::StatusPending)?;
        let mut tried = HashSet::new();
        let mut reply = None;
        for peer in status_peers {
            match self.check_status(peer, &request.field_hash).await {
                Ok(status) => {
                    reply = Some(status);
                    break;
                }
                Err(e) if e.is_validation() => return Err(e),
                Err(e) => {
                    warn!("Status check with {} failed: {e}", peer.pastelid);
                    tried.insert(peer.pastelid.clone());
                }
            }
        }

        match reply {
            Some(status) if status.is_completed() => Ok((confirmed.registration_txid, None)),
            other => {
                match other {
                    Some(status) => warn!(
                        "Purchase status '{}': {}",
                        status.status, status.status_details
                    ),
                    None => warn!("No supernode answered the status check"),
                }
                trace.advance(PurchaseState::RetryNeeded)?;
                let stored = self.retry.retry_storage(response, &agreeing, &tried).await?;
                Ok((stored.registration_txid, Some(stored.retry_supernode_pastelid)))
            }
        }
    }

    async fn check_status(&self, peer: &FilteredPeer, request_hash: &str) -> Result<StatusReply> {
        let ctx = &self.ctx;
        let check = StatusCheck {
            request_hash: request_hash.to_string(),
            requester_pastelid: ctx.identity.clone(),
            signature: ctx.validator.sign(&ctx.identity, request_hash).await?,
        };
        let height = ctx.wallet.current_block_height().await?;
        let raw = ctx
            .auth
            .post(
                &peer.url,
                &ctx.identity,
                protocol::STATUS_CHECK,
                to_value(&check)?,
            )
            .await?;
        let reply: StatusReply = ctx.validator.validate(&raw, height).await?;
        bind::<StatusReply>(&reply.request_hash, request_hash)?;
        ctx.persist("status_reply", &reply).await?;
        debug!("Status of {request_hash} from {}: {}", peer.pastelid, reply.status);
        Ok(reply)
    }
}

/// Require a reply to reference the hash of what it answers.
pub(crate) fn bind<M: SignedMessage>(referenced: &str, expected: &str) -> Result<()> {
    if referenced == expected {
        return Ok(());
    }
    Err(ValidationError::Mismatch {
        message: M::KIND,
        detail: format!("references {referenced}, expected {expected}"),
    }
    .into())
}

/// The embedded request fields must describe the request in flight.
fn check_request_fields(response: &PurchaseResponse, request: &PurchaseRequest) -> Result<()> {
    let fields = decode_request_fields(&response.request_fields_b64, PurchaseResponse::KIND)?;
    let mismatch = |detail: String| ValidationError::Mismatch {
        message: PurchaseResponse::KIND,
        detail,
    };
    let requester = fields
        .get("requesting_end_user_pastelid")
        .and_then(Value::as_str);
    if requester != Some(request.requester_pastelid.as_str()) {
        return Err(mismatch(format!("embedded requester {requester:?}")).into());
    }
    let credits = fields
        .get("requested_initial_credits_in_credit_pack")
        .and_then(Value::as_u64);
    if credits != Some(request.requested_credits) {
        return Err(mismatch(format!("embedded credit count {credits:?}")).into());
    }
    Ok(())
}

pub(crate) fn to_value<T: Serialize>(message: &T) -> Result<Value> {
    serde_json::to_value(message).map_err(|e| Error::Serialization(e.to_string()))
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
