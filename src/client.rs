//! Caller-facing credit pack client.
//!
//! [`CreditPackClient`] is built once per process and owns every
//! collaborator. Concurrent purchases through one client share only the
//! supernode directory and its filtered-peer cache.

use crate::auth::ChallengeAuthenticator;
use crate::chain::{ChainReader, OpenNodeApi};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::integrity::IntegrityValidator;
use crate::market::{
    estimate_price_per_credit, estimate_purchase_cost, CoinGeckoOracle, PriceOracle,
};
use crate::policy::RetryPolicy;
use crate::protocol::{self, Endpoint, StatusReply};
use crate::purchase::{
    PriceCeilings, PurchaseContext, PurchaseNegotiator, PurchaseReport, RetryCoordinator,
};
use crate::routing::{DirectorySource, FilteredPeer, PeerSelector, SupernodeDirectory};
use crate::storage::{ArtifactStore, DiskArtifactStore};
use crate::transport::{HttpTransport, SupernodeTransport};
use crate::wallet::{validate_psl_address, PasteldRpc, Signer, Wallet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// A registered credit pack as reported by a supernode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPackTicket {
    /// Ticket registration txid.
    pub credit_pack_registration_txid: String,
    /// Block height of the purchase confirmation.
    #[serde(default)]
    pub credit_purchase_request_confirmation_pastel_block_height: u64,
    /// Owner.
    pub requesting_end_user_pastelid: String,
    /// Hash of the parsed ticket input data.
    #[serde(default)]
    pub ticket_input_data_fully_parsed_sha3_256_hash: String,
    /// Burn transaction that paid for the pack.
    #[serde(default)]
    pub txid_of_credit_purchase_burn_transaction: String,
    /// Tracking address.
    #[serde(default)]
    pub credit_usage_tracking_psl_address: String,
    /// Price paid per credit.
    #[serde(default)]
    pub psl_cost_per_credit: f64,
    /// Credits bought.
    #[serde(default)]
    pub requested_initial_credits_in_credit_pack: u64,
    /// Credits left.
    #[serde(default)]
    pub credit_pack_current_credit_balance: f64,
    /// When the balance was computed.
    #[serde(default)]
    pub balance_as_of_datetime: String,
    /// Confirmations seen for the burn.
    #[serde(default)]
    pub number_of_confirmation_transactions: u64,
}

/// Remaining credits of a pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPackBalance {
    /// Credits left.
    #[serde(rename = "credit_pack_current_credit_balance")]
    pub current_balance: f64,
    /// When the balance was computed.
    #[serde(rename = "balance_as_of_datetime", default)]
    pub as_of: String,
}

/// Injectable collaborators for [`CreditPackClient::with_parts`].
#[derive(Clone)]
pub struct ClientParts {
    /// Supernode HTTP access.
    pub transport: Arc<dyn SupernodeTransport>,
    /// Raw supernode list.
    pub source: Arc<dyn DirectorySource>,
    /// Chain queries.
    pub chain: Arc<dyn ChainReader>,
    /// PastelID signing.
    pub signer: Arc<dyn Signer>,
    /// Block height and burn payments.
    pub wallet: Arc<dyn Wallet>,
    /// PSL market price.
    pub oracle: Arc<dyn PriceOracle>,
    /// Artifact persistence.
    pub store: Arc<dyn ArtifactStore>,
}

/// Entry point for estimating, buying and inspecting credit packs.
#[derive(Debug, Clone)]
pub struct CreditPackClient {
    config: ClientConfig,
    ctx: Arc<PurchaseContext>,
    selector: PeerSelector,
    negotiator: PurchaseNegotiator,
}

impl CreditPackClient {
    /// Build a client talking to pasteld, the OpenNode API, CoinGecko and
    /// the on-disk artifact store named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or has no
    /// PastelID, or an error if an adapter cannot be created.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let request_timeout = config.negotiation.request_timeout();
        let transport = Arc::new(HttpTransport::from_config(&config.directory)?);
        let opennode = Arc::new(OpenNodeApi::new(&config.opennode_api_url, request_timeout)?);
        let rpc = Arc::new(PasteldRpc::from_config(&config)?);
        let oracle = Arc::new(CoinGeckoOracle::new(
            &config.pricing.price_api_url,
            request_timeout,
            RetryPolicy::from_config(&config.retry),
        )?);
        let store = Arc::new(DiskArtifactStore::new(config.artifact_dir()).await?);
        let parts = ClientParts {
            transport,
            source: opennode.clone(),
            chain: opennode,
            signer: rpc.clone(),
            wallet: rpc,
            oracle,
            store,
        };
        Self::with_parts(config, parts)
    }

    /// Build a client from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or has no
    /// PastelID.
    pub fn with_parts(config: ClientConfig, parts: ClientParts) -> Result<Self> {
        config.validate()?;
        let identity = config
            .pastelid
            .clone()
            .ok_or_else(|| Error::Config("no PastelID configured".to_string()))?;

        let directory = Arc::new(SupernodeDirectory::new(
            parts.source,
            Arc::clone(&parts.transport),
            &config,
        ));
        let ctx = Arc::new(PurchaseContext {
            identity,
            directory: Arc::clone(&directory),
            auth: ChallengeAuthenticator::new(
                parts.transport,
                Arc::clone(&parts.signer),
                config.negotiation.request_timeout(),
            ),
            validator: IntegrityValidator::from_config(parts.signer, &config.negotiation),
            wallet: parts.wallet,
            chain: parts.chain,
            oracle: parts.oracle,
            store: parts.store,
            negotiation: config.negotiation.clone(),
            pricing: config.pricing.clone(),
            burn_address: config.burn_address(),
        });
        let retry = RetryCoordinator::new(Arc::clone(&ctx), RetryPolicy::from_config(&config.retry));
        let negotiator = PurchaseNegotiator::new(Arc::clone(&ctx), retry);
        info!("Credit pack client ready for {} on {}", ctx.identity, config.network);
        Ok(Self {
            config,
            ctx,
            selector: PeerSelector::new(directory),
            negotiator,
        })
    }

    /// Local PastelID.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.ctx.identity
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Supernode directory.
    #[must_use]
    pub fn directory(&self) -> &Arc<SupernodeDirectory> {
        &self.ctx.directory
    }

    /// Estimated PSL cost of `credits` at the current market price, with a
    /// fractional `cushion` (0.1 adds 10%), rounded to cents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pricing`] or [`Error::Network`] if no plausible
    /// market price is available.
    pub async fn estimate_purchase_cost(&self, credits: u64, cushion: f64) -> Result<f64> {
        let psl_usd = self.ctx.oracle.psl_usd().await?;
        let per_credit = estimate_price_per_credit(&self.ctx.pricing, psl_usd)?;
        let cost = estimate_purchase_cost(credits, per_credit, cushion);
        debug!("Estimated {credits} credits at {per_credit} PSL each: {cost} PSL");
        Ok(cost)
    }

    /// Buy `credits` tracked against `tracking_address` within `ceilings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Wallet`] for a malformed tracking address, and any
    /// error of [`PurchaseNegotiator::purchase`].
    pub async fn purchase_credit_pack(
        &self,
        credits: u64,
        tracking_address: &str,
        ceilings: PriceCeilings,
    ) -> Result<PurchaseReport> {
        validate_psl_address(tracking_address, self.config.network)?;
        self.negotiator
            .purchase(credits, tracking_address, ceilings)
            .await
    }

    /// Latest status of the purchase whose request hashed to `request_hash`.
    ///
    /// # Errors
    ///
    /// Returns the last error if no close supernode gives a valid answer.
    pub async fn get_credit_pack_status(&self, request_hash: &str) -> Result<StatusReply> {
        self.negotiator.status(request_hash).await
    }

    /// Reachable supernode closest to `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no supernode is reachable.
    pub async fn find_closest_supernode(&self, identifier: &str) -> Result<FilteredPeer> {
        self.selector.find_closest(identifier).await
    }

    /// Valid credit pack tickets owned by the local PastelID.
    ///
    /// # Errors
    ///
    /// Returns an error if the closest supernode cannot be queried or its
    /// reply is not a ticket list.
    pub async fn valid_credit_packs(&self) -> Result<Vec<CreditPackTicket>> {
        let raw = self
            .query(protocol::VALID_TICKETS, self.ctx.identity.clone())
            .await?;
        decode(raw, "credit pack ticket list")
    }

    /// Remaining balance of the pack registered in `ticket_txid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the closest supernode cannot be queried.
    pub async fn credit_pack_balance(&self, ticket_txid: &str) -> Result<CreditPackBalance> {
        let raw = self
            .query(protocol::CREDIT_PACK_BALANCE, ticket_txid.to_string())
            .await?;
        decode(raw, "credit pack balance")
    }

    /// Ticket paid for by `burn_txid`, as the supernode reports it.
    ///
    /// # Errors
    ///
    /// Returns an error if the closest supernode cannot be queried.
    pub async fn ticket_from_burn_txid(&self, burn_txid: &str) -> Result<Value> {
        self.query(protocol::TICKET_FROM_BURN_TXID, burn_txid.to_string())
            .await
    }

    /// Final registration txid of the pack paid for by `burn_txid`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the supernode reports none.
    pub async fn final_registration_txid(&self, burn_txid: &str) -> Result<String> {
        let raw = self
            .query(protocol::FINAL_REGISTRATION_TXID, burn_txid.to_string())
            .await?;
        raw.get("final_credit_pack_registration_txid")
            .and_then(Value::as_str)
            .filter(|txid| !txid.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::NotFound(format!("no registration txid for burn {burn_txid}"))
            })
    }

    async fn query(&self, endpoint: Endpoint, value: String) -> Result<Value> {
        let peer = self.find_closest_supernode(&self.ctx.identity).await?;
        debug!("Querying {} on {}", endpoint.path, peer.pastelid);
        self.ctx
            .auth
            .post(&peer.url, &self.ctx.identity, endpoint, Value::String(value))
            .await
    }
}

impl std::fmt::Debug for ClientParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientParts").finish_non_exhaustive()
    }
}

fn decode<T: serde::de::DeserializeOwned>(raw: Value, what: &str) -> Result<T> {
    serde_json::from_value(raw)
        .map_err(|e| Error::Serialization(format!("unexpected {what}: {e}")))
}
