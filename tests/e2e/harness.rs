//! In-memory supernode network and client wiring for end-to-end tests.
//!
//! Every supernode lives at `http://10.0.0.{n}:7123` and answers the protocol
//! with messages sealed through the crate's own canonical field hashing, so a
//! purchase runs through exactly the validation path it takes in production.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pastel_credit_client::chain::ChainReader;
use pastel_credit_client::error::{Error, Result};
use pastel_credit_client::protocol::messages::{
    decode_request_fields, encode_request_fields, utc_timestamp,
};
use pastel_credit_client::protocol::{
    self, sha3_hex, Confirmation, ConfirmationResponse, PreliminaryPriceQuote,
    PriceQuoteResponse, PurchaseRequest, PurchaseResponse, Rejection, SignedMessage, StatusCheck,
    StatusReply, StorageRetryRequest, StorageRetryResponse, Termination, MESSAGE_VERSION,
};
use pastel_credit_client::routing::{DirectorySource, SupernodeRecord, SupernodeStatus};
use pastel_credit_client::{
    ClientConfig, ClientParts, CreditPackClient, IntegrityValidator, MemoryArtifactStore,
    PeerSelector, Signer, StaticPriceOracle, SupernodeTransport, Wallet,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Chain height every collaborator reports.
pub const BLOCK_HEIGHT: u64 = 1000;

/// Requesting identity. Deliberately not PastelID-shaped: only the CLI
/// enforces the format of the local identity.
pub const REQUESTER: &str = "id-X";

/// Well-formed testnet tracking address.
pub const TRACKING_ADDRESS: &str = "tPabcdefghijkmnopqrstuvwxyz12345678";

/// Supernode API port.
pub const API_PORT: u16 = 7123;

/// PSL/USD price that makes the fair estimate exactly 0.4 PSL per credit.
pub const PSL_USD: f64 = 0.01;

/// Deterministic stand-in for a PastelID signature.
pub fn test_signature(identity: &str, message: &str) -> String {
    sha3_hex(format!("{identity}:{message}").as_bytes())
}

/// PastelID-shaped identifier of supernode `index`.
pub fn supernode_id(index: usize) -> String {
    format!("jX{}{index:04}", "A".repeat(80))
}

/// Signs with [`test_signature`].
#[derive(Debug, Default)]
pub struct TestSigner;

#[async_trait]
impl Signer for TestSigner {
    async fn sign(&self, identity: &str, message: &str) -> Result<String> {
        Ok(test_signature(identity, message))
    }

    async fn verify(&self, identity: &str, message: &str, signature: &str) -> Result<bool> {
        Ok(signature == test_signature(identity, message))
    }
}

/// Wallet at a fixed height that records burns.
#[derive(Debug, Default)]
pub struct MockWallet {
    burns: Mutex<Vec<(String, f64)>>,
}

impl MockWallet {
    /// Burns submitted so far, as `(address, amount)`.
    pub fn burns(&self) -> Vec<(String, f64)> {
        self.burns.lock().clone()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    async fn current_block_height(&self) -> Result<u64> {
        Ok(BLOCK_HEIGHT)
    }

    async fn submit_burn_payment(&self, to_address: &str, amount_psl: f64) -> Result<String> {
        let mut burns = self.burns.lock();
        burns.push((to_address.to_string(), amount_psl));
        Ok(format!("burn-{}", burns.len()))
    }
}

/// Chain whose merkle root at height `h` is `merkle-{h}`.
#[derive(Debug, Default)]
pub struct MockChain;

#[async_trait]
impl ChainReader for MockChain {
    async fn block_count(&self) -> Result<u64> {
        Ok(BLOCK_HEIGHT)
    }

    async fn block_hash(&self, height: u64) -> Result<String> {
        Ok(format!("hash-{height}"))
    }

    async fn merkle_root(&self, height: u64) -> Result<String> {
        Ok(format!("merkle-{height}"))
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Value> {
        Ok(json!({ "txid": txid }))
    }
}

/// How one supernode answers.
#[derive(Debug, Clone)]
pub struct NodeBehaviour {
    /// Answers pings and HTTP calls at all.
    pub reachable: bool,
    /// Quoted price per credit.
    pub quote_per_credit: f64,
    /// Reject the initial request with this reason.
    pub reject_reason: Option<String>,
    /// Terminate after an agreeing price response with this reason.
    pub terminate_reason: Option<String>,
    /// Corrupt the quote after sealing it.
    pub tamper_quote: bool,
    /// Fail the initial purchase request at the transport level while
    /// still answering pings.
    pub initial_request_fails: bool,
    /// Propose this total in the purchase response instead of the quoted one.
    pub response_total_override: Option<f64>,
    /// Report a merkle root the chain does not have.
    pub bad_merkle_root: bool,
    /// Fail status checks at the transport level.
    pub status_fails: bool,
    /// Status keyword reported.
    pub status: String,
    /// Outcome of a storage retry.
    pub retry_outcome: String,
}

impl Default for NodeBehaviour {
    fn default() -> Self {
        Self {
            reachable: true,
            quote_per_credit: 0.4,
            reject_reason: None,
            terminate_reason: None,
            tamper_quote: false,
            initial_request_fails: false,
            response_total_override: None,
            bad_merkle_root: false,
            status_fails: false,
            status: "completed".to_string(),
            retry_outcome: "success".to_string(),
        }
    }
}

/// One POST the network received.
#[derive(Debug, Clone)]
pub struct Call {
    /// Receiving supernode.
    pub pastelid: String,
    /// Request path.
    pub path: String,
    /// Full body, challenge triple included.
    pub body: Value,
}

#[derive(Debug, Default, Clone)]
struct Session {
    request_hash: String,
    response_hash: String,
    confirmation_hash: String,
}

/// A set of scripted supernodes reachable through [`SupernodeTransport`].
#[derive(Debug, Default)]
pub struct MockNetwork {
    ids: Vec<String>,
    behaviour: Mutex<HashMap<String, NodeBehaviour>>,
    challenges: Mutex<HashMap<String, String>>,
    issued: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    session: Mutex<Session>,
}

impl MockNetwork {
    /// `count` healthy supernodes.
    pub fn new(count: usize) -> Arc<Self> {
        let ids: Vec<String> = (1..=count).map(supernode_id).collect();
        let behaviour = ids
            .iter()
            .map(|id| (id.clone(), NodeBehaviour::default()))
            .collect();
        Arc::new(Self {
            ids,
            behaviour: Mutex::new(behaviour),
            ..Self::default()
        })
    }

    /// Supernode identifiers in listing order.
    pub fn ids(&self) -> Vec<String> {
        self.ids.clone()
    }

    /// Supernode identifiers by ascending distance to [`REQUESTER`].
    pub fn ranked_ids(&self) -> Vec<String> {
        PeerSelector::rank_ids(REQUESTER, &self.ids)
            .into_iter()
            .cloned()
            .collect()
    }

    /// API base URL of `pastelid`.
    pub fn url_of(&self, pastelid: &str) -> String {
        let index = self
            .ids
            .iter()
            .position(|id| id == pastelid)
            .expect("known supernode");
        format!("http://10.0.0.{}:{API_PORT}", index + 1)
    }

    /// Change how `pastelid` behaves.
    pub fn configure(&self, pastelid: &str, change: impl FnOnce(&mut NodeBehaviour)) {
        let mut behaviour = self.behaviour.lock();
        change(behaviour.get_mut(pastelid).expect("known supernode"));
    }

    /// Change how every supernode behaves.
    pub fn configure_all(&self, change: impl Fn(&mut NodeBehaviour)) {
        for behaviour in self.behaviour.lock().values_mut() {
            change(behaviour);
        }
    }

    /// Every POST received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// POSTs received on `path`.
    pub fn calls_to(&self, path: &str) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.path == path)
            .cloned()
            .collect()
    }

    fn locate(&self, url: &str) -> Result<(String, NodeBehaviour, String)> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| Error::Network(format!("unsupported url {url}")))?;
        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        let pastelid = self
            .ids
            .iter()
            .enumerate()
            .find(|(i, _)| host == format!("10.0.0.{}:{API_PORT}", i + 1))
            .map(|(_, id)| id.clone())
            .ok_or_else(|| Error::Network(format!("connection refused: {host}")))?;
        let behaviour = self.behaviour.lock()[&pastelid].clone();
        if !behaviour.reachable {
            return Err(Error::Network(format!("connection timed out: {host}")));
        }
        Ok((pastelid, behaviour, format!("/{path}")))
    }

    fn check_challenge(&self, body: &Value) -> Result<()> {
        let text = |key: &str| body.get(key).and_then(Value::as_str).unwrap_or_default();
        let identity = self
            .challenges
            .lock()
            .remove(text("challenge_id"))
            .ok_or_else(|| Error::Network("401: unknown or reused challenge".to_string()))?;
        if text("challenge_signature") != test_signature(&identity, text("challenge")) {
            return Err(Error::Network("401: bad challenge signature".to_string()));
        }
        Ok(())
    }

    fn dispatch(
        &self,
        pastelid: &str,
        behaviour: &NodeBehaviour,
        path: &str,
        body: &Value,
    ) -> Result<Value> {
        let payload = |endpoint: protocol::Endpoint| {
            body.get(endpoint.payload_key)
                .cloned()
                .ok_or_else(|| Error::Network(format!("400: missing {}", endpoint.payload_key)))
        };
        match path {
            p if p == protocol::INITIAL_REQUEST.path => {
                self.quote(pastelid, behaviour, &payload(protocol::INITIAL_REQUEST)?)
            }
            p if p == protocol::PRICE_QUOTE_RESPONSE.path => {
                self.agree(pastelid, behaviour, &payload(protocol::PRICE_QUOTE_RESPONSE)?)
            }
            p if p == protocol::CONFIRM.path => {
                self.confirm(pastelid, &payload(protocol::CONFIRM)?)
            }
            p if p == protocol::STATUS_CHECK.path => {
                self.status(pastelid, behaviour, &payload(protocol::STATUS_CHECK)?)
            }
            p if p == protocol::STORAGE_RETRY.path => {
                self.store_ticket(pastelid, behaviour, &payload(protocol::STORAGE_RETRY)?)
            }
            p if p == protocol::COMPLETION_ANNOUNCEMENT.path
                || p == protocol::STORAGE_RETRY_ANNOUNCEMENT.path =>
            {
                Ok(json!({ "status": "ok" }))
            }
            p if p == protocol::VALID_TICKETS.path => {
                let owner = payload(protocol::VALID_TICKETS)?;
                Ok(json!([{
                    "credit_pack_registration_txid": "reg-burn-7",
                    "requesting_end_user_pastelid": owner,
                    "requested_initial_credits_in_credit_pack": 100,
                    "credit_pack_current_credit_balance": 42.5,
                }]))
            }
            p if p == protocol::CREDIT_PACK_BALANCE.path => Ok(json!({
                "credit_pack_current_credit_balance": 42.5,
                "balance_as_of_datetime": utc_timestamp(),
            })),
            p if p == protocol::TICKET_FROM_BURN_TXID.path => {
                let burn = payload(protocol::TICKET_FROM_BURN_TXID)?;
                Ok(json!({
                    "credit_pack_registration_txid": "reg-burn-7",
                    "txid_of_credit_purchase_burn_transaction": burn,
                }))
            }
            p if p == protocol::FINAL_REGISTRATION_TXID.path => {
                let burn = payload(protocol::FINAL_REGISTRATION_TXID)?;
                let burn = burn.as_str().unwrap_or_default();
                Ok(json!({ "final_credit_pack_registration_txid": format!("reg-{burn}") }))
            }
            other => Err(Error::Network(format!("404: {other}"))),
        }
    }

    fn quote(&self, pastelid: &str, behaviour: &NodeBehaviour, payload: &Value) -> Result<Value> {
        if behaviour.initial_request_fails {
            return Err(Error::Network(format!("502: {pastelid} bad gateway")));
        }
        let request: PurchaseRequest = decode(payload)?;
        self.session.lock().request_hash.clone_from(&request.field_hash);

        if let Some(reason) = &behaviour.reject_reason {
            let mut rejection = Rejection {
                request_hash: request.field_hash,
                request_fields_b64: encode_request_fields(payload),
                reason: reason.clone(),
                timestamp: utc_timestamp(),
                block_height: BLOCK_HEIGHT,
                version: MESSAGE_VERSION.to_string(),
                supernode_pastelid: pastelid.to_string(),
                field_hash: String::new(),
                signature: String::new(),
            };
            return sealed(&mut rejection, pastelid);
        }

        #[allow(clippy::cast_precision_loss)]
        let total = behaviour.quote_per_credit * request.requested_credits as f64;
        let mut quote = PreliminaryPriceQuote {
            request_hash: request.field_hash,
            tracking_address: request.tracking_address,
            request_fields_b64: encode_request_fields(payload),
            price_per_credit: behaviour.quote_per_credit,
            total_cost: total,
            timestamp: utc_timestamp(),
            block_height: BLOCK_HEIGHT,
            version: MESSAGE_VERSION.to_string(),
            supernode_pastelid: pastelid.to_string(),
            field_hash: String::new(),
            signature: String::new(),
        };
        let mut value = sealed(&mut quote, pastelid)?;
        if behaviour.tamper_quote {
            value["preliminary_total_cost_of_credit_pack_in_psl"] = json!(1.0);
        }
        Ok(value)
    }

    fn agree(&self, pastelid: &str, behaviour: &NodeBehaviour, payload: &Value) -> Result<Value> {
        let answer: PriceQuoteResponse = decode(payload)?;
        if !answer.agree {
            return Ok(json!({ "acknowledged": true }));
        }

        if let Some(reason) = &behaviour.terminate_reason {
            let mut termination = Termination {
                request_hash: answer.request_hash,
                request_fields_b64: answer.request_fields_b64,
                reason: reason.clone(),
                timestamp: utc_timestamp(),
                block_height: BLOCK_HEIGHT,
                version: MESSAGE_VERSION.to_string(),
                supernode_pastelid: pastelid.to_string(),
                field_hash: String::new(),
                signature: String::new(),
            };
            return sealed(&mut termination, pastelid);
        }

        let fields = decode_request_fields(&answer.request_fields_b64, "request fields")?;
        let credits = fields
            .get("requested_initial_credits_in_credit_pack")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        let agreeing = Value::from(self.ids()).to_string();
        #[allow(clippy::cast_precision_loss)]
        let total = behaviour
            .response_total_override
            .unwrap_or(answer.price_per_credit * credits as f64);
        let merkle_root = if behaviour.bad_merkle_root {
            "merkle-forked".to_string()
        } else {
            format!("merkle-{BLOCK_HEIGHT}")
        };
        let mut response = PurchaseResponse {
            request_hash: answer.request_hash,
            request_fields_b64: answer.request_fields_b64,
            price_per_credit: answer.price_per_credit,
            total_cost: total,
            tracking_address: answer.tracking_address,
            timestamp: utc_timestamp(),
            block_height: BLOCK_HEIGHT,
            best_block_merkle_root: merkle_root,
            best_block_height: BLOCK_HEIGHT,
            version: MESSAGE_VERSION.to_string(),
            supernode_pastelid: pastelid.to_string(),
            blacklisted: "[]".to_string(),
            potentially_agreeing: agreeing.clone(),
            agreeing: agreeing.clone(),
            selected_for_signature: agreeing,
            agreeing_signatures: "{}".to_string(),
            field_hash: String::new(),
            signature: String::new(),
        };
        let value = sealed(&mut response, pastelid)?;
        self.session.lock().response_hash = response.field_hash;
        Ok(value)
    }

    fn confirm(&self, pastelid: &str, payload: &Value) -> Result<Value> {
        let confirmation: Confirmation = decode(payload)?;
        self.session
            .lock()
            .confirmation_hash
            .clone_from(&confirmation.field_hash);
        let mut reply = ConfirmationResponse {
            request_hash: confirmation.request_hash,
            confirmation_hash: confirmation.field_hash,
            outcome: "success".to_string(),
            registration_txid: format!("reg-{}", confirmation.burn_txid),
            failure_reason: None,
            timestamp: utc_timestamp(),
            block_height: BLOCK_HEIGHT,
            version: MESSAGE_VERSION.to_string(),
            supernode_pastelid: pastelid.to_string(),
            field_hash: String::new(),
            signature: String::new(),
        };
        sealed(&mut reply, pastelid)
    }

    fn status(&self, pastelid: &str, behaviour: &NodeBehaviour, payload: &Value) -> Result<Value> {
        if behaviour.status_fails {
            return Err(Error::Network(format!("503: {pastelid} is overloaded")));
        }
        let check: StatusCheck = decode(payload)?;
        if check.signature != test_signature(&check.requester_pastelid, &check.request_hash) {
            return Err(Error::Network("403: bad status check signature".to_string()));
        }
        let response_hash = self.session.lock().response_hash.clone();
        let mut reply = StatusReply {
            request_hash: check.request_hash,
            response_hash,
            status: behaviour.status.clone(),
            status_details: format!("reported by {pastelid}"),
            timestamp: utc_timestamp(),
            block_height: BLOCK_HEIGHT,
            version: MESSAGE_VERSION.to_string(),
            supernode_pastelid: pastelid.to_string(),
            field_hash: String::new(),
            signature: String::new(),
        };
        sealed(&mut reply, pastelid)
    }

    fn store_ticket(
        &self,
        pastelid: &str,
        behaviour: &NodeBehaviour,
        payload: &Value,
    ) -> Result<Value> {
        let request: StorageRetryRequest = decode(payload)?;
        if request.retry_supernode_pastelid != pastelid {
            return Err(Error::Network("400: retry addressed elsewhere".to_string()));
        }
        let session = self.session.lock().clone();
        let succeeded = behaviour.retry_outcome == "success";
        let mut reply = StorageRetryResponse {
            request_hash: session.request_hash,
            confirmation_hash: session.confirmation_hash,
            outcome: behaviour.retry_outcome.clone(),
            registration_txid: if succeeded {
                format!("reg-retry-{}", &pastelid[pastelid.len() - 4..])
            } else {
                String::new()
            },
            failure_reason: (!succeeded).then(|| "ticket storage failed".to_string()),
            timestamp: utc_timestamp(),
            block_height: BLOCK_HEIGHT,
            version: MESSAGE_VERSION.to_string(),
            retry_supernode_pastelid: pastelid.to_string(),
            field_hash: String::new(),
            signature: String::new(),
        };
        sealed(&mut reply, pastelid)
    }
}

#[async_trait]
impl SupernodeTransport for MockNetwork {
    async fn ping(&self, url: &str, _timeout: Duration) -> Result<Duration> {
        self.locate(url)?;
        Ok(Duration::from_millis(5))
    }

    async fn get_json(&self, url: &str, _timeout: Duration) -> Result<Value> {
        let (_, _, path) = self.locate(url)?;
        if path == protocol::LIVENESS_PATH {
            return Ok(json!({ "performance_ratio_score": 0.95 }));
        }
        if let Some(identity) = path
            .strip_prefix(protocol::CHALLENGE_PATH)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            let challenge_id = format!("cid-{n}");
            self.challenges
                .lock()
                .insert(challenge_id.clone(), identity.to_string());
            return Ok(json!({ "challenge": format!("challenge-{n}"), "challenge_id": challenge_id }));
        }
        Err(Error::Network(format!("404: {path}")))
    }

    async fn post_json(&self, url: &str, body: &Value, _timeout: Duration) -> Result<Value> {
        let (pastelid, behaviour, path) = self.locate(url)?;
        self.calls.lock().push(Call {
            pastelid: pastelid.clone(),
            path: path.clone(),
            body: body.clone(),
        });
        self.check_challenge(body)?;
        self.dispatch(&pastelid, &behaviour, &path, body)
    }
}

#[async_trait]
impl DirectorySource for MockNetwork {
    async fn fetch_supernodes(&self) -> Result<Vec<SupernodeRecord>> {
        Ok(self
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| SupernodeRecord {
                pastelid: id.clone(),
                ip_port: format!("10.0.0.{}:9933", i + 1),
                status: SupernodeStatus::Enabled,
                ext_p2p: format!("10.0.0.{}:9934", i + 1),
                ext_address: String::new(),
            })
            .collect())
    }
}

fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| Error::Network(format!("400: malformed payload: {e}")))
}

fn sealed<M: SignedMessage>(message: &mut M, pastelid: &str) -> Result<Value> {
    let hash = IntegrityValidator::compute_field_hash(&*message)?;
    let signature = test_signature(pastelid, &hash);
    message.set_seal(hash, signature);
    serde_json::to_value(&*message).map_err(|e| Error::Serialization(e.to_string()))
}

/// A client wired to a [`MockNetwork`].
pub struct TestHarness {
    /// Scripted supernodes.
    pub network: Arc<MockNetwork>,
    /// Burn recorder.
    pub wallet: Arc<MockWallet>,
    /// Persisted artifacts.
    pub store: Arc<MemoryArtifactStore>,
    /// Client under test.
    pub client: CreditPackClient,
}

impl TestHarness {
    /// Client over `node_count` healthy supernodes.
    pub fn new(node_count: usize) -> Self {
        Self::with_config(node_count, |_| {})
    }

    /// Like [`Self::new`], with `tweak` applied to the configuration.
    pub fn with_config(node_count: usize, tweak: impl FnOnce(&mut ClientConfig)) -> Self {
        let mut config = ClientConfig::testnet();
        config.pastelid = Some(REQUESTER.to_string());
        config.supernode_api_port = API_PORT;
        config.pricing.target_value_per_credit_usd = 0.0036;
        config.pricing.target_profit_margin = 0.1;
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 5;
        tweak(&mut config);

        let network = MockNetwork::new(node_count);
        let wallet = Arc::new(MockWallet::default());
        let store = Arc::new(MemoryArtifactStore::new());
        let parts = ClientParts {
            transport: Arc::clone(&network) as Arc<dyn SupernodeTransport>,
            source: Arc::clone(&network) as Arc<dyn DirectorySource>,
            chain: Arc::new(MockChain),
            signer: Arc::new(TestSigner),
            wallet: Arc::clone(&wallet) as Arc<dyn Wallet>,
            oracle: Arc::new(StaticPriceOracle(PSL_USD)),
            store: Arc::clone(&store) as Arc<dyn pastel_credit_client::ArtifactStore>,
        };
        let client = CreditPackClient::with_parts(config, parts).expect("client");
        Self {
            network,
            wallet,
            store,
            client,
        }
    }
}
