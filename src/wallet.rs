//! Signing and payment collaborators.
//!
//! [`Signer`] and [`Wallet`] are the seams to the local signing engine and the
//! on-chain wallet. [`PasteldRpc`] implements both over the pasteld JSON-RPC
//! interface.

use crate::config::{ClientConfig, NetworkKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Signature scheme PastelIDs sign with.
const PASTELID_ALGORITHM: &str = "ed448";

/// Characters allowed in a base58 PSL address.
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Produces and checks PastelID signatures.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `message` with `identity`'s key.
    async fn sign(&self, identity: &str, message: &str) -> Result<String>;

    /// Check `signature` over `message` against `identity`'s public key.
    async fn verify(&self, identity: &str, message: &str, signature: &str) -> Result<bool>;
}

/// Chain height and burn payments.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Current best block height.
    async fn current_block_height(&self) -> Result<u64>;

    /// Send `amount_psl` to `to_address` and return the transaction id.
    async fn submit_burn_payment(&self, to_address: &str, amount_psl: f64) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    result: Option<Value>,
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    code: i64,
    message: String,
}

/// pasteld JSON-RPC client.
#[derive(Debug, Clone)]
pub struct PasteldRpc {
    url: String,
    user: String,
    password: String,
    passphrase: String,
    client: reqwest::Client,
}

impl PasteldRpc {
    /// Create a client for the RPC endpoint at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, user: &str, password: &str, passphrase: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Wallet(format!("failed to build RPC client: {e}")))?;
        Ok(Self {
            url: url.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            passphrase: passphrase.to_string(),
            client,
        })
    }

    /// Create a client from the `rpc` section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(
            &config.rpc_url(),
            &config.rpc.user,
            &config.rpc.password,
            &config.rpc.pastelid_passphrase,
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        debug!("pasteld RPC {method}");
        let body = json!({
            "jsonrpc": "1.0",
            "id": "pastel-credit",
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Wallet(format!("{method} request failed: {e}")))?;

        // pasteld reports RPC faults with a 500 status and a JSON body.
        let status = response.status();
        let reply: RpcReply = response
            .json()
            .await
            .map_err(|e| Error::Wallet(format!("{method} returned {status}: {e}")))?;
        if let Some(fault) = reply.error {
            return Err(Error::Wallet(format!(
                "{method} failed (code {}): {}",
                fault.code, fault.message
            )));
        }
        let result = reply
            .result
            .ok_or_else(|| Error::Wallet(format!("{method} returned no result")))?;
        serde_json::from_value(result)
            .map_err(|e| Error::Wallet(format!("{method} returned unexpected result: {e}")))
    }
}

#[async_trait]
impl Signer for PasteldRpc {
    async fn sign(&self, identity: &str, message: &str) -> Result<String> {
        let reply: Value = self
            .call(
                "pastelid",
                json!(["sign", message, identity, self.passphrase, PASTELID_ALGORITHM]),
            )
            .await?;
        reply
            .get("signature")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Wallet("pastelid sign returned no signature".to_string()))
    }

    async fn verify(&self, identity: &str, message: &str, signature: &str) -> Result<bool> {
        let reply: Value = self
            .call(
                "pastelid",
                json!(["verify", message, signature, identity, PASTELID_ALGORITHM]),
            )
            .await?;
        Ok(reply.get("verification").and_then(Value::as_str) == Some("OK"))
    }
}

#[async_trait]
impl Wallet for PasteldRpc {
    async fn current_block_height(&self) -> Result<u64> {
        self.call("getblockcount", json!([])).await
    }

    async fn submit_burn_payment(&self, to_address: &str, amount_psl: f64) -> Result<String> {
        let txid: String = self
            .call(
                "sendtoaddress",
                json!([to_address, amount_psl, "credit pack burn", "", false]),
            )
            .await?;
        info!("Burned {amount_psl} PSL to {to_address} in {txid}");
        Ok(txid)
    }
}

/// Validate a transparent PSL address for `network`.
///
/// # Errors
///
/// Returns [`Error::Wallet`] describing the first failed check.
pub fn validate_psl_address(address: &str, network: NetworkKind) -> Result<()> {
    let prefix = network.address_prefix();
    if !address.starts_with(prefix) {
        return Err(Error::Wallet(format!(
            "invalid {network} address: must start with '{prefix}', got: {address}"
        )));
    }

    if !(35..=36).contains(&address.len()) {
        return Err(Error::Wallet(format!(
            "invalid {network} address length: expected 35 or 36 characters, got {}",
            address.len()
        )));
    }

    if let Some(bad) = address.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
        return Err(Error::Wallet(format!(
            "invalid {network} address: contains non-base58 character '{bad}'"
        )));
    }

    Ok(())
}

/// Whether `address` is a well-formed PSL address for `network`.
#[must_use]
pub fn is_valid_psl_address(address: &str, network: NetworkKind) -> bool {
    validate_psl_address(address, network).is_ok()
}
