//! Challenge-response authentication.
//!
//! Every authenticated call fetches a fresh challenge from the peer, signs the
//! raw challenge text and attaches the triple to the request body. Challenges
//! are never cached: [`AuthenticatedChallenge`] is consumed when attached.

use crate::error::{Error, Result};
use crate::protocol::{Endpoint, CHALLENGE_PATH};
use crate::transport::SupernodeTransport;
use crate::wallet::Signer;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct IssuedChallenge {
    challenge: String,
    challenge_id: String,
}

/// A signed, single-use challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedChallenge {
    /// Challenge text issued by the peer.
    pub challenge: String,
    /// Peer's identifier for the challenge.
    pub challenge_id: String,
    /// Local signature over the challenge text.
    pub signature: String,
}

impl AuthenticatedChallenge {
    /// Move the triple into a request body.
    pub fn attach(self, body: &mut Map<String, Value>) {
        body.insert("challenge".to_string(), Value::String(self.challenge));
        body.insert("challenge_id".to_string(), Value::String(self.challenge_id));
        body.insert(
            "challenge_signature".to_string(),
            Value::String(self.signature),
        );
    }
}

/// Obtains and signs peer challenges.
#[derive(Clone)]
pub struct ChallengeAuthenticator {
    transport: Arc<dyn SupernodeTransport>,
    signer: Arc<dyn Signer>,
    timeout: Duration,
}

impl ChallengeAuthenticator {
    /// Create an authenticator whose requests time out after `timeout`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn SupernodeTransport>,
        signer: Arc<dyn Signer>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            signer,
            timeout,
        }
    }

    /// Fetch a challenge from `peer_url` and sign it as `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the challenge cannot be fetched, is
    /// malformed, or cannot be signed.
    pub async fn authenticate(
        &self,
        peer_url: &str,
        identity: &str,
    ) -> Result<AuthenticatedChallenge> {
        let url = format!("{peer_url}{CHALLENGE_PATH}/{identity}");
        let raw = self
            .transport
            .get_json(&url, self.timeout)
            .await
            .map_err(|e| Error::Auth(format!("challenge request to {peer_url} failed: {e}")))?;
        let issued: IssuedChallenge = serde_json::from_value(raw)
            .map_err(|e| Error::Auth(format!("malformed challenge from {peer_url}: {e}")))?;
        let signature = self
            .signer
            .sign(identity, &issued.challenge)
            .await
            .map_err(|e| Error::Auth(format!("failed to sign challenge: {e}")))?;
        debug!("Signed challenge {} from {peer_url}", issued.challenge_id);
        Ok(AuthenticatedChallenge {
            challenge: issued.challenge,
            challenge_id: issued.challenge_id,
            signature,
        })
    }

    /// Authenticate, then POST `payload` under the endpoint's key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if authentication fails and
    /// [`Error::Network`] if the POST fails.
    pub async fn post(
        &self,
        peer_url: &str,
        identity: &str,
        endpoint: Endpoint,
        payload: Value,
    ) -> Result<Value> {
        let challenge = self.authenticate(peer_url, identity).await?;
        let mut body = Map::new();
        body.insert(endpoint.payload_key.to_string(), payload);
        challenge.attach(&mut body);
        let url = format!("{peer_url}{}", endpoint.path);
        self.transport
            .post_json(&url, &Value::Object(body), self.timeout)
            .await
    }
}

impl std::fmt::Debug for ChallengeAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeAuthenticator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
