//! Field hash, signature and freshness checks on protocol messages.
//!
//! Hashes of received messages are recomputed from the JSON exactly as it
//! arrived, never from a re-serialized struct, so fields this client does not
//! model still count toward the hash.

use crate::config::NegotiationConfig;
use crate::error::{Error, Result, ValidationError};
use crate::protocol::canonical;
use crate::protocol::messages::{parse_timestamp, SignedMessage};
use crate::protocol::replies;
use crate::wallet::Signer;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Computes and verifies field hashes and signatures.
#[derive(Clone)]
pub struct IntegrityValidator {
    signer: Arc<dyn Signer>,
    timestamp_tolerance: Duration,
    block_height_tolerance: u64,
}

impl IntegrityValidator {
    /// Create a validator with explicit tolerances.
    #[must_use]
    pub fn new(
        signer: Arc<dyn Signer>,
        timestamp_tolerance: Duration,
        block_height_tolerance: u64,
    ) -> Self {
        Self {
            signer,
            timestamp_tolerance,
            block_height_tolerance,
        }
    }

    /// Create a validator using the negotiation tolerances.
    #[must_use]
    pub fn from_config(signer: Arc<dyn Signer>, config: &NegotiationConfig) -> Self {
        Self::new(
            signer,
            config.timestamp_tolerance(),
            config.block_height_tolerance,
        )
    }

    /// Field hash of a typed message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the message does not serialize to
    /// a JSON object.
    pub fn compute_field_hash<M: SignedMessage>(message: &M) -> Result<String> {
        let value =
            serde_json::to_value(message).map_err(|e| Error::Serialization(e.to_string()))?;
        let object = value.as_object().ok_or_else(|| {
            Error::Serialization(format!("{} is not a JSON object", M::KIND))
        })?;
        Ok(canonical::field_hash(
            object,
            M::HASH_FIELD,
            M::SIGNATURE_FIELD,
        ))
    }

    /// Field hash of a received message body.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Schema`] if `raw` is not a JSON object.
    pub fn compute_raw_field_hash<M: SignedMessage>(
        raw: &Value,
    ) -> std::result::Result<String, ValidationError> {
        let object = as_object::<M>(raw)?;
        Ok(canonical::field_hash(
            object,
            M::HASH_FIELD,
            M::SIGNATURE_FIELD,
        ))
    }

    /// Whether `signature` over `digest` verifies for `signer_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing engine cannot be reached.
    pub async fn verify_signature(
        &self,
        signer_id: &str,
        digest: &str,
        signature: &str,
    ) -> Result<bool> {
        if signature.is_empty() {
            return Ok(false);
        }
        self.signer.verify(signer_id, digest, signature).await
    }

    /// Reject a message whose timestamp is further than `tolerance` from now.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::StaleTimestamp`] on skew or parse failure.
    pub fn verify_timestamp<M: SignedMessage>(
        message: &M,
        tolerance: Duration,
    ) -> std::result::Result<(), ValidationError> {
        Self::verify_timestamp_at(message, tolerance, Utc::now())
    }

    /// [`Self::verify_timestamp`] against an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::StaleTimestamp`] on skew or parse failure.
    pub fn verify_timestamp_at<M: SignedMessage>(
        message: &M,
        tolerance: Duration,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), ValidationError> {
        let stale = |detail: String| ValidationError::StaleTimestamp {
            message: M::KIND,
            detail,
        };
        let at = parse_timestamp(message.timestamp())
            .ok_or_else(|| stale(format!("unparseable timestamp '{}'", message.timestamp())))?;
        let skew = (now - at).num_milliseconds().unsigned_abs();
        let allowed = u64::try_from(tolerance.as_millis()).unwrap_or(u64::MAX);
        if skew > allowed {
            return Err(stale(format!(
                "{} ms from local time, tolerance {} ms",
                skew, allowed
            )));
        }
        Ok(())
    }

    /// Reject a message whose block height is further than `tolerance`
    /// blocks from `current`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::BlockHeightDrift`] when out of range.
    pub fn verify_block_height<M: SignedMessage>(
        message: &M,
        current: u64,
        tolerance: u64,
    ) -> std::result::Result<(), ValidationError> {
        let embedded = message.block_height();
        if embedded.abs_diff(current) > tolerance {
            return Err(ValidationError::BlockHeightDrift {
                message: M::KIND,
                embedded,
                local: current,
                tolerance,
            });
        }
        Ok(())
    }

    /// Sign arbitrary text, such as a request hash, as `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Wallet`] if signing fails.
    pub async fn sign(&self, identity: &str, text: &str) -> Result<String> {
        self.signer
            .sign(identity, text)
            .await
            .map_err(|e| Error::Wallet(format!("failed to sign: {e}")))
    }

    /// Hash `message`, sign the hash as `identity` and store both.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or signing fails.
    pub async fn seal<M: SignedMessage>(&self, message: &mut M, identity: &str) -> Result<()> {
        let digest = Self::compute_field_hash(message)?;
        let signature = self
            .signer
            .sign(identity, &digest)
            .await
            .map_err(|e| Error::Wallet(format!("failed to sign {}: {e}", M::KIND)))?;
        message.set_seal(digest, signature);
        Ok(())
    }

    /// Run every check on an already decoded message: field hash on the raw
    /// body, signature, timestamp, then block height.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] on the first failed check.
    pub async fn check<M: SignedMessage>(
        &self,
        raw: &Value,
        message: &M,
        current_height: u64,
    ) -> Result<()> {
        let computed = Self::compute_raw_field_hash::<M>(raw)?;
        if computed != message.field_hash() {
            return Err(ValidationError::HashMismatch {
                message: M::KIND,
                declared: message.field_hash().to_string(),
                computed,
            }
            .into());
        }

        if !self
            .verify_signature(message.signer(), message.field_hash(), message.signature())
            .await?
        {
            return Err(ValidationError::BadSignature {
                message: M::KIND,
                signer: message.signer().to_string(),
            }
            .into());
        }

        Self::verify_timestamp(message, self.timestamp_tolerance)?;
        Self::verify_block_height(message, current_height, self.block_height_tolerance)?;
        debug!("{} from {} passed validation", M::KIND, message.signer());
        Ok(())
    }

    /// Decode `raw` as `M` and run [`Self::check`] on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if decoding or any check fails.
    pub async fn validate<M: SignedMessage>(&self, raw: &Value, current_height: u64) -> Result<M> {
        let message = replies::parse::<M>(raw)?;
        self.check(raw, &message, current_height).await?;
        Ok(message)
    }
}

impl std::fmt::Debug for IntegrityValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityValidator")
            .field("timestamp_tolerance", &self.timestamp_tolerance)
            .field("block_height_tolerance", &self.block_height_tolerance)
            .finish_non_exhaustive()
    }
}

fn as_object<M: SignedMessage>(
    raw: &Value,
) -> std::result::Result<&Map<String, Value>, ValidationError> {
    raw.as_object().ok_or_else(|| ValidationError::Schema {
        message: M::KIND,
        detail: "expected a JSON object".to_string(),
    })
}
