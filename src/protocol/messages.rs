//! Wire messages of the credit pack purchase protocol.
//!
//! Rust field names are short; `#[serde(rename)]` maps them onto the wire
//! names both sides hash. Every sealed message carries its own field hash and
//! the issuer's signature over that hash, described by [`SignedMessage`].

use crate::error::ValidationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version string stamped on every message this client issues.
pub const MESSAGE_VERSION: &str = "1.0";

/// A message sealed by a field hash and a signature over it.
pub trait SignedMessage: Serialize + DeserializeOwned + Send + Sync {
    /// Human-readable message name for logs and errors.
    const KIND: &'static str;
    /// Wire name of the message's own field hash.
    const HASH_FIELD: &'static str;
    /// Wire name of the signature over the field hash.
    const SIGNATURE_FIELD: &'static str;

    /// Declared field hash.
    fn field_hash(&self) -> &str;
    /// Declared signature.
    fn signature(&self) -> &str;
    /// Identifier of the party that signed.
    fn signer(&self) -> &str;
    /// Embedded UTC timestamp text.
    fn timestamp(&self) -> &str;
    /// Embedded block height.
    fn block_height(&self) -> u64;
    /// Store a freshly computed hash and signature.
    fn set_seal(&mut self, field_hash: String, signature: String);
}

macro_rules! signed_message {
    ($ty:ty, $kind:literal, $hash:literal, $sig:literal, signer = $signer:ident) => {
        impl SignedMessage for $ty {
            const KIND: &'static str = $kind;
            const HASH_FIELD: &'static str = $hash;
            const SIGNATURE_FIELD: &'static str = $sig;

            fn field_hash(&self) -> &str {
                &self.field_hash
            }

            fn signature(&self) -> &str {
                &self.signature
            }

            fn signer(&self) -> &str {
                &self.$signer
            }

            fn timestamp(&self) -> &str {
                &self.timestamp
            }

            fn block_height(&self) -> u64 {
                self.block_height
            }

            fn set_seal(&mut self, field_hash: String, signature: String) {
                self.field_hash = field_hash;
                self.signature = signature;
            }
        }
    };
}

/// Initial purchase request from the end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    /// Requesting user.
    #[serde(rename = "requesting_end_user_pastelid")]
    pub requester_pastelid: String,
    /// Number of credits requested.
    #[serde(rename = "requested_initial_credits_in_credit_pack")]
    pub requested_credits: u64,
    /// JSON array text of identifiers allowed to spend the pack.
    #[serde(rename = "list_of_authorized_pastelids_allowed_to_use_credit_pack")]
    pub authorized_pastelids: String,
    /// Address credit usage is tracked against.
    #[serde(rename = "credit_usage_tracking_psl_address")]
    pub tracking_address: String,
    /// Creation time.
    #[serde(rename = "request_timestamp_utc_iso_string")]
    pub timestamp: String,
    /// Block height snapshot at creation.
    #[serde(rename = "request_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "credit_purchase_request_message_version_string")]
    pub version: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub field_hash: String,
    /// Requester signature over the field hash.
    #[serde(rename = "requesting_end_user_pastelid_signature_on_request_hash")]
    pub signature: String,
}

signed_message!(
    PurchaseRequest,
    "purchase request",
    "sha3_256_hash_of_credit_pack_purchase_request_fields",
    "requesting_end_user_pastelid_signature_on_request_hash",
    signer = requester_pastelid
);

impl PurchaseRequest {
    /// Draft an unsealed request authorizing only the requester.
    #[must_use]
    pub fn draft(
        requester_pastelid: &str,
        requested_credits: u64,
        tracking_address: &str,
        block_height: u64,
    ) -> Self {
        Self {
            requester_pastelid: requester_pastelid.to_string(),
            requested_credits,
            authorized_pastelids: Value::from(vec![requester_pastelid]).to_string(),
            tracking_address: tracking_address.to_string(),
            timestamp: utc_timestamp(),
            block_height,
            version: MESSAGE_VERSION.to_string(),
            field_hash: String::new(),
            signature: String::new(),
        }
    }
}

/// Supernode refusal of a purchase request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Hash of the rejected request.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Base64 JSON of the request fields.
    #[serde(rename = "credit_pack_purchase_request_fields_json_b64")]
    pub request_fields_b64: String,
    /// Why the request was rejected.
    #[serde(rename = "rejection_reason_string")]
    pub reason: String,
    /// Rejection time.
    #[serde(rename = "rejection_timestamp_utc_iso_string")]
    pub timestamp: String,
    /// Block height at rejection.
    #[serde(rename = "rejection_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "credit_purchase_request_rejection_message_version_string")]
    pub version: String,
    /// Rejecting supernode.
    #[serde(rename = "responding_supernode_pastelid")]
    pub supernode_pastelid: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_rejection_fields")]
    pub field_hash: String,
    /// Supernode signature over the field hash.
    #[serde(rename = "responding_supernode_signature_on_credit_pack_purchase_request_rejection_hash")]
    pub signature: String,
}

signed_message!(
    Rejection,
    "purchase rejection",
    "sha3_256_hash_of_credit_pack_purchase_request_rejection_fields",
    "responding_supernode_signature_on_credit_pack_purchase_request_rejection_hash",
    signer = supernode_pastelid
);

/// Supernode's preliminary price quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreliminaryPriceQuote {
    /// Hash of the quoted request.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Tracking address copied from the request.
    #[serde(rename = "credit_usage_tracking_psl_address")]
    pub tracking_address: String,
    /// Base64 JSON of the request fields.
    #[serde(rename = "credit_pack_purchase_request_fields_json_b64")]
    pub request_fields_b64: String,
    /// Quoted price of one credit in PSL.
    #[serde(rename = "preliminary_quoted_price_per_credit_in_psl")]
    pub price_per_credit: f64,
    /// Quoted price of the whole pack in PSL.
    #[serde(rename = "preliminary_total_cost_of_credit_pack_in_psl")]
    pub total_cost: f64,
    /// Quote time.
    #[serde(rename = "preliminary_price_quote_timestamp_utc_iso_string")]
    pub timestamp: String,
    /// Block height at quote time.
    #[serde(rename = "preliminary_price_quote_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "preliminary_price_quote_message_version_string")]
    pub version: String,
    /// Quoting supernode.
    #[serde(rename = "responding_supernode_pastelid")]
    pub supernode_pastelid: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_preliminary_price_quote_fields")]
    pub field_hash: String,
    /// Supernode signature over the field hash.
    #[serde(
        rename = "responding_supernode_signature_on_credit_pack_purchase_request_preliminary_price_quote_hash"
    )]
    pub signature: String,
}

signed_message!(
    PreliminaryPriceQuote,
    "preliminary price quote",
    "sha3_256_hash_of_credit_pack_purchase_request_preliminary_price_quote_fields",
    "responding_supernode_signature_on_credit_pack_purchase_request_preliminary_price_quote_hash",
    signer = supernode_pastelid
);

/// End user's answer to a preliminary price quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuoteResponse {
    /// Hash of the original request.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Hash of the quote being answered.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_preliminary_price_quote_fields")]
    pub quote_hash: String,
    /// Base64 JSON of the request fields.
    #[serde(rename = "credit_pack_purchase_request_fields_json_b64")]
    pub request_fields_b64: String,
    /// Whether the requester accepts the quote.
    #[serde(rename = "agree_with_preliminary_price_quote", with = "bool_as_int")]
    pub agree: bool,
    /// Tracking address copied from the quote.
    #[serde(rename = "credit_usage_tracking_psl_address")]
    pub tracking_address: String,
    /// Price per credit being answered.
    #[serde(rename = "preliminary_quoted_price_per_credit_in_psl")]
    pub price_per_credit: f64,
    /// Response time.
    #[serde(rename = "preliminary_price_quote_response_timestamp_utc_iso_string")]
    pub timestamp: String,
    /// Block height at response time.
    #[serde(rename = "preliminary_price_quote_response_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "preliminary_price_quote_response_message_version_string")]
    pub version: String,
    /// Requesting user.
    #[serde(rename = "requesting_end_user_pastelid")]
    pub requester_pastelid: String,
    /// Field hash.
    #[serde(
        rename = "sha3_256_hash_of_credit_pack_purchase_request_preliminary_price_quote_response_fields"
    )]
    pub field_hash: String,
    /// Requester signature over the field hash.
    #[serde(rename = "requesting_end_user_pastelid_signature_on_preliminary_price_quote_response_hash")]
    pub signature: String,
}

signed_message!(
    PriceQuoteResponse,
    "price quote response",
    "sha3_256_hash_of_credit_pack_purchase_request_preliminary_price_quote_response_fields",
    "requesting_end_user_pastelid_signature_on_preliminary_price_quote_response_hash",
    signer = requester_pastelid
);

impl PriceQuoteResponse {
    /// Draft an unsealed answer to `quote`.
    #[must_use]
    pub fn draft(
        request: &PurchaseRequest,
        quote: &PreliminaryPriceQuote,
        agree: bool,
        block_height: u64,
    ) -> Self {
        Self {
            request_hash: request.field_hash.clone(),
            quote_hash: quote.field_hash.clone(),
            request_fields_b64: quote.request_fields_b64.clone(),
            agree,
            tracking_address: quote.tracking_address.clone(),
            price_per_credit: quote.price_per_credit,
            timestamp: utc_timestamp(),
            block_height,
            version: MESSAGE_VERSION.to_string(),
            requester_pastelid: request.requester_pastelid.clone(),
            field_hash: String::new(),
            signature: String::new(),
        }
    }
}

/// Supernode ending a negotiation after the price response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Termination {
    /// Hash of the terminated request.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Base64 JSON of the request fields.
    #[serde(rename = "credit_pack_purchase_request_fields_json_b64")]
    pub request_fields_b64: String,
    /// Why the negotiation ended.
    #[serde(rename = "termination_reason_string")]
    pub reason: String,
    /// Termination time.
    #[serde(rename = "termination_timestamp_utc_iso_string")]
    pub timestamp: String,
    /// Block height at termination.
    #[serde(rename = "termination_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "credit_purchase_request_termination_message_version_string")]
    pub version: String,
    /// Terminating supernode.
    #[serde(rename = "responding_supernode_pastelid")]
    pub supernode_pastelid: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_termination_fields")]
    pub field_hash: String,
    /// Supernode signature over the field hash.
    #[serde(rename = "responding_supernode_signature_on_credit_pack_purchase_request_termination_hash")]
    pub signature: String,
}

signed_message!(
    Termination,
    "purchase termination",
    "sha3_256_hash_of_credit_pack_purchase_request_termination_fields",
    "responding_supernode_signature_on_credit_pack_purchase_request_termination_hash",
    signer = supernode_pastelid
);

/// Signed purchase terms agreed by a quorum of supernodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseResponse {
    /// Hash of the original request.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Base64 JSON of the request fields.
    #[serde(rename = "credit_pack_purchase_request_fields_json_b64")]
    pub request_fields_b64: String,
    /// Agreed price of one credit.
    #[serde(rename = "psl_cost_per_credit")]
    pub price_per_credit: f64,
    /// Agreed total to burn.
    #[serde(rename = "proposed_total_cost_of_credit_pack_in_psl")]
    pub total_cost: f64,
    /// Tracking address.
    #[serde(rename = "credit_usage_tracking_psl_address")]
    pub tracking_address: String,
    /// Response time.
    #[serde(rename = "request_response_timestamp_utc_iso_string")]
    pub timestamp: String,
    /// Block height at response time.
    #[serde(rename = "request_response_pastel_block_height")]
    pub block_height: u64,
    /// Merkle root of the supernode's best block.
    #[serde(rename = "best_block_merkle_root")]
    pub best_block_merkle_root: String,
    /// Height of that best block.
    #[serde(rename = "best_block_height")]
    pub best_block_height: u64,
    /// Message version.
    #[serde(rename = "credit_purchase_request_response_message_version_string")]
    pub version: String,
    /// Responding supernode.
    #[serde(rename = "responding_supernode_pastelid")]
    pub supernode_pastelid: String,
    /// JSON text of blacklisted supernodes.
    #[serde(rename = "list_of_blacklisted_supernode_pastelids", deserialize_with = "json_text")]
    pub blacklisted: String,
    /// JSON text of supernodes asked to agree.
    #[serde(rename = "list_of_potentially_agreeing_supernodes", deserialize_with = "json_text")]
    pub potentially_agreeing: String,
    /// JSON text of supernodes that agreed.
    #[serde(
        rename = "list_of_supernode_pastelids_agreeing_to_credit_pack_purchase_terms",
        deserialize_with = "json_text"
    )]
    pub agreeing: String,
    /// JSON text of agreeing supernodes whose signatures are included.
    #[serde(
        rename = "list_of_supernode_pastelids_agreeing_to_credit_pack_purchase_terms_selected_for_signature_inclusion",
        deserialize_with = "json_text"
    )]
    pub selected_for_signature: String,
    /// JSON text of the selected supernodes' signatures.
    #[serde(rename = "selected_agreeing_supernodes_signatures_dict", deserialize_with = "json_text")]
    pub agreeing_signatures: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_response_fields")]
    pub field_hash: String,
    /// Supernode signature over the field hash.
    #[serde(rename = "responding_supernode_signature_on_credit_pack_purchase_request_response_hash")]
    pub signature: String,
}

signed_message!(
    PurchaseResponse,
    "purchase response",
    "sha3_256_hash_of_credit_pack_purchase_request_response_fields",
    "responding_supernode_signature_on_credit_pack_purchase_request_response_hash",
    signer = supernode_pastelid
);

impl PurchaseResponse {
    /// Identifiers of the supernodes that agreed to the terms.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Schema`] if the list is not a JSON string array.
    pub fn agreeing_supernodes(&self) -> Result<Vec<String>, ValidationError> {
        serde_json::from_str(&self.agreeing).map_err(|e| ValidationError::Schema {
            message: Self::KIND,
            detail: format!("agreeing supernode list: {e}"),
        })
    }
}

/// End user's proof of burn payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    /// Hash of the original request.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Hash of the purchase response being confirmed.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_response_fields")]
    pub response_hash: String,
    /// Base64 JSON of the request fields.
    #[serde(rename = "credit_pack_purchase_request_fields_json_b64")]
    pub request_fields_b64: String,
    /// Requesting user.
    #[serde(rename = "requesting_end_user_pastelid")]
    pub requester_pastelid: String,
    /// Burn transaction id.
    #[serde(rename = "txid_of_credit_purchase_burn_transaction")]
    pub burn_txid: String,
    /// Confirmation time.
    #[serde(rename = "credit_purchase_request_confirmation_utc_iso_string")]
    pub timestamp: String,
    /// Block height at confirmation.
    #[serde(rename = "credit_purchase_request_confirmation_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "credit_purchase_request_confirmation_message_version_string")]
    pub version: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_confirmation_fields")]
    pub field_hash: String,
    /// Requester signature over the field hash.
    #[serde(
        rename = "requesting_end_user_pastelid_signature_on_sha3_256_hash_of_credit_pack_purchase_request_confirmation_fields"
    )]
    pub signature: String,
}

signed_message!(
    Confirmation,
    "purchase confirmation",
    "sha3_256_hash_of_credit_pack_purchase_request_confirmation_fields",
    "requesting_end_user_pastelid_signature_on_sha3_256_hash_of_credit_pack_purchase_request_confirmation_fields",
    signer = requester_pastelid
);

impl Confirmation {
    /// Draft an unsealed confirmation of `response` paid by `burn_txid`.
    #[must_use]
    pub fn draft(
        request: &PurchaseRequest,
        response: &PurchaseResponse,
        burn_txid: &str,
        block_height: u64,
    ) -> Self {
        Self {
            request_hash: request.field_hash.clone(),
            response_hash: response.field_hash.clone(),
            request_fields_b64: response.request_fields_b64.clone(),
            requester_pastelid: request.requester_pastelid.clone(),
            burn_txid: burn_txid.to_string(),
            timestamp: utc_timestamp(),
            block_height,
            version: MESSAGE_VERSION.to_string(),
            field_hash: String::new(),
            signature: String::new(),
        }
    }
}

/// Supernode acknowledgement of a confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    /// Hash of the original request.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Hash of the confirmation acknowledged.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_confirmation_fields")]
    pub confirmation_hash: String,
    /// Outcome text, `success` when the ticket was registered.
    #[serde(rename = "credit_pack_confirmation_outcome_string")]
    pub outcome: String,
    /// Registration txid of the credit pack ticket.
    #[serde(rename = "pastel_api_credit_pack_ticket_registration_txid")]
    pub registration_txid: String,
    /// Failure reason, if any.
    #[serde(rename = "credit_pack_confirmation_failure_reason_if_applicable", default)]
    pub failure_reason: Option<String>,
    /// Response time.
    #[serde(rename = "credit_purchase_request_confirmation_response_utc_iso_string")]
    pub timestamp: String,
    /// Block height at response time.
    #[serde(rename = "credit_purchase_request_confirmation_response_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "credit_purchase_request_confirmation_response_message_version_string")]
    pub version: String,
    /// Responding supernode.
    #[serde(rename = "responding_supernode_pastelid")]
    pub supernode_pastelid: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_confirmation_response_fields")]
    pub field_hash: String,
    /// Supernode signature over the field hash.
    #[serde(
        rename = "responding_supernode_signature_on_credit_pack_purchase_request_confirmation_response_hash"
    )]
    pub signature: String,
}

signed_message!(
    ConfirmationResponse,
    "confirmation response",
    "sha3_256_hash_of_credit_pack_purchase_request_confirmation_response_fields",
    "responding_supernode_signature_on_credit_pack_purchase_request_confirmation_response_hash",
    signer = supernode_pastelid
);

/// Status query for a purchase request. Signed over the request hash, not
/// over its own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCheck {
    /// Hash of the request being queried.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Requesting user.
    #[serde(rename = "requesting_end_user_pastelid")]
    pub requester_pastelid: String,
    /// Requester signature over the request hash.
    #[serde(
        rename = "requesting_end_user_pastelid_signature_on_sha3_256_hash_of_credit_pack_purchase_request_fields"
    )]
    pub signature: String,
}

/// Supernode's report on a purchase request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    /// Hash of the queried request.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Hash of the purchase response the status refers to.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_response_fields")]
    pub response_hash: String,
    /// Status keyword.
    pub status: String,
    /// Free-form details.
    pub status_details: String,
    /// Status time.
    #[serde(rename = "status_update_timestamp_utc_iso_string")]
    pub timestamp: String,
    /// Block height at status time.
    #[serde(rename = "status_update_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "credit_purchase_request_status_message_version_string")]
    pub version: String,
    /// Responding supernode.
    #[serde(rename = "responding_supernode_pastelid")]
    pub supernode_pastelid: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_status_fields")]
    pub field_hash: String,
    /// Supernode signature over the field hash.
    #[serde(rename = "responding_supernode_signature_on_credit_pack_purchase_request_status_hash")]
    pub signature: String,
}

signed_message!(
    StatusReply,
    "status reply",
    "sha3_256_hash_of_credit_pack_purchase_request_status_fields",
    "responding_supernode_signature_on_credit_pack_purchase_request_status_hash",
    signer = supernode_pastelid
);

impl StatusReply {
    /// Whether the ticket is stored and registered.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed")
    }
}

/// Request asking another agreeing supernode to store the ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRetryRequest {
    /// Hash of the purchase response.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_response_fields")]
    pub response_hash: String,
    /// Base64 JSON of the request fields.
    #[serde(rename = "credit_pack_purchase_request_fields_json_b64")]
    pub request_fields_b64: String,
    /// Requesting user.
    #[serde(rename = "requesting_end_user_pastelid")]
    pub requester_pastelid: String,
    /// Supernode asked to retry storage.
    #[serde(rename = "closest_agreeing_supernode_to_retry_storage_pastelid")]
    pub retry_supernode_pastelid: String,
    /// Request time.
    #[serde(rename = "credit_pack_storage_retry_request_timestamp_utc_iso_string")]
    pub timestamp: String,
    /// Block height at request time.
    #[serde(rename = "credit_pack_storage_retry_request_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "credit_pack_storage_retry_request_message_version_string")]
    pub version: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_storage_retry_request_fields")]
    pub field_hash: String,
    /// Requester signature over the field hash.
    #[serde(rename = "requesting_end_user_pastelid_signature_on_credit_pack_storage_retry_request_hash")]
    pub signature: String,
}

signed_message!(
    StorageRetryRequest,
    "storage retry request",
    "sha3_256_hash_of_credit_pack_storage_retry_request_fields",
    "requesting_end_user_pastelid_signature_on_credit_pack_storage_retry_request_hash",
    signer = requester_pastelid
);

impl StorageRetryRequest {
    /// Draft an unsealed retry request addressed to `retry_supernode`.
    #[must_use]
    pub fn draft(
        response: &PurchaseResponse,
        requester_pastelid: &str,
        retry_supernode: &str,
        block_height: u64,
    ) -> Self {
        Self {
            response_hash: response.field_hash.clone(),
            request_fields_b64: response.request_fields_b64.clone(),
            requester_pastelid: requester_pastelid.to_string(),
            retry_supernode_pastelid: retry_supernode.to_string(),
            timestamp: utc_timestamp(),
            block_height,
            version: MESSAGE_VERSION.to_string(),
            field_hash: String::new(),
            signature: String::new(),
        }
    }
}

/// Fallback supernode's storage outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRetryResponse {
    /// Hash of the original request.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_fields")]
    pub request_hash: String,
    /// Hash of the confirmation the storage refers to.
    #[serde(rename = "sha3_256_hash_of_credit_pack_purchase_request_confirmation_fields")]
    pub confirmation_hash: String,
    /// Outcome text, `success` when the ticket was registered.
    #[serde(rename = "credit_pack_storage_retry_confirmation_outcome_string")]
    pub outcome: String,
    /// Registration txid of the credit pack ticket.
    #[serde(rename = "pastel_api_credit_pack_ticket_registration_txid")]
    pub registration_txid: String,
    /// Failure reason, if any.
    #[serde(rename = "credit_pack_storage_retry_confirmation_failure_reason_if_applicable", default)]
    pub failure_reason: Option<String>,
    /// Response time.
    #[serde(rename = "credit_pack_storage_retry_confirmation_response_utc_iso_string")]
    pub timestamp: String,
    /// Block height at response time.
    #[serde(rename = "credit_pack_storage_retry_confirmation_response_pastel_block_height")]
    pub block_height: u64,
    /// Message version.
    #[serde(rename = "credit_pack_storage_retry_confirmation_response_message_version_string")]
    pub version: String,
    /// Supernode that performed the retry.
    #[serde(rename = "closest_agreeing_supernode_to_retry_storage_pastelid")]
    pub retry_supernode_pastelid: String,
    /// Field hash.
    #[serde(rename = "sha3_256_hash_of_credit_pack_storage_retry_confirmation_response_fields")]
    pub field_hash: String,
    /// Supernode signature over the field hash.
    #[serde(
        rename = "closest_agreeing_supernode_to_retry_storage_pastelid_signature_on_credit_pack_storage_retry_confirmation_response_hash"
    )]
    pub signature: String,
}

signed_message!(
    StorageRetryResponse,
    "storage retry response",
    "sha3_256_hash_of_credit_pack_storage_retry_confirmation_response_fields",
    "closest_agreeing_supernode_to_retry_storage_pastelid_signature_on_credit_pack_storage_retry_confirmation_response_hash",
    signer = retry_supernode_pastelid
);

/// Whether a storage or confirmation outcome string reports success.
#[must_use]
pub fn is_success_outcome(outcome: &str) -> bool {
    outcome.eq_ignore_ascii_case("success")
}

/// Current UTC time in the protocol's timestamp format.
#[must_use]
pub fn utc_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Format `at` as `YYYY-MM-DDTHH:MM:SS.mmm+00:00`.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3f+00:00").to_string()
}

/// Parse a protocol timestamp. Offsetless timestamps are read as UTC.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Decode a `credit_pack_purchase_request_fields_json_b64` payload.
///
/// # Errors
///
/// Returns [`ValidationError::Schema`] if the payload is not base64 JSON.
pub fn decode_request_fields(encoded: &str, message: &'static str) -> Result<Value, ValidationError> {
    let schema = |detail: String| ValidationError::Schema { message, detail };
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| schema(format!("request fields are not base64: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| schema(format!("request fields are not JSON: {e}")))
}

/// Encode request fields the way supernodes embed them.
#[must_use]
pub fn encode_request_fields(fields: &Value) -> String {
    STANDARD.encode(super::canonical::canonical_json(fields))
}

fn json_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        other => other.to_string(),
    })
}

mod bool_as_int {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(b) => Ok(b),
            Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "1" | "true" => Ok(true),
                "0" | "false" => Ok(false),
                other => Err(D::Error::custom(format!("not a boolean: {other}"))),
            },
            other => Err(D::Error::custom(format!("not a boolean: {other}"))),
        }
    }
}
