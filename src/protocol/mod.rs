//! Supernode wire protocol.
//!
//! Messages are JSON objects posted over HTTP. Every authenticated POST wraps
//! its payload under an endpoint-specific key next to the challenge triple.

pub mod canonical;
pub mod messages;
pub mod replies;

pub use canonical::{canonical_json, field_hash, sha3_hex};
pub use messages::{
    Confirmation, ConfirmationResponse, PreliminaryPriceQuote, PriceQuoteResponse,
    PurchaseRequest, PurchaseResponse, Rejection, SignedMessage, StatusCheck, StatusReply,
    StorageRetryRequest, StorageRetryResponse, Termination, MESSAGE_VERSION,
};
pub use replies::{PriceQuoteReply, QuoteReply};

/// An authenticated supernode POST endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Path below the supernode base URL.
    pub path: &'static str,
    /// Body key the payload travels under.
    pub payload_key: &'static str,
}

impl Endpoint {
    const fn new(path: &'static str, payload_key: &'static str) -> Self {
        Self { path, payload_key }
    }
}

/// Liveness probe.
pub const PING_PATH: &str = "/ping";
/// Performance probe returning `performance_ratio_score`.
pub const LIVENESS_PATH: &str = "/liveness_ping";
/// Challenge issue path, followed by the requesting identifier.
pub const CHALLENGE_PATH: &str = "/request_challenge";

/// Initial purchase request.
pub const INITIAL_REQUEST: Endpoint =
    Endpoint::new("/credit_purchase_initial_request", "credit_pack_request");
/// Answer to a preliminary price quote.
pub const PRICE_QUOTE_RESPONSE: Endpoint = Endpoint::new(
    "/credit_purchase_preliminary_price_quote_response",
    "preliminary_price_quote_response",
);
/// Burn confirmation.
pub const CONFIRM: Endpoint = Endpoint::new("/confirm_credit_purchase_request", "confirmation");
/// Completion broadcast to agreeing supernodes.
pub const COMPLETION_ANNOUNCEMENT: Endpoint =
    Endpoint::new("/credit_pack_purchase_completion_announcement", "confirmation");
/// Status query.
pub const STATUS_CHECK: Endpoint = Endpoint::new(
    "/check_status_of_credit_purchase_request",
    "credit_pack_request_status_check",
);
/// Storage retry on a fallback supernode.
pub const STORAGE_RETRY: Endpoint = Endpoint::new("/credit_pack_storage_retry_request", "request");
/// Broadcast of a storage retry outcome.
pub const STORAGE_RETRY_ANNOUNCEMENT: Endpoint = Endpoint::new(
    "/credit_pack_storage_retry_completion_announcement",
    "response",
);

/// Valid credit pack tickets of an identifier (flat `pastelid` field).
pub const VALID_TICKETS: Endpoint =
    Endpoint::new("/get_valid_credit_pack_tickets_for_pastelid", "pastelid");
/// Remaining balance of a credit pack (flat `credit_pack_ticket_txid` field).
pub const CREDIT_PACK_BALANCE: Endpoint =
    Endpoint::new("/check_credit_pack_balance", "credit_pack_ticket_txid");
/// Ticket lookup by burn txid (flat `purchase_burn_txid` field).
pub const TICKET_FROM_BURN_TXID: Endpoint = Endpoint::new(
    "/retrieve_credit_pack_ticket_from_purchase_burn_txid",
    "purchase_burn_txid",
);
/// Final registration txid lookup by burn txid (flat `purchase_burn_txid` field).
pub const FINAL_REGISTRATION_TXID: Endpoint = Endpoint::new(
    "/get_final_credit_pack_registration_txid_from_credit_purchase_burn_txid",
    "purchase_burn_txid",
);
