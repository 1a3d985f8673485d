//! Tagged reply variants.
//!
//! Some endpoints answer with one of two message shapes. The variant is picked
//! from the discriminating field before the body is decoded, so a malformed
//! reply is reported against the shape it claims to be.

use crate::error::ValidationError;
use crate::protocol::messages::{
    PreliminaryPriceQuote, PurchaseResponse, Rejection, SignedMessage, Termination,
};
use serde_json::Value;

/// Reply to the initial purchase request.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteReply {
    /// The supernode quoted a price.
    Quote(PreliminaryPriceQuote),
    /// The supernode refused the request.
    Rejection(Rejection),
}

impl QuoteReply {
    /// Decode a reply, dispatching on `rejection_reason_string`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Schema`] if the body is not an object or
    /// does not match the selected shape.
    pub fn parse(raw: &Value) -> Result<Self, ValidationError> {
        if has_text(raw, "rejection_reason_string") {
            parse(raw).map(Self::Rejection)
        } else {
            parse(raw).map(Self::Quote)
        }
    }
}

/// Reply to a price quote response.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceQuoteReply {
    /// Purchase terms agreed by the quorum.
    Purchase(Box<PurchaseResponse>),
    /// The supernode ended the negotiation.
    Termination(Termination),
}

impl PriceQuoteReply {
    /// Decode a reply, dispatching on `termination_reason_string`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Schema`] if the body is not an object or
    /// does not match the selected shape.
    pub fn parse(raw: &Value) -> Result<Self, ValidationError> {
        if has_text(raw, "termination_reason_string") {
            parse(raw).map(Self::Termination)
        } else {
            parse::<PurchaseResponse>(raw).map(|r| Self::Purchase(Box::new(r)))
        }
    }
}

/// Decode a single message shape.
///
/// # Errors
///
/// Returns [`ValidationError::Schema`] naming the message kind on failure.
pub fn parse<M: SignedMessage>(raw: &Value) -> Result<M, ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::Schema {
            message: M::KIND,
            detail: "expected a JSON object".to_string(),
        });
    }
    M::deserialize(raw).map_err(|e| ValidationError::Schema {
        message: M::KIND,
        detail: e.to_string(),
    })
}

fn has_text(raw: &Value, key: &str) -> bool {
    raw.get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}
