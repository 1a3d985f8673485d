//! Error types for pastel-credit-client.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a terminal failure.
///
/// Lets a caller tell "no capacity / unreachable" apart from "counterparty
/// declined" and "data integrity violation" without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network unreachable, peers exhausted or nothing to talk to.
    Unavailable,
    /// A supernode (or the local price check) declined the purchase.
    Declined,
    /// A message failed hash, signature, freshness or binding checks.
    Integrity,
    /// Local misconfiguration, wallet, storage or serialization failure.
    Local,
}

/// Reasons a protocol message is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Message is not shaped like the expected type.
    #[error("malformed {message}: {detail}")]
    Schema {
        /// Message type name.
        message: &'static str,
        /// What was wrong.
        detail: String,
    },

    /// Declared field hash differs from the recomputed one.
    #[error("field hash mismatch on {message}: declared {declared}, computed {computed}")]
    HashMismatch {
        /// Message type name.
        message: &'static str,
        /// Hash carried in the message.
        declared: String,
        /// Hash recomputed locally.
        computed: String,
    },

    /// Signature does not verify against the declared signer.
    #[error("invalid signature on {message} from {signer}")]
    BadSignature {
        /// Message type name.
        message: &'static str,
        /// Declared signer identifier.
        signer: String,
    },

    /// Embedded timestamp is missing, unparseable or too far from local time.
    #[error("stale timestamp on {message}: {detail}")]
    StaleTimestamp {
        /// Message type name.
        message: &'static str,
        /// Skew or parse failure.
        detail: String,
    },

    /// Embedded block height deviates from the local chain view.
    #[error("block height drift on {message}: embedded {embedded}, local {local}, tolerance {tolerance}")]
    BlockHeightDrift {
        /// Message type name.
        message: &'static str,
        /// Height carried in the message.
        embedded: u64,
        /// Locally observed height.
        local: u64,
        /// Allowed difference in blocks.
        tolerance: u64,
    },

    /// Message answers a different request than the one in flight.
    #[error("{message} does not match the request in flight: {detail}")]
    Mismatch {
        /// Message type name.
        message: &'static str,
        /// Which binding failed.
        detail: String,
    },

    /// Identifier is not a well-formed PastelID.
    #[error("invalid PastelID: {0}")]
    InvalidPastelId(String),
}

/// Errors that can occur in pastel-credit-client.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Timeout, refused connection or non-2xx reply.
    #[error("network error: {0}")]
    Network(String),

    /// Protocol message failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Challenge fetch or challenge signing failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Supernode rejected the purchase request.
    #[error("purchase rejected: {0}")]
    Rejected(String),

    /// Supernode terminated the purchase after the price response.
    #[error("purchase terminated: {0}")]
    Terminated(String),

    /// Every fallback peer was tried without success.
    #[error("storage retry exhausted after {attempts} attempt(s): {last_error}")]
    RetryExhausted {
        /// Number of peers tried.
        attempts: usize,
        /// Error returned by the last peer tried.
        last_error: Box<Error>,
    },

    /// No supernode satisfied the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// Signing engine or wallet RPC failure.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// Price feed or price evaluation failure.
    #[error("pricing error: {0}")]
    Pricing(String),

    /// Local artifact storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Purchase state machine driven out of order.
    #[error("invalid purchase state transition: {0}")]
    InvalidTransition(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Classify this error for callers deciding whether to retry.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) | Self::Auth(_) | Self::NotFound(_) | Self::RetryExhausted { .. } => {
                FailureKind::Unavailable
            }
            Self::Rejected(_) | Self::Terminated(_) => FailureKind::Declined,
            Self::Validation(_) => FailureKind::Integrity,
            Self::Config(_)
            | Self::Wallet(_)
            | Self::Pricing(_)
            | Self::Storage(_)
            | Self::InvalidTransition(_)
            | Self::Io(_)
            | Self::Serialization(_) => FailureKind::Local,
        }
    }

    /// Whether this error came from a failed message check.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
