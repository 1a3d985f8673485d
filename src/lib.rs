//! # pastel-credit-client
//!
//! Client-side coordinator for buying credit packs from Pastel supernodes.
//!
//! The crate covers four concerns:
//! - Supernode discovery: liveness and performance filtering with a TTL
//!   cache, then XOR-distance ranking against a target identifier
//! - Challenge-response authentication on every supernode call
//! - The purchase state machine: quote, price agreement, burn payment,
//!   confirmation, completion broadcast, status polling and storage retry
//! - Field-hash and signature validation of every protocol message
//!
//! ## Architecture
//!
//! External systems sit behind traits so each can be swapped or mocked:
//! - [`transport::SupernodeTransport`] for supernode HTTP calls
//! - [`wallet::Signer`] and [`wallet::Wallet`] for pasteld
//! - [`chain::ChainReader`] and [`routing::DirectorySource`] for the OpenNode API
//! - [`market::PriceOracle`] for the PSL market price
//! - [`storage::ArtifactStore`] for persisted protocol messages
//!
//! [`CreditPackClient`] wires them together once per process.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pastel_credit_client::{ClientConfig, CreditPackClient, PriceCeilings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ClientConfig::testnet();
//!     config.pastelid = Some("jX...".to_string());
//!     let client = CreditPackClient::connect(config).await?;
//!     let estimate = client.estimate_purchase_cost(100, 0.1).await?;
//!     let report = client
//!         .purchase_credit_pack(100, "tP...", PriceCeilings::total(estimate))
//!         .await?;
//!     println!("{:?}", report.outcome);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod integrity;
pub mod market;
pub mod policy;
pub mod protocol;
pub mod purchase;
pub mod routing;
pub mod storage;
pub mod transport;
pub mod wallet;

pub use auth::{AuthenticatedChallenge, ChallengeAuthenticator};
pub use chain::{ChainReader, OpenNodeApi};
pub use client::{ClientParts, CreditPackBalance, CreditPackClient, CreditPackTicket};
pub use config::{ClientConfig, NetworkKind};
pub use error::{Error, FailureKind, Result, ValidationError};
pub use identity::PastelId;
pub use integrity::IntegrityValidator;
pub use market::{CoinGeckoOracle, PriceOracle, StaticPriceOracle};
pub use policy::RetryPolicy;
pub use purchase::{
    PriceCeilings, PurchaseNegotiator, PurchaseOutcome, PurchaseReceipt, PurchaseReport,
    PurchaseState, RetryCoordinator,
};
pub use routing::{FilteredPeer, PeerSelector, SupernodeDirectory, XorDistance};
pub use storage::{ArtifactStore, DiskArtifactStore, MemoryArtifactStore};
pub use transport::{HttpTransport, SupernodeTransport};
pub use wallet::{PasteldRpc, Signer, Wallet};
