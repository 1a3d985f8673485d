//! End-to-end tests for pastel-credit-client.
//!
//! Each test wires a real [`CreditPackClient`] to an in-memory supernode
//! network and drives whole purchases through it.
//!
//! ## Architecture
//!
//! ```text
//! TestHarness
//!     ├── CreditPackClient (under test)
//!     ├── MockNetwork (supernodes at 10.0.0.n:7123)
//!     │       ├── SupernodeTransport: ping, liveness, challenges, protocol POSTs
//!     │       └── DirectorySource: the supernode list
//!     ├── MockWallet (fixed height, records burns)
//!     ├── MockChain (merkle roots)
//!     └── MemoryArtifactStore
//! ```
//!
//! [`CreditPackClient`]: pastel_credit_client::CreditPackClient

mod harness;

#[cfg(test)]
mod peer_selection;
#[cfg(test)]
mod purchase_flow;

pub use harness::{MockNetwork, NodeBehaviour, TestHarness};
