//! Supernode discovery and closest-peer routing.

pub mod cache;
pub mod directory;
pub mod distance;
pub mod selector;

pub use directory::{
    DirectorySource, FilterParams, FilterStats, FilteredPeer, SupernodeDirectory, SupernodeRecord,
    SupernodeStatus,
};
pub use distance::{identifier_digest, xor_distance, XorDistance};
pub use selector::{PeerSelector, RankedPeer};
