//! Closest-peer selection by XOR distance.

use crate::error::{Error, Result};
use crate::routing::directory::{FilteredPeer, SupernodeDirectory};
use crate::routing::distance::{identifier_digest, XorDistance};
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// A peer with its distance to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPeer {
    /// The filtered peer.
    pub peer: FilteredPeer,
    /// XOR distance to the target identifier.
    pub distance: XorDistance,
}

/// Ranks filtered peers against a target identifier.
#[derive(Debug, Clone)]
pub struct PeerSelector {
    directory: Arc<SupernodeDirectory>,
}

impl PeerSelector {
    /// Create a selector probing through `directory`.
    #[must_use]
    pub fn new(directory: Arc<SupernodeDirectory>) -> Self {
        Self { directory }
    }

    /// Directory backing this selector.
    #[must_use]
    pub fn directory(&self) -> &Arc<SupernodeDirectory> {
        &self.directory
    }

    /// Sort `peers` by ascending distance to `target`. Ties keep input order.
    #[must_use]
    pub fn rank(target: &str, peers: &[FilteredPeer]) -> Vec<RankedPeer> {
        let target = identifier_digest(target);
        let mut ranked: Vec<RankedPeer> = peers
            .iter()
            .map(|peer| RankedPeer {
                distance: XorDistance::between(&target, &identifier_digest(&peer.pastelid)),
                peer: peer.clone(),
            })
            .collect();
        ranked.sort_by(|a, b| a.distance.cmp(&b.distance));
        ranked
    }

    /// Sort plain identifiers by ascending distance to `target`.
    #[must_use]
    pub fn rank_ids<'a>(target: &str, ids: &'a [String]) -> Vec<&'a String> {
        let target = identifier_digest(target);
        let mut ranked: Vec<(XorDistance, &String)> = ids
            .iter()
            .map(|id| (XorDistance::between(&target, &identifier_digest(id)), id))
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0));
        ranked.into_iter().map(|(_, id)| id).collect()
    }

    /// Closest peer to `target`, without a reachability re-check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `peers` is empty.
    pub fn closest(target: &str, peers: &[FilteredPeer]) -> Result<FilteredPeer> {
        Self::rank(target, peers)
            .into_iter()
            .next()
            .map(|ranked| ranked.peer)
            .ok_or_else(|| Error::NotFound(format!("no supernode available for {target}")))
    }

    /// Up to `n` reachable peers closest to `target`, in rank order.
    ///
    /// Candidates are re-probed in batches of the remaining shortfall;
    /// unreachable ones are skipped and the scan moves down the ranking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no candidate is reachable.
    pub async fn closest_n(
        &self,
        n: usize,
        target: &str,
        peers: &[FilteredPeer],
    ) -> Result<Vec<FilteredPeer>> {
        let ranked = Self::rank(target, peers);
        let mut reachable = Vec::with_capacity(n);
        let mut next = 0;
        while reachable.len() < n && next < ranked.len() {
            let batch_end = (next + n - reachable.len()).min(ranked.len());
            let batch = &ranked[next..batch_end];
            let checks = join_all(
                batch
                    .iter()
                    .map(|r| self.directory.is_reachable(&r.peer.url)),
            )
            .await;
            for (candidate, ok) in batch.iter().zip(checks) {
                if ok {
                    reachable.push(candidate.peer.clone());
                } else {
                    debug!("Skipping unreachable supernode {}", candidate.peer.pastelid);
                }
            }
            next = batch_end;
        }
        if reachable.is_empty() {
            return Err(Error::NotFound(format!(
                "no reachable supernode for {target} among {} candidates",
                ranked.len()
            )));
        }
        Ok(reachable)
    }

    /// Filter the directory and return the closest reachable peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if nothing is reachable, or the
    /// directory's refresh error.
    pub async fn find_closest(&self, target: &str) -> Result<FilteredPeer> {
        let peers = self.directory.filtered().await?;
        let mut closest = self.closest_n(1, target, &peers).await?;
        closest
            .pop()
            .ok_or_else(|| Error::NotFound(format!("no supernode available for {target}")))
    }
}
