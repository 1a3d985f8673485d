//! Directory filtering, closest-peer routing and ticket queries.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{TestHarness, REQUESTER};
use pastel_credit_client::protocol;
use pastel_credit_client::routing::FilterParams;
use pastel_credit_client::{Error, PeerSelector};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_closest_supernode_follows_xor_ranking() {
    let harness = TestHarness::new(8);
    let ranked = harness.network.ranked_ids();

    let peer = harness
        .client
        .find_closest_supernode(REQUESTER)
        .await
        .expect("closest");

    assert_eq!(peer.pastelid, ranked[0]);
    assert_eq!(peer.url, harness.network.url_of(&ranked[0]));
    assert!(peer.performance_score >= 0.75);
}

#[tokio::test]
async fn test_unreachable_nodes_are_filtered_out() {
    let harness = TestHarness::new(5);
    let ids = harness.network.ids();
    harness.network.configure(&ids[1], |node| node.reachable = false);
    harness.network.configure(&ids[3], |node| node.reachable = false);

    let peers = harness.client.directory().filtered().await.expect("filter");
    let kept: Vec<&str> = peers.iter().map(|p| p.pastelid.as_str()).collect();
    assert_eq!(kept, vec![ids[0].as_str(), ids[2].as_str(), ids[4].as_str()]);
}

#[tokio::test]
async fn test_filter_stats_and_cache() {
    let harness = TestHarness::new(5);
    let ids = harness.network.ids();
    harness.network.configure(&ids[0], |node| node.reachable = false);

    let directory = harness.client.directory();
    let records = directory.refresh().await.expect("refresh");
    let params = FilterParams::from_config(harness.client.config());

    let (peers, stats) = directory.filter(&records, &params).await;
    assert_eq!(peers.len(), 4);
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.removed_ping, 1);

    let (cached, cached_stats) = directory.filter(&records, &params).await;
    assert_eq!(cached.len(), 4);
    assert_eq!(cached_stats.processed, 0);
}

#[tokio::test]
async fn test_closest_n_skips_nodes_that_went_down() {
    let harness = TestHarness::new(5);
    let ranked = harness.network.ranked_ids();
    let directory = Arc::clone(harness.client.directory());
    let peers = directory.filtered().await.expect("filter");
    assert_eq!(peers.len(), 5);

    harness.network.configure(&ranked[0], |node| node.reachable = false);
    harness.network.configure(&ranked[2], |node| node.reachable = false);

    let selector = PeerSelector::new(directory);
    let chosen = selector
        .closest_n(3, REQUESTER, &peers)
        .await
        .expect("closest three");
    let chosen: Vec<&str> = chosen.iter().map(|p| p.pastelid.as_str()).collect();
    assert_eq!(
        chosen,
        vec![ranked[1].as_str(), ranked[3].as_str(), ranked[4].as_str()]
    );
}

#[tokio::test]
async fn test_no_reachable_supernode_is_not_found() {
    let harness = TestHarness::new(3);
    harness.network.configure_all(|node| node.reachable = false);

    let err = harness
        .client
        .find_closest_supernode(REQUESTER)
        .await
        .expect_err("nothing reachable");
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_ticket_queries_are_challenge_authenticated() {
    let harness = TestHarness::new(4);
    let ranked = harness.network.ranked_ids();

    let tickets = harness.client.valid_credit_packs().await.expect("tickets");
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].requesting_end_user_pastelid, REQUESTER);

    let balance = harness
        .client
        .credit_pack_balance("reg-burn-7")
        .await
        .expect("balance");
    assert!((balance.current_balance - 42.5).abs() < f64::EPSILON);

    let txid = harness
        .client
        .final_registration_txid("burn-7")
        .await
        .expect("registration txid");
    assert_eq!(txid, "reg-burn-7");

    let ticket = harness
        .client
        .ticket_from_burn_txid("burn-7")
        .await
        .expect("ticket");
    assert_eq!(ticket["txid_of_credit_purchase_burn_transaction"], json!("burn-7"));

    let calls = harness.network.calls_to(protocol::VALID_TICKETS.path);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].pastelid, ranked[0]);
    assert_eq!(calls[0].body["pastelid"], json!(REQUESTER));
    for key in ["challenge", "challenge_id", "challenge_signature"] {
        assert!(calls[0].body.get(key).is_some(), "missing {key}");
    }
}
