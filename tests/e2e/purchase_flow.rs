//! Whole purchase attempts against the in-memory network.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{TestHarness, REQUESTER, TRACKING_ADDRESS};
use pastel_credit_client::protocol;
use pastel_credit_client::{Error, NetworkKind, PriceCeilings, PurchaseOutcome, PurchaseState};
use serde_json::json;

const CREDITS: u64 = 100;

fn ceilings() -> PriceCeilings {
    PriceCeilings::total(50.0)
}

#[tokio::test]
async fn test_fair_quote_completes_purchase() {
    let harness = TestHarness::new(6);
    let ranked = harness.network.ranked_ids();

    let report = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect("purchase");

    let PurchaseOutcome::Completed(receipt) = report.outcome else {
        panic!("expected completion, got {:?}", report.outcome);
    };
    assert!((receipt.amount_psl - 40.0).abs() < 1e-9);
    assert_eq!(receipt.burn_txid, "burn-1");
    assert_eq!(receipt.registration_txid, "reg-burn-1");
    assert!(receipt.stored_by_retry.is_none());

    let burns = harness.wallet.burns();
    assert_eq!(burns.len(), 1);
    assert_eq!(burns[0].0, NetworkKind::Testnet.burn_address());

    assert_eq!(
        report.trace.states(),
        vec![
            PurchaseState::Drafted,
            PurchaseState::QuoteRequested,
            PurchaseState::QuoteReceived,
            PurchaseState::PriceAgreed,
            PurchaseState::Paid,
            PurchaseState::ConfirmationSent,
            PurchaseState::StatusPending,
            PurchaseState::Completed,
        ]
    );

    let initial = harness.network.calls_to(protocol::INITIAL_REQUEST.path);
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].pastelid, ranked[0]);
    assert_eq!(
        initial[0].body["credit_pack_request"]["requesting_end_user_pastelid"],
        json!(REQUESTER)
    );

    let agreement = harness.network.calls_to(protocol::PRICE_QUOTE_RESPONSE.path);
    assert_eq!(agreement.len(), 1);
    assert_eq!(
        agreement[0].body["preliminary_price_quote_response"]["agree_with_preliminary_price_quote"],
        json!(1)
    );

    assert_eq!(
        harness
            .network
            .calls_to(protocol::COMPLETION_ANNOUNCEMENT.path)
            .len(),
        6
    );
    assert!(harness
        .network
        .calls_to(protocol::STORAGE_RETRY.path)
        .is_empty());

    for kind in [
        "purchase_request",
        "preliminary_price_quote",
        "price_quote_response",
        "purchase_response",
        "confirmation",
        "confirmation_response",
        "status_reply",
    ] {
        assert_eq!(harness.store.keys(kind).len(), 1, "{kind} not persisted once");
    }
    assert_eq!(harness.store.keys("purchase_request")[0], receipt.request_hash);
}

#[tokio::test]
async fn test_overpriced_quote_is_declined_without_payment() {
    let harness = TestHarness::new(6);
    harness
        .network
        .configure_all(|node| node.quote_per_credit = 0.6);

    let report = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect("purchase");

    let PurchaseOutcome::PriceNotAgreed(evaluation) = report.outcome else {
        panic!("expected refusal, got {:?}", report.outcome);
    };
    assert!(!evaluation.within_tolerance);
    assert!(!evaluation.within_total);
    assert!((evaluation.deviation - 0.5).abs() < 1e-9);
    assert_eq!(report.trace.current(), PurchaseState::QuoteReceived);

    assert!(harness.wallet.burns().is_empty());
    let answers = harness.network.calls_to(protocol::PRICE_QUOTE_RESPONSE.path);
    assert_eq!(answers.len(), 1);
    assert_eq!(
        answers[0].body["preliminary_price_quote_response"]["agree_with_preliminary_price_quote"],
        json!(0)
    );
    assert!(harness.network.calls_to(protocol::CONFIRM.path).is_empty());
}

#[tokio::test]
async fn test_status_failures_fall_back_to_fourth_closest() {
    let harness = TestHarness::new(6);
    let ranked = harness.network.ranked_ids();
    for id in &ranked[..3] {
        harness.network.configure(id, |node| node.status_fails = true);
    }

    let report = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect("purchase");

    let PurchaseOutcome::Completed(receipt) = report.outcome else {
        panic!("expected completion, got {:?}", report.outcome);
    };
    assert_eq!(receipt.stored_by_retry.as_deref(), Some(ranked[3].as_str()));
    assert!(receipt.registration_txid.starts_with("reg-retry-"));
    assert!(report.trace.reached(PurchaseState::RetryNeeded));
    assert_eq!(report.trace.current(), PurchaseState::Completed);

    let retries = harness.network.calls_to(protocol::STORAGE_RETRY.path);
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].pastelid, ranked[3]);
    assert_eq!(
        harness
            .network
            .calls_to(protocol::STORAGE_RETRY_ANNOUNCEMENT.path)
            .len(),
        6
    );
    assert_eq!(harness.wallet.burns().len(), 1);
}

#[tokio::test]
async fn test_pending_status_retries_with_closest_agreeing_node() {
    let harness = TestHarness::new(5);
    let ranked = harness.network.ranked_ids();
    harness
        .network
        .configure_all(|node| node.status = "pending".to_string());

    let report = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect("purchase");

    let PurchaseOutcome::Completed(receipt) = report.outcome else {
        panic!("expected completion, got {:?}", report.outcome);
    };
    assert_eq!(receipt.stored_by_retry.as_deref(), Some(ranked[0].as_str()));
    assert_eq!(
        harness.network.calls_to(protocol::STATUS_CHECK.path).len(),
        1
    );
}

#[tokio::test]
async fn test_failed_storage_retry_exhausts_after_payment() {
    let harness = TestHarness::new(4);
    harness.network.configure_all(|node| {
        node.status_fails = true;
        node.retry_outcome = "failed".to_string();
    });

    let err = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect_err("retry should be exhausted");

    match err {
        Error::RetryExhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*last_error, Error::Rejected(_)));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(harness.wallet.burns().len(), 1);
}

#[tokio::test]
async fn test_rejection_ends_attempt_without_payment() {
    let harness = TestHarness::new(4);
    let ranked = harness.network.ranked_ids();
    harness.network.configure(&ranked[0], |node| {
        node.reject_reason = Some("not enough supernodes agree".to_string());
    });

    let report = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect("purchase");

    assert_eq!(
        report.outcome,
        PurchaseOutcome::Rejected {
            reason: "not enough supernodes agree".to_string()
        }
    );
    assert_eq!(report.trace.current(), PurchaseState::Rejected);
    assert!(harness.wallet.burns().is_empty());
    assert_eq!(harness.store.keys("rejection").len(), 1);
}

#[tokio::test]
async fn test_termination_after_agreement_pays_nothing() {
    let harness = TestHarness::new(4);
    let ranked = harness.network.ranked_ids();
    harness.network.configure(&ranked[0], |node| {
        node.terminate_reason = Some("quorum lost".to_string());
    });

    let report = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect("purchase");

    assert_eq!(
        report.outcome,
        PurchaseOutcome::Terminated {
            reason: "quorum lost".to_string()
        }
    );
    assert_eq!(report.trace.current(), PurchaseState::Terminal);
    assert!(harness.wallet.burns().is_empty());
}

#[tokio::test]
async fn test_tampered_quote_fails_validation() {
    let harness = TestHarness::new(4);
    harness.network.configure_all(|node| node.tamper_quote = true);

    let err = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect_err("tampered quote");

    assert!(err.is_validation(), "unexpected error {err}");
    assert!(harness.wallet.burns().is_empty());
    assert_eq!(
        harness.network.calls_to(protocol::INITIAL_REQUEST.path).len(),
        1
    );
    assert!(harness
        .network
        .calls_to(protocol::PRICE_QUOTE_RESPONSE.path)
        .is_empty());
}

#[tokio::test]
async fn test_unreachable_primary_hands_quote_to_next_closest() {
    let harness = TestHarness::new(5);
    let ranked = harness.network.ranked_ids();
    harness
        .network
        .configure(&ranked[0], |node| node.initial_request_fails = true);

    let report = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect("purchase");

    assert!(matches!(report.outcome, PurchaseOutcome::Completed(_)));
    let initial: Vec<String> = harness
        .network
        .calls_to(protocol::INITIAL_REQUEST.path)
        .into_iter()
        .map(|call| call.pastelid)
        .collect();
    assert_eq!(initial, vec![ranked[0].clone(), ranked[1].clone()]);

    let agreement = harness.network.calls_to(protocol::PRICE_QUOTE_RESPONSE.path);
    assert_eq!(agreement.len(), 1);
    assert_eq!(agreement[0].pastelid, ranked[1]);
    let confirm = harness.network.calls_to(protocol::CONFIRM.path);
    assert_eq!(confirm[0].pastelid, ranked[1]);
    assert_eq!(harness.wallet.burns().len(), 1);
}

#[tokio::test]
async fn test_every_candidate_unreachable_fails_without_payment() {
    let harness = TestHarness::new(5);
    harness
        .network
        .configure_all(|node| node.initial_request_fails = true);

    let err = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect_err("no candidate answers");

    assert!(matches!(err, Error::Network(_)), "unexpected error {err}");
    assert_eq!(
        harness.network.calls_to(protocol::INITIAL_REQUEST.path).len(),
        3
    );
    assert!(harness.wallet.burns().is_empty());
}

#[tokio::test]
async fn test_response_total_above_ceiling_is_not_paid() {
    let harness = TestHarness::new(4);
    harness
        .network
        .configure_all(|node| node.response_total_override = Some(60.0));

    let err = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect_err("inflated total");

    assert!(err.is_validation(), "unexpected error {err}");
    assert!(harness.wallet.burns().is_empty());
    assert!(harness.network.calls_to(protocol::CONFIRM.path).is_empty());
}

#[tokio::test]
async fn test_foreign_merkle_root_is_not_paid() {
    let harness = TestHarness::new(4);
    harness
        .network
        .configure_all(|node| node.bad_merkle_root = true);

    let err = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect_err("merkle root mismatch");

    assert!(err.is_validation(), "unexpected error {err}");
    assert!(harness.wallet.burns().is_empty());
    assert!(harness.store.keys("purchase_response").is_empty());
}

#[tokio::test]
async fn test_malformed_tracking_address_is_refused_locally() {
    let harness = TestHarness::new(4);

    let err = harness
        .client
        .purchase_credit_pack(CREDITS, "PtMainnetAddressNotForTestnet0000", ceilings())
        .await
        .expect_err("wrong network address");

    assert!(matches!(err, Error::Wallet(_)));
    assert!(harness.network.calls().is_empty());
}

#[tokio::test]
async fn test_status_query_after_purchase() {
    let harness = TestHarness::new(5);
    let report = harness
        .client
        .purchase_credit_pack(CREDITS, TRACKING_ADDRESS, ceilings())
        .await
        .expect("purchase");
    let PurchaseOutcome::Completed(receipt) = report.outcome else {
        panic!("expected completion");
    };

    let status = harness
        .client
        .get_credit_pack_status(&receipt.request_hash)
        .await
        .expect("status");
    assert!(status.is_completed());
    assert_eq!(status.request_hash, receipt.request_hash);
    assert_eq!(status.response_hash, receipt.response_hash);
}

#[tokio::test]
async fn test_estimate_uses_market_price() {
    let harness = TestHarness::new(3);
    let cost = harness
        .client
        .estimate_purchase_cost(CREDITS, 0.1)
        .await
        .expect("estimate");
    assert!((cost - 44.0).abs() < 1e-9);
}
