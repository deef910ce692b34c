// End-to-end swap lifecycle against a pair of ledger simulators: deploy
// both locks, wait out the finality windows, reveal destination-first,
// settle the source side.

use crosslock_protocol::config::CoordinatorConfig;
use crosslock_protocol::ledger::interface::{LedgerAdapter, LockState};
use crosslock_protocol::relayer::NegotiationBackend;
use crosslock_protocol::swap::state::SwapPhase;
use crosslock_protocol::swap::types::{LockSide, SwapError};
use crosslock_protocol::test_utils::harness;
use std::time::Duration;

fn source_funder() -> String {
    CoordinatorConfig::default().source.funder_address
}

fn destination_funder() -> String {
    CoordinatorConfig::default().destination.funder_address
}

#[tokio::test]
async fn full_swap_happy_path() {
    let mut h = harness(1_000, 1_000);
    let quote = h
        .backend
        .get_quote("TKA", "TKB", 100, "wallet-1")
        .await
        .unwrap();
    assert_eq!(quote.src_amount, 100);
    assert_eq!(quote.dst_amount, 99);

    let swap_id = h
        .coordinator
        .initiate_swap(&quote, "0xmaker-dst")
        .await
        .unwrap();
    assert_eq!(
        h.coordinator.record(&swap_id).unwrap().phase,
        SwapPhase::BothConfirmed
    );
    // Amount plus safety deposit escrowed on each side.
    assert_eq!(h.source.balance_of(&source_funder()), 1_000 - 101);
    assert_eq!(h.destination.balance_of(&destination_funder()), 1_000 - 100);

    // Past both finality windows (T1 = 10s on each side).
    h.source.advance_time(Duration::from_secs(11));
    h.destination.advance_time(Duration::from_secs(11));

    let report = h.coordinator.complete_swap(&swap_id).await.unwrap();
    assert_eq!(report.phase, SwapPhase::Completed);
    assert!(!report.counterparty_timeout);
    assert!(report.source_withdraw.is_some());

    // Both locks consumed on their ledgers.
    let record = h.coordinator.record(&swap_id).unwrap();
    let src_snapshot = h
        .source
        .read_lock(&record.src_lock.as_ref().unwrap().handle)
        .await
        .unwrap();
    let dst_snapshot = h
        .destination
        .read_lock(&record.dst_lock.as_ref().unwrap().handle)
        .await
        .unwrap();
    assert_eq!(src_snapshot.state, LockState::Consumed);
    assert_eq!(dst_snapshot.state, LockState::Consumed);

    // The requester received the destination amount plus deposit; the
    // taker settled the source side.
    assert_eq!(h.destination.balance_of("0xmaker-dst"), 99 + 1);
    assert_eq!(h.source.balance_of(&record.order.taker), 100 + 1);

    // Secret published to the backend and wiped from memory.
    let published = h
        .backend
        .get_published_secrets(&record.order.id)
        .await
        .unwrap();
    assert_eq!(published.len(), 1);
    assert!(!record.holds_secret());
}

#[tokio::test]
async fn completion_waits_for_both_finality_windows() {
    let mut h = harness(1_000, 1_000);
    let quote = h
        .backend
        .get_quote("TKA", "TKB", 100, "wallet-1")
        .await
        .unwrap();
    let swap_id = h
        .coordinator
        .initiate_swap(&quote, "0xmaker-dst")
        .await
        .unwrap();

    // Neither clock has moved: nothing may act yet, and the secret must
    // not leave the process.
    let err = h.coordinator.complete_swap(&swap_id).await.unwrap_err();
    assert!(matches!(
        err,
        SwapError::NotYetAllowed {
            side: LockSide::Destination,
            ..
        }
    ));

    // The source ledger running ahead is not enough; the destination
    // ledger has its own finality window.
    h.source.advance_time(Duration::from_secs(30));
    let err = h.coordinator.complete_swap(&swap_id).await.unwrap_err();
    assert!(matches!(
        err,
        SwapError::NotYetAllowed {
            side: LockSide::Destination,
            ..
        }
    ));

    let record = h.coordinator.record(&swap_id).unwrap();
    let order_id = record.order.id.clone();
    assert!(h
        .backend
        .get_published_secrets(&order_id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(record.phase, SwapPhase::BothConfirmed);

    h.destination.advance_time(Duration::from_secs(11));
    let report = h.coordinator.complete_swap(&swap_id).await.unwrap();
    assert_eq!(report.phase, SwapPhase::Completed);
}

#[tokio::test]
async fn drifted_destination_lock_refuses_reveal() {
    let mut h = harness(1_000, 1_000);
    let quote = h
        .backend
        .get_quote("TKA", "TKB", 100, "wallet-1")
        .await
        .unwrap();
    let swap_id = h
        .coordinator
        .initiate_swap(&quote, "0xmaker-dst")
        .await
        .unwrap();
    h.source.advance_time(Duration::from_secs(11));
    h.destination.advance_time(Duration::from_secs(11));

    // The destination lock no longer matches the agreed order.
    let dst_handle = h
        .coordinator
        .record(&swap_id)
        .unwrap()
        .dst_lock
        .as_ref()
        .unwrap()
        .handle
        .clone();
    h.destination.set_lock_amount(&dst_handle, 98);

    let err = h.coordinator.complete_swap(&swap_id).await.unwrap_err();
    assert!(matches!(
        err,
        SwapError::ParameterMismatch {
            side: LockSide::Destination,
            field: "amount",
            ..
        }
    ));

    // No reveal happened: the destination lock is untouched and no secret
    // reached the backend.
    let record = h.coordinator.record(&swap_id).unwrap();
    assert_eq!(record.phase, SwapPhase::BothConfirmed);
    assert!(record.holds_secret());
    let dst_snapshot = h.destination.read_lock(&dst_handle).await.unwrap();
    assert_eq!(dst_snapshot.state, LockState::Active);
    assert!(h
        .backend
        .get_published_secrets(&record.order.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn counterparty_timeout_keeps_destination_withdrawal() {
    let mut h = harness(1_000, 1_000);
    let quote = h
        .backend
        .get_quote("TKA", "TKB", 100, "wallet-1")
        .await
        .unwrap();
    let swap_id = h
        .coordinator
        .initiate_swap(&quote, "0xmaker-dst")
        .await
        .unwrap();

    // The source ledger has run past its cancellation tier (T3 = 121s)
    // while the destination is still inside its withdrawal window. Ledger
    // clocks are independent; the protocol must handle the divergence.
    h.source.advance_time(Duration::from_secs(122));
    h.destination.advance_time(Duration::from_secs(11));

    let report = h.coordinator.complete_swap(&swap_id).await.unwrap();
    assert!(report.counterparty_timeout);
    assert!(report.source_withdraw.is_none());
    assert_eq!(report.phase, SwapPhase::SecretRevealed);

    // The destination withdrawal stands: the requester has been paid.
    assert_eq!(h.destination.balance_of("0xmaker-dst"), 100);

    // Post-reveal the swap can no longer be cancelled through the tracker.
    let err = h.coordinator.cancel_swap(&swap_id).await.unwrap_err();
    assert!(matches!(err, SwapError::IllegalTransition { .. }));
}
