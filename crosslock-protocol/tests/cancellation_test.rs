// Failure and recovery scenarios: rejected deployments, timeout-driven
// cancellation, and the locality of each side's refund path.

use crosslock_protocol::config::CoordinatorConfig;
use crosslock_protocol::htlc::timelock::{TimelockError, TimelockTiers};
use crosslock_protocol::ledger::interface::LedgerAdapter;
use crosslock_protocol::relayer::backend::InMemoryBackend;
use crosslock_protocol::relayer::NegotiationBackend;
use crosslock_protocol::swap::state::SwapPhase;
use crosslock_protocol::swap::types::{LockSide, SwapError};
use crosslock_protocol::test_utils::{harness, harness_with};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn rejected_source_deployment_never_reveals() {
    // Source funder has nothing to escrow; the first ledger call fails.
    let mut h = harness(0, 1_000);
    let quote = h
        .backend
        .get_quote("TKA", "TKB", 100, "wallet-1")
        .await
        .unwrap();
    let err = h
        .coordinator
        .initiate_swap(&quote, "0xmaker-dst")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SwapError::DeploymentRejected {
            side: LockSide::Source,
            ..
        }
    ));

    // The swap never advanced, and the destination ledger was never
    // touched (source deploys first).
    let phases = h.coordinator.phases();
    assert_eq!(phases.len(), 1);
    let (swap_id, phase) = phases[0];
    assert_eq!(phase, SwapPhase::Created);
    assert_eq!(h.source.lock_count(), 0);
    assert_eq!(h.destination.lock_count(), 0);

    // Completion in this state is guarded; the secret stays private.
    let err = h.coordinator.complete_swap(&swap_id).await.unwrap_err();
    assert!(matches!(err, SwapError::IllegalTransition { .. }));
}

#[tokio::test]
async fn rejected_destination_deployment_leaves_source_reclaimable() {
    let mut h = harness(1_000, 0);
    let quote = h
        .backend
        .get_quote("TKA", "TKB", 100, "wallet-1")
        .await
        .unwrap();
    let err = h
        .coordinator
        .initiate_swap(&quote, "0xmaker-dst")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SwapError::DeploymentRejected {
            side: LockSide::Destination,
            ..
        }
    ));

    let (swap_id, phase) = h.coordinator.phases()[0];
    assert_eq!(phase, SwapPhase::SrcLockDeployed);
    assert_eq!(h.source.lock_count(), 1);
    assert_eq!(h.coordinator.record(&swap_id).unwrap().holds_secret(), true);

    // Completion is refused with only one lock on a ledger.
    let err = h.coordinator.complete_swap(&swap_id).await.unwrap_err();
    assert!(matches!(err, SwapError::IllegalTransition { .. }));

    // Cancellation is gated until the source cancellation tier opens.
    let err = h.coordinator.cancel_swap(&swap_id).await.unwrap_err();
    assert!(matches!(
        err,
        SwapError::NotYetAllowed {
            side: LockSide::Source,
            ..
        }
    ));

    h.source.advance_time(Duration::from_secs(121));
    let report = h.coordinator.cancel_swap(&swap_id).await.unwrap();
    assert_eq!(report.cancelled.len(), 1);
    assert_eq!(report.cancelled[0].0, LockSide::Source);
    assert_eq!(report.phase, SwapPhase::Cancelled);
    // Amount and deposit are back with the funder; the secret is gone.
    assert_eq!(
        h.source.balance_of(&CoordinatorConfig::default().source.funder_address),
        1_000
    );
    assert!(!h.coordinator.record(&swap_id).unwrap().holds_secret());
}

#[tokio::test]
async fn source_cancellation_is_independent_of_destination_state() {
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

    // No reveal before the source cancellation tier. The source ledger is
    // past T3; the destination ledger, on its own clock, is not.
    h.source.advance_time(Duration::from_secs(122));
    h.destination.advance_time(Duration::from_secs(50));

    let report = h.coordinator.cancel_swap(&swap_id).await.unwrap();
    assert_eq!(report.cancelled.len(), 1);
    assert_eq!(report.cancelled[0].0, LockSide::Source);
    assert_eq!(report.pending, vec![LockSide::Destination]);
    assert_eq!(report.phase, SwapPhase::Cancelled);
    assert_eq!(
        h.source.balance_of(&CoordinatorConfig::default().source.funder_address),
        1_000
    );

    // The destination side is swept once its own window opens.
    h.destination.advance_time(Duration::from_secs(60));
    let report = h.coordinator.cancel_swap(&swap_id).await.unwrap();
    assert_eq!(report.cancelled.len(), 1);
    assert_eq!(report.cancelled[0].0, LockSide::Destination);
    assert_eq!(
        h.destination
            .balance_of(&CoordinatorConfig::default().destination.funder_address),
        1_000
    );

    // Nothing was ever revealed.
    let record = h.coordinator.record(&swap_id).unwrap();
    assert!(h
        .backend
        .get_published_secrets(&record.order.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn malformed_cross_ledger_tiers_rejected_before_any_ledger_call() {
    let mut config = CoordinatorConfig::default();
    // Destination cancellation not strictly before source cancellation.
    config.dst_tiers = TimelockTiers::new(10, 100, 121, None);
    let backend = Arc::new(InMemoryBackend::new(
        config.source.chain_id,
        config.destination.chain_id,
        100,
    ));
    let mut h = harness_with(config, Arc::clone(&backend), 1_000, 1_000);

    let quote = backend
        .get_quote("TKA", "TKB", 100, "wallet-1")
        .await
        .unwrap();
    let err = h
        .coordinator
        .initiate_swap(&quote, "0xmaker-dst")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SwapError::Timelock(TimelockError::CrossLedgerOrderingViolation { .. })
    ));

    // Rejected locally: no lock was deployed and no order was created.
    assert_eq!(h.source.lock_count(), 0);
    assert_eq!(h.destination.lock_count(), 0);
    assert_eq!(backend.get_active_orders(0, 10).await.unwrap().total, 0);
}

#[tokio::test]
async fn unsupported_destination_refused_before_deployment() {
    let config = CoordinatorConfig::default();
    let backend = Arc::new(
        InMemoryBackend::new(config.source.chain_id, config.destination.chain_id, 100)
            .without_destination_support(),
    );
    let mut h = harness_with(config, Arc::clone(&backend), 1_000, 1_000);

    let quote = backend
        .get_quote("TKA", "TKB", 100, "wallet-1")
        .await
        .unwrap();
    let err = h
        .coordinator
        .initiate_swap(&quote, "0xmaker-dst")
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::UnsupportedDestination { .. }));
    assert_eq!(h.source.lock_count(), 0);
    assert_eq!(h.destination.lock_count(), 0);
}

#[tokio::test]
async fn secret_length_validated_before_order_creation() {
    let mut config = CoordinatorConfig::default();
    // Outside the 32-byte window both default escrow deployments accept.
    config.secret_length = 16;
    let backend = Arc::new(InMemoryBackend::new(
        config.source.chain_id,
        config.destination.chain_id,
        100,
    ));
    let mut h = harness_with(config, Arc::clone(&backend), 1_000, 1_000);

    let quote = backend
        .get_quote("TKA", "TKB", 100, "wallet-1")
        .await
        .unwrap();
    let err = h
        .coordinator
        .initiate_swap(&quote, "0xmaker-dst")
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::HashLock(_)));
    assert_eq!(backend.get_active_orders(0, 10).await.unwrap().total, 0);
    assert_eq!(h.source.lock_count(), 0);
}

#[tokio::test]
async fn poll_observes_external_destination_refund() {
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

    // The destination funder reclaims its lock on-ledger, outside the
    // coordinator's control.
    h.destination.advance_time(Duration::from_secs(102));
    let dst_handle = h
        .coordinator
        .record(&swap_id)
        .unwrap()
        .dst_lock
        .as_ref()
        .unwrap()
        .handle
        .clone();
    h.destination.cancel(&dst_handle).await.unwrap();

    // Polling re-reads the ledgers and reflects the refund.
    let phase = h.coordinator.poll_swap_state(&swap_id).await.unwrap();
    assert_eq!(phase, SwapPhase::Cancelled);
    assert!(!h.coordinator.record(&swap_id).unwrap().holds_secret());
}

#[tokio::test]
async fn timeout_sweep_cancels_overdue_swaps() {
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

    // Nothing due yet: both ledgers are inside their withdrawal windows.
    h.source.advance_time(Duration::from_secs(30));
    h.destination.advance_time(Duration::from_secs(30));
    assert!(h.coordinator.check_timeouts().await.is_empty());

    // Both cancellation windows open with no reveal.
    h.source.advance_time(Duration::from_secs(100));
    h.destination.advance_time(Duration::from_secs(100));
    let reports = h.coordinator.check_timeouts().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, swap_id);
    assert_eq!(reports[0].1.cancelled.len(), 2);
    assert_eq!(
        h.coordinator.record(&swap_id).unwrap().phase,
        SwapPhase::Cancelled
    );
}
