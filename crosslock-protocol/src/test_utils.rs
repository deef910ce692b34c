// Shared helpers for unit and integration tests: a coordinator wired to a
// pair of ledger simulators and an in-memory negotiation backend.

use crate::config::CoordinatorConfig;
use crate::ledger::interface::LedgerAdapter;
use crate::ledger::simulator::LedgerSimulator;
use crate::relayer::backend::{InMemoryBackend, NegotiationBackend};
use crate::swap::coordinator::SwapCoordinator;
use std::sync::Arc;

pub struct TestHarness {
    pub coordinator: SwapCoordinator,
    pub source: Arc<LedgerSimulator>,
    pub destination: Arc<LedgerSimulator>,
    pub backend: Arc<InMemoryBackend>,
}

/// Harness with both funders funded to the given balances.
pub fn harness(src_funds: u64, dst_funds: u64) -> TestHarness {
    let config = CoordinatorConfig::default();
    let backend = Arc::new(InMemoryBackend::new(
        config.source.chain_id,
        config.destination.chain_id,
        100, // 1% fee: a 100 quote fills as 99
    ));
    harness_with(config, backend, src_funds, dst_funds)
}

/// Harness over an explicit config and backend, for scenarios that need a
/// misconfigured tier pair or an unsupported destination.
pub fn harness_with(
    config: CoordinatorConfig,
    backend: Arc<InMemoryBackend>,
    src_funds: u64,
    dst_funds: u64,
) -> TestHarness {
    let source = Arc::new(LedgerSimulator::new(
        config.source.chain_id,
        config.source.kind,
    ));
    let destination = Arc::new(LedgerSimulator::new(
        config.destination.chain_id,
        config.destination.kind,
    ));
    if src_funds > 0 {
        source.fund(&config.source.funder_address, src_funds);
    }
    if dst_funds > 0 {
        destination.fund(&config.destination.funder_address, dst_funds);
    }
    let coordinator = SwapCoordinator::new(
        config,
        Arc::clone(&source) as Arc<dyn LedgerAdapter>,
        Arc::clone(&destination) as Arc<dyn LedgerAdapter>,
        Arc::clone(&backend) as Arc<dyn NegotiationBackend>,
    );
    TestHarness {
        coordinator,
        source,
        destination,
        backend,
    }
}
