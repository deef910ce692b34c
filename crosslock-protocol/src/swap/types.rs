use crate::htlc::hashlock::HashLockError;
use crate::htlc::timelock::{TierStage, TimelockError};
use crate::ledger::interface::{ChainId, LedgerError, TxId};
use crate::relayer::backend::BackendError;
use crate::swap::state::{SwapEvent, SwapPhase};
use std::fmt;
use thiserror::Error;

/// Identifier of one logical swap (also the salt base for its lock ids).
pub type SwapId = [u8; 32];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockSide {
    Source,
    Destination,
}

impl fmt::Display for LockSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockSide::Source => write!(f, "source"),
            LockSide::Destination => write!(f, "destination"),
        }
    }
}

/// Swap-level failure surface. Every variant that concerns a lock names the
/// side; timing variants name the tier stage; guard variants carry the last
/// confirmed phase so an operator can decide to retry, wait, or cancel.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error(transparent)]
    HashLock(#[from] HashLockError),
    #[error(transparent)]
    Timelock(#[from] TimelockError),
    #[error("negotiation backend failure: {0}")]
    Backend(#[from] BackendError),
    #[error("unknown swap 0x{0}")]
    UnknownSwap(String),
    #[error("destination ledger {chain_id} is not a supported fill target for this order")]
    UnsupportedDestination { chain_id: ChainId },
    #[error("{side} lock commitment does not match the agreed hashlock")]
    CommitmentMismatch { side: LockSide },
    #[error("{side} lock parameter '{field}' does not match the agreed order (last confirmed phase: {last_phase:?})")]
    ParameterMismatch {
        side: LockSide,
        field: &'static str,
        last_phase: SwapPhase,
    },
    #[error("{side} lock deployment rejected: {reason}")]
    DeploymentRejected { side: LockSide, reason: String },
    #[error("{side} lock is in its {stage} window; not yet allowed (last confirmed phase: {last_phase:?})")]
    NotYetAllowed {
        side: LockSide,
        stage: TierStage,
        last_phase: SwapPhase,
    },
    #[error("{side} lock window has expired at {stage} (last confirmed phase: {last_phase:?})")]
    WindowExpired {
        side: LockSide,
        stage: TierStage,
        last_phase: SwapPhase,
    },
    #[error("event {event:?} does not apply to swap phase {phase:?}")]
    IllegalTransition { phase: SwapPhase, event: SwapEvent },
    #[error("{side} ledger call failed: {source}")]
    Ledger {
        side: LockSide,
        #[source]
        source: LedgerError,
    },
}

impl SwapError {
    pub fn ledger(side: LockSide, source: LedgerError) -> Self {
        SwapError::Ledger { side, source }
    }
}

/// Outcome of the completion protocol. `source_withdraw` is absent when the
/// source-side withdrawal could not run before its cancellation window
/// opened; the destination withdrawal stands regardless.
#[derive(Debug)]
pub struct CompletionReport {
    pub swap_id: SwapId,
    pub destination_withdraw: TxId,
    pub source_withdraw: Option<TxId>,
    pub counterparty_timeout: bool,
    pub phase: SwapPhase,
}

/// Outcome of a cancellation sweep. Sides whose window has not opened yet
/// stay in `pending` and can be swept again later; cancellation on one
/// ledger never waits for the other.
#[derive(Debug)]
pub struct CancellationReport {
    pub swap_id: SwapId,
    pub cancelled: Vec<(LockSide, TxId)>,
    pub pending: Vec<LockSide>,
    pub phase: SwapPhase,
}
