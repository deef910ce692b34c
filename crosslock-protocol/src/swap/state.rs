// Swap lifecycle state machine. Pure bookkeeping: `advance` is total over
// (phase, event) and rejects anything outside the transition table.

use crate::swap::types::SwapError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapPhase {
    Created,
    SrcLockDeployed,
    DstLockDeployed,
    BothConfirmed,
    SecretRevealed,
    Completed,
    Cancelled,
}

impl SwapPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapPhase::Completed | SwapPhase::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapEvent {
    SrcLockConfirmed,
    DstLockConfirmed,
    SecretRevealed,
    SrcWithdrawalConfirmed,
    /// A cancellation deadline passed with no reveal and a lock was (or is
    /// being) reclaimed.
    CancellationDeadline,
}

/// Computes the next phase for an incoming confirmation/timeout event.
///
/// Lock confirmations are accepted in either order; the deployment
/// convention is source-first but correctness does not depend on it.
pub fn advance(phase: SwapPhase, event: SwapEvent) -> Result<SwapPhase, SwapError> {
    let next = match (phase, event) {
        (SwapPhase::Created, SwapEvent::SrcLockConfirmed) => SwapPhase::SrcLockDeployed,
        (SwapPhase::Created, SwapEvent::DstLockConfirmed) => SwapPhase::DstLockDeployed,
        (SwapPhase::SrcLockDeployed, SwapEvent::DstLockConfirmed) => SwapPhase::BothConfirmed,
        (SwapPhase::DstLockDeployed, SwapEvent::SrcLockConfirmed) => SwapPhase::BothConfirmed,
        (SwapPhase::BothConfirmed, SwapEvent::SecretRevealed) => SwapPhase::SecretRevealed,
        (SwapPhase::SecretRevealed, SwapEvent::SrcWithdrawalConfirmed) => SwapPhase::Completed,
        (
            SwapPhase::Created
            | SwapPhase::SrcLockDeployed
            | SwapPhase::DstLockDeployed
            | SwapPhase::BothConfirmed,
            SwapEvent::CancellationDeadline,
        ) => SwapPhase::Cancelled,
        _ => return Err(SwapError::IllegalTransition { phase, event }),
    };
    Ok(next)
}
