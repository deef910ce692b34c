// Swap coordinator: deploys the paired locks from one logical order and
// drives the completion protocol in the safe order (destination withdrawal
// reveals the secret, source withdrawal settles).
//
// Every timer decision is made against the owning ledger's clock, read at
// decision time. Local state is bookkeeping only; before the secret is
// revealed both locks are re-read from their ledgers.

use crate::config::CoordinatorConfig;
use crate::htlc::hashlock::{self, commit, Commitment, Secret};
use crate::htlc::timelock::{validate_pair, TierStage};
use crate::ledger::interface::{
    LedgerAdapter, LedgerError, LockParams, LockReceipt, LockState, TxId,
};
use crate::relayer::backend::NegotiationBackend;
use crate::relayer::types::{CommitmentInfo, Order, Quote};
use crate::swap::state::{advance, SwapEvent, SwapPhase};
use crate::swap::types::{CancellationReport, CompletionReport, LockSide, SwapError, SwapId};
use log::{debug, info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Book-keeping for one in-flight swap.
pub struct SwapRecord {
    pub order: Order,
    pub recipient: String,
    pub commitment: Commitment,
    pub phase: SwapPhase,
    pub src_lock: Option<LockReceipt>,
    pub dst_lock: Option<LockReceipt>,
    pub initiated_at: Instant,
    secret: Option<Secret>,
}

impl SwapRecord {
    /// Whether the secret is still held in memory. It is wiped once the
    /// swap reaches a terminal phase.
    pub fn holds_secret(&self) -> bool {
        self.secret.is_some()
    }
}

enum CancelOutcome {
    Cancelled(TxId),
    NotDue(TierStage),
    AlreadySettled,
}

pub struct SwapCoordinator {
    config: CoordinatorConfig,
    source: Arc<dyn LedgerAdapter>,
    destination: Arc<dyn LedgerAdapter>,
    backend: Arc<dyn NegotiationBackend>,
    active_swaps: HashMap<SwapId, SwapRecord>,
}

impl SwapCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        source: Arc<dyn LedgerAdapter>,
        destination: Arc<dyn LedgerAdapter>,
        backend: Arc<dyn NegotiationBackend>,
    ) -> Self {
        SwapCoordinator {
            config,
            source,
            destination,
            backend,
            active_swaps: HashMap::new(),
        }
    }

    pub fn record(&self, swap_id: &SwapId) -> Result<&SwapRecord, SwapError> {
        self.active_swaps
            .get(swap_id)
            .ok_or_else(|| SwapError::UnknownSwap(hex::encode(swap_id)))
    }

    fn record_mut(&mut self, swap_id: &SwapId) -> Result<&mut SwapRecord, SwapError> {
        self.active_swaps
            .get_mut(swap_id)
            .ok_or_else(|| SwapError::UnknownSwap(hex::encode(swap_id)))
    }

    pub fn phases(&self) -> Vec<(SwapId, SwapPhase)> {
        self.active_swaps
            .iter()
            .map(|(id, record)| (*id, record.phase))
            .collect()
    }

    /// Creates the order with the negotiation backend, then deploys the
    /// source lock and, once its confirmed on-ledger commitment has been
    /// verified, the destination lock.
    ///
    /// Parameter errors surface before any ledger call and are never
    /// retried here. A rejected deployment is not retried either: lock ids
    /// are salts, and replaying one the ledger already accepted is
    /// undefined behavior, so the caller must start over with fresh
    /// parameters.
    pub async fn initiate_swap(
        &mut self,
        quote: &Quote,
        recipient: &str,
    ) -> Result<SwapId, SwapError> {
        // Local validation first: tier orderings, cross-ledger ordering,
        // commitment encoding, secret length against both ledgers.
        self.config.src_tiers.validate()?;
        self.config.dst_tiers.validate()?;
        validate_pair(&self.config.src_tiers, &self.config.dst_tiers)?;
        hashlock::check_commitment_encoding(
            self.config.source.commitment_width,
            self.config.destination.commitment_width,
        )?;
        let secret = hashlock::generate_secret(
            self.config.secret_length,
            &self.config.source.secret,
            &self.config.destination.secret,
        )?;
        let commitment = commit(&secret);

        let order = self
            .backend
            .create_order(
                quote,
                CommitmentInfo {
                    commitment_hex: commitment.to_hex(),
                    secret_length: secret.len(),
                },
            )
            .await?;
        if !order.destination_supported {
            return Err(SwapError::UnsupportedDestination {
                chain_id: order.dst_chain_id,
            });
        }

        let swap_id = random_id();
        info!(
            "swap 0x{}: initiating for order {} ({} -> {})",
            hex::encode(swap_id),
            order.id,
            order.src_amount,
            order.dst_amount
        );
        let src_amount = order.src_amount;
        let dst_amount = order.dst_amount;
        self.active_swaps.insert(
            swap_id,
            SwapRecord {
                order,
                recipient: recipient.to_string(),
                commitment,
                phase: SwapPhase::Created,
                src_lock: None,
                dst_lock: None,
                initiated_at: Instant::now(),
                secret: Some(secret),
            },
        );

        // Source lock first. The taker may only withdraw it with the
        // secret, so nothing is at risk until the reveal.
        let src_params = LockParams {
            lock_id: random_id(),
            commitment,
            amount: src_amount,
            safety_deposit: self.config.safety_deposit,
            funder: self.config.source.funder_address.clone(),
            recipient: self.taker_address(&swap_id)?,
            tiers: self.config.src_tiers,
        };
        let source = Arc::clone(&self.source);
        let src_receipt = source
            .create_lock(src_params)
            .await
            .map_err(|e| deployment_error(LockSide::Source, e))?;
        debug!(
            "swap 0x{}: source lock {} confirmed",
            hex::encode(swap_id),
            src_receipt.handle
        );
        {
            let record = self.record_mut(&swap_id)?;
            record.phase = advance(record.phase, SwapEvent::SrcLockConfirmed)?;
            record.src_lock = Some(src_receipt.clone());
        }

        // Read the source lock back and verify its on-ledger commitment
        // before parameterizing the destination side. This is the guard
        // against a different secret being swapped in mid-flow.
        let src_snapshot = source
            .read_lock(&src_receipt.handle)
            .await
            .map_err(|e| SwapError::ledger(LockSide::Source, e))?;
        if src_snapshot.commitment != commitment {
            return Err(SwapError::CommitmentMismatch {
                side: LockSide::Source,
            });
        }

        let dst_params = LockParams {
            lock_id: random_id(),
            commitment: src_snapshot.commitment,
            amount: dst_amount,
            safety_deposit: self.config.safety_deposit,
            funder: self.config.destination.funder_address.clone(),
            recipient: recipient.to_string(),
            tiers: self.config.dst_tiers,
        };
        if dst_params.commitment != commitment {
            return Err(SwapError::CommitmentMismatch {
                side: LockSide::Destination,
            });
        }
        let destination = Arc::clone(&self.destination);
        let dst_receipt = destination
            .create_lock(dst_params)
            .await
            .map_err(|e| deployment_error(LockSide::Destination, e))?;
        debug!(
            "swap 0x{}: destination lock {} confirmed",
            hex::encode(swap_id),
            dst_receipt.handle
        );
        {
            let record = self.record_mut(&swap_id)?;
            record.phase = advance(record.phase, SwapEvent::DstLockConfirmed)?;
            record.dst_lock = Some(dst_receipt);
        }

        info!("swap 0x{}: both locks confirmed", hex::encode(swap_id));
        Ok(swap_id)
    }

    /// Re-evaluates a swap against on-ledger reality: a lock refunded by
    /// the counterparty drives the swap to `Cancelled`, a source lock
    /// consumed after the reveal drives it to `Completed`.
    pub async fn poll_swap_state(&mut self, swap_id: &SwapId) -> Result<SwapPhase, SwapError> {
        let (phase, src_receipt, dst_receipt) = {
            let record = self.record(swap_id)?;
            (
                record.phase,
                record.src_lock.clone(),
                record.dst_lock.clone(),
            )
        };

        match phase {
            SwapPhase::BothConfirmed => {
                for (side, receipt, adapter) in [
                    (LockSide::Source, &src_receipt, Arc::clone(&self.source)),
                    (
                        LockSide::Destination,
                        &dst_receipt,
                        Arc::clone(&self.destination),
                    ),
                ] {
                    let Some(receipt) = receipt else { continue };
                    let snapshot = adapter
                        .read_lock(&receipt.handle)
                        .await
                        .map_err(|e| SwapError::ledger(side, e))?;
                    if snapshot.state == LockState::Refunded {
                        warn!(
                            "swap 0x{}: {} lock was refunded externally",
                            hex::encode(swap_id),
                            side
                        );
                        let record = self.record_mut(swap_id)?;
                        record.phase = advance(record.phase, SwapEvent::CancellationDeadline)?;
                        record.secret = None;
                        break;
                    }
                }
            }
            SwapPhase::SecretRevealed => {
                if let Some(receipt) = &src_receipt {
                    let snapshot = self
                        .source
                        .read_lock(&receipt.handle)
                        .await
                        .map_err(|e| SwapError::ledger(LockSide::Source, e))?;
                    if snapshot.state == LockState::Consumed {
                        let record = self.record_mut(swap_id)?;
                        record.phase = advance(record.phase, SwapEvent::SrcWithdrawalConfirmed)?;
                        record.secret = None;
                    }
                }
            }
            _ => {}
        }

        Ok(self.record(swap_id)?.phase)
    }

    /// Atomic completion: verify, reveal on the destination, settle on the
    /// source.
    ///
    /// The entry contract re-reads both locks from their ledgers and
    /// verifies the destination lock's parameters against the agreed order
    /// before the secret leaves this process. The destination withdrawal
    /// runs first; once it confirms, the secret is public and the source
    /// withdrawal can no longer be front-run into a loss.
    pub async fn complete_swap(&mut self, swap_id: &SwapId) -> Result<CompletionReport, SwapError> {
        let (phase, order_id, commitment, recipient, dst_amount, src_receipt, dst_receipt) = {
            let record = self.record(swap_id)?;
            (
                record.phase,
                record.order.id.clone(),
                record.commitment,
                record.recipient.clone(),
                record.order.dst_amount,
                record.src_lock.clone(),
                record.dst_lock.clone(),
            )
        };
        if phase != SwapPhase::BothConfirmed {
            return Err(SwapError::IllegalTransition {
                phase,
                event: SwapEvent::SecretRevealed,
            });
        }
        let (Some(src_receipt), Some(dst_receipt)) = (src_receipt, dst_receipt) else {
            return Err(SwapError::IllegalTransition {
                phase,
                event: SwapEvent::SecretRevealed,
            });
        };

        let source = Arc::clone(&self.source);
        let destination = Arc::clone(&self.destination);

        // Defense in depth: trust the ledgers, not the local cache.
        let (src_snapshot, dst_snapshot) = futures::join!(
            source.read_lock(&src_receipt.handle),
            destination.read_lock(&dst_receipt.handle)
        );
        let src_snapshot = src_snapshot.map_err(|e| SwapError::ledger(LockSide::Source, e))?;
        let dst_snapshot =
            dst_snapshot.map_err(|e| SwapError::ledger(LockSide::Destination, e))?;
        if src_snapshot.state != LockState::Active {
            return Err(SwapError::ledger(
                LockSide::Source,
                LedgerError::AlreadyConsumed,
            ));
        }
        if dst_snapshot.state != LockState::Active {
            return Err(SwapError::ledger(
                LockSide::Destination,
                LedgerError::AlreadyConsumed,
            ));
        }

        // The destination lock must match the agreed order exactly;
        // revealing against a drifted lock would hand over the secret for
        // nothing.
        if src_snapshot.commitment != commitment {
            return Err(SwapError::ParameterMismatch {
                side: LockSide::Source,
                field: "commitment",
                last_phase: phase,
            });
        }
        if dst_snapshot.commitment != commitment {
            return Err(SwapError::ParameterMismatch {
                side: LockSide::Destination,
                field: "commitment",
                last_phase: phase,
            });
        }
        if dst_snapshot.amount != dst_amount {
            return Err(SwapError::ParameterMismatch {
                side: LockSide::Destination,
                field: "amount",
                last_phase: phase,
            });
        }
        if dst_snapshot.recipient != recipient {
            return Err(SwapError::ParameterMismatch {
                side: LockSide::Destination,
                field: "recipient",
                last_phase: phase,
            });
        }
        if dst_snapshot.tiers != self.config.dst_tiers {
            return Err(SwapError::ParameterMismatch {
                side: LockSide::Destination,
                field: "timelocks",
                last_phase: phase,
            });
        }

        // Both finality windows must have elapsed, each per its own
        // ledger's clock.
        let (src_now, dst_now) = futures::join!(source.ledger_time(), destination.ledger_time());
        let src_now = src_now.map_err(|e| SwapError::ledger(LockSide::Source, e))?;
        let dst_now = dst_now.map_err(|e| SwapError::ledger(LockSide::Destination, e))?;
        let dst_stage = dst_snapshot
            .tiers
            .stage_at(dst_snapshot.created_at_ms, dst_now);
        match dst_stage {
            TierStage::Finality => {
                return Err(SwapError::NotYetAllowed {
                    side: LockSide::Destination,
                    stage: dst_stage,
                    last_phase: phase,
                })
            }
            TierStage::ExclusiveCancel | TierStage::PublicCancel => {
                return Err(SwapError::WindowExpired {
                    side: LockSide::Destination,
                    stage: dst_stage,
                    last_phase: phase,
                })
            }
            TierStage::ExclusiveWithdraw | TierStage::PublicWithdraw => {}
        }
        let src_stage = src_snapshot
            .tiers
            .stage_at(src_snapshot.created_at_ms, src_now);
        if src_stage == TierStage::Finality {
            return Err(SwapError::NotYetAllowed {
                side: LockSide::Source,
                stage: src_stage,
                last_phase: phase,
            });
        }

        let secret = {
            let record = self.record(swap_id)?;
            record.secret.clone().ok_or(SwapError::IllegalTransition {
                phase,
                event: SwapEvent::SecretRevealed,
            })?
        };

        // Reveal: destination withdrawal first.
        let destination_withdraw = destination
            .withdraw(&dst_receipt.handle, &secret)
            .await
            .map_err(|e| SwapError::ledger(LockSide::Destination, e))?;
        {
            let record = self.record_mut(swap_id)?;
            record.phase = advance(record.phase, SwapEvent::SecretRevealed)?;
        }
        info!(
            "swap 0x{}: secret revealed, destination withdrawn in {}",
            hex::encode(swap_id),
            destination_withdraw
        );

        // Publish the secret to the backend so the counterparty can settle
        // the source side on its own. Best effort: the reveal transaction
        // already made the secret public.
        let secret_hex = format!("0x{}", hex::encode(secret.as_bytes()));
        if let Err(e) = self.backend.submit_secret(&order_id, &secret_hex).await {
            warn!(
                "swap 0x{}: failed to publish secret to backend: {}",
                hex::encode(swap_id),
                e
            );
        }

        // Source withdrawal. If the source cancellation window already
        // opened, the funding party is expected to reclaim instead; the
        // completed destination withdrawal stands either way.
        let src_now = source
            .ledger_time()
            .await
            .map_err(|e| SwapError::ledger(LockSide::Source, e))?;
        let src_stage = src_snapshot
            .tiers
            .stage_at(src_snapshot.created_at_ms, src_now);
        let timed_out = matches!(
            src_stage,
            TierStage::ExclusiveCancel | TierStage::PublicCancel
        );
        let (source_withdraw, counterparty_timeout) = if timed_out {
            warn!(
                "swap 0x{}: source withdrawal window closed before settlement (counterparty timeout)",
                hex::encode(swap_id)
            );
            (None, true)
        } else {
            match source.withdraw(&src_receipt.handle, &secret).await {
                Ok(tx) => {
                    let record = self.record_mut(swap_id)?;
                    record.phase = advance(record.phase, SwapEvent::SrcWithdrawalConfirmed)?;
                    record.secret = None;
                    info!(
                        "swap 0x{}: source withdrawn in {}, swap completed",
                        hex::encode(swap_id),
                        tx
                    );
                    (Some(tx), false)
                }
                Err(LedgerError::WindowExpired) => {
                    warn!(
                        "swap 0x{}: source withdrawal expired mid-flight (counterparty timeout)",
                        hex::encode(swap_id)
                    );
                    (None, true)
                }
                Err(e) => return Err(SwapError::ledger(LockSide::Source, e)),
            }
        };

        let final_phase = self.record(swap_id)?.phase;
        Ok(CompletionReport {
            swap_id: *swap_id,
            destination_withdraw,
            source_withdraw,
            counterparty_timeout,
            phase: final_phase,
        })
    }

    /// Cancels whichever locks have reached their cancellation window.
    /// Each side is independent: a source refund never waits on the
    /// destination ledger. Callable again on an already-cancelled swap to
    /// sweep a lock whose window opened later.
    pub async fn cancel_swap(&mut self, swap_id: &SwapId) -> Result<CancellationReport, SwapError> {
        let (phase, src_receipt, dst_receipt) = {
            let record = self.record(swap_id)?;
            (
                record.phase,
                record.src_lock.clone(),
                record.dst_lock.clone(),
            )
        };
        if matches!(phase, SwapPhase::SecretRevealed | SwapPhase::Completed) {
            return Err(SwapError::IllegalTransition {
                phase,
                event: SwapEvent::CancellationDeadline,
            });
        }
        let has_locks = src_receipt.is_some() || dst_receipt.is_some();

        let mut cancelled = Vec::new();
        let mut pending = Vec::new();
        let mut not_due_stage = None;
        let mut first_error = None;
        for (side, receipt, adapter) in [
            (LockSide::Source, src_receipt, Arc::clone(&self.source)),
            (
                LockSide::Destination,
                dst_receipt,
                Arc::clone(&self.destination),
            ),
        ] {
            let Some(receipt) = receipt else { continue };
            match try_cancel_lock(adapter.as_ref(), &receipt).await {
                Ok(CancelOutcome::Cancelled(tx)) => {
                    info!(
                        "swap 0x{}: {} lock refunded in {}",
                        hex::encode(swap_id),
                        side,
                        tx
                    );
                    cancelled.push((side, tx));
                }
                Ok(CancelOutcome::NotDue(stage)) => {
                    debug!(
                        "swap 0x{}: {} lock still in {} window",
                        hex::encode(swap_id),
                        side,
                        stage
                    );
                    not_due_stage.get_or_insert((side, stage));
                    pending.push(side);
                }
                Ok(CancelOutcome::AlreadySettled) => {}
                Err(e) => {
                    warn!(
                        "swap 0x{}: {} lock cancellation failed: {}",
                        hex::encode(swap_id),
                        side,
                        e
                    );
                    if first_error.is_none() {
                        first_error = Some(SwapError::ledger(side, e));
                    }
                    pending.push(side);
                }
            }
        }

        if cancelled.is_empty() {
            if !has_locks {
                // Nothing ever reached a ledger; abandon locally.
                let record = self.record_mut(swap_id)?;
                record.phase = advance(record.phase, SwapEvent::CancellationDeadline)?;
                record.secret = None;
                return Ok(CancellationReport {
                    swap_id: *swap_id,
                    cancelled,
                    pending,
                    phase: SwapPhase::Cancelled,
                });
            }
            if let Some(e) = first_error {
                return Err(e);
            }
            if phase == SwapPhase::Cancelled {
                // Idempotent sweep; everything already settled.
                return Ok(CancellationReport {
                    swap_id: *swap_id,
                    cancelled,
                    pending,
                    phase,
                });
            }
            let (side, stage) = not_due_stage.unwrap_or((LockSide::Source, TierStage::Finality));
            return Err(SwapError::NotYetAllowed {
                side,
                stage,
                last_phase: phase,
            });
        }

        if phase != SwapPhase::Cancelled {
            let record = self.record_mut(swap_id)?;
            record.phase = advance(record.phase, SwapEvent::CancellationDeadline)?;
            record.secret = None;
        }
        Ok(CancellationReport {
            swap_id: *swap_id,
            cancelled,
            pending,
            phase: SwapPhase::Cancelled,
        })
    }

    /// Poll-driven timeout sweep: finds swaps whose cancellation window has
    /// opened with no reveal (or which never reached a ledger within the
    /// swap timeout) and cancels them.
    pub async fn check_timeouts(&mut self) -> Vec<(SwapId, CancellationReport)> {
        let candidates: Vec<(SwapId, Option<LockReceipt>, Option<LockReceipt>, Instant)> = self
            .active_swaps
            .iter()
            .filter(|(_, record)| {
                !record.phase.is_terminal() && record.phase != SwapPhase::SecretRevealed
            })
            .map(|(id, record)| {
                (
                    *id,
                    record.src_lock.clone(),
                    record.dst_lock.clone(),
                    record.initiated_at,
                )
            })
            .collect();

        let mut due = Vec::new();
        for (swap_id, src_receipt, dst_receipt, initiated_at) in candidates {
            let mut is_due = false;
            if src_receipt.is_none() && dst_receipt.is_none() {
                is_due = initiated_at.elapsed() >= self.config.swap_timeout;
            }
            if let Some(receipt) = &src_receipt {
                is_due |= lock_cancellable(self.source.as_ref(), receipt).await;
            }
            if let Some(receipt) = &dst_receipt {
                is_due |= lock_cancellable(self.destination.as_ref(), receipt).await;
            }
            if is_due {
                due.push(swap_id);
            }
        }

        let mut reports = Vec::new();
        for swap_id in due {
            match self.cancel_swap(&swap_id).await {
                Ok(report) => reports.push((swap_id, report)),
                Err(e) => warn!(
                    "swap 0x{}: timeout cancellation failed: {}",
                    hex::encode(swap_id),
                    e
                ),
            }
        }
        reports
    }

    /// Address that may claim the source lock: the counterparty assigned
    /// by the backend for this order.
    fn taker_address(&self, swap_id: &SwapId) -> Result<String, SwapError> {
        Ok(self.record(swap_id)?.order.taker.clone())
    }
}

async fn try_cancel_lock(
    adapter: &dyn LedgerAdapter,
    receipt: &LockReceipt,
) -> Result<CancelOutcome, LedgerError> {
    let snapshot = adapter.read_lock(&receipt.handle).await?;
    if snapshot.state != LockState::Active {
        return Ok(CancelOutcome::AlreadySettled);
    }
    let now = adapter.ledger_time().await?;
    match snapshot.tiers.stage_at(snapshot.created_at_ms, now) {
        TierStage::ExclusiveCancel | TierStage::PublicCancel => {
            let tx = adapter.cancel(&receipt.handle).await?;
            Ok(CancelOutcome::Cancelled(tx))
        }
        stage => Ok(CancelOutcome::NotDue(stage)),
    }
}

async fn lock_cancellable(adapter: &dyn LedgerAdapter, receipt: &LockReceipt) -> bool {
    let (snapshot, now) = match futures::join!(
        adapter.read_lock(&receipt.handle),
        adapter.ledger_time()
    ) {
        (Ok(snapshot), Ok(now)) => (snapshot, now),
        _ => return false,
    };
    snapshot.state == LockState::Active
        && matches!(
            snapshot.tiers.stage_at(snapshot.created_at_ms, now),
            TierStage::ExclusiveCancel | TierStage::PublicCancel
        )
}

fn deployment_error(side: LockSide, err: LedgerError) -> SwapError {
    match err {
        LedgerError::Rejected(reason) => SwapError::DeploymentRejected { side, reason },
        other => SwapError::ledger(side, other),
    }
}

fn random_id() -> [u8; 32] {
    let mut id = [0u8; 32];
    OsRng.fill_bytes(&mut id);
    id
}
