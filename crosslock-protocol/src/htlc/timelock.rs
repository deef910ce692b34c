// Timelock tier model governing who may act on a lock and when.
//
// Tiers are second offsets relative to lock creation. The contract ledger
// stores them bit-packed in a single 256-bit word together with the
// deployment timestamp; the object ledger stores absolute millisecond
// deadlines. Both representations must round-trip without precision loss
// for values in the supported range.

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const TIER_MASK_BITS: u64 = u32::MAX as u64;
const DEPLOYED_AT_SHIFT: usize = 224;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimelockError {
    #[error("tier ordering violated: {boundary}")]
    TierOrderingViolation { boundary: &'static str },
    #[error("destination cancellation tiers ({dst_tier}s) must open strictly before source cancellation tiers ({src_tier}s)")]
    CrossLedgerOrderingViolation { dst_tier: u32, src_tier: u32 },
    #[error("deployment timestamp {deployed_at_secs}s exceeds the 32-bit subfield of the packed encoding")]
    EncodingOverflow { deployed_at_secs: u64 },
}

/// Which actor class may act on a lock at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TierStage {
    /// Before T1: nobody may act (reorg guard).
    Finality,
    /// [T1, T2): only the counterparty may withdraw with the secret.
    ExclusiveWithdraw,
    /// [T2, T3): anyone holding the secret may trigger release to the
    /// intended recipient.
    PublicWithdraw,
    /// [T3, T4): only the funder may cancel.
    ExclusiveCancel,
    /// From T4: anyone may cancel on the funder's behalf.
    PublicCancel,
}

impl fmt::Display for TierStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TierStage::Finality => "finality",
            TierStage::ExclusiveWithdraw => "exclusive-withdraw",
            TierStage::PublicWithdraw => "public-withdraw",
            TierStage::ExclusiveCancel => "exclusive-cancel",
            TierStage::PublicCancel => "public-cancel",
        };
        write!(f, "{}", name)
    }
}

/// Ordered tier offsets in seconds, relative to lock creation.
///
/// Destination-side locks carry no public cancellation stage, so `T4` is
/// optional there. Present tiers must be strictly increasing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockTiers {
    pub withdrawal: u32,
    pub public_withdrawal: u32,
    pub cancellation: u32,
    pub public_cancellation: Option<u32>,
}

/// Absolute millisecond deadlines, the object ledger's native form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierDeadlines {
    pub withdrawal_ms: u64,
    pub public_withdrawal_ms: u64,
    pub cancellation_ms: u64,
    pub public_cancellation_ms: Option<u64>,
}

impl TimelockTiers {
    pub fn new(
        withdrawal: u32,
        public_withdrawal: u32,
        cancellation: u32,
        public_cancellation: Option<u32>,
    ) -> Self {
        TimelockTiers {
            withdrawal,
            public_withdrawal,
            cancellation,
            public_cancellation,
        }
    }

    /// Enforces strict `T1 < T2 < T3 (< T4)` ordering within one ledger.
    pub fn validate(&self) -> Result<(), TimelockError> {
        if self.withdrawal >= self.public_withdrawal {
            return Err(TimelockError::TierOrderingViolation {
                boundary: "withdrawal must open before public withdrawal",
            });
        }
        if self.public_withdrawal >= self.cancellation {
            return Err(TimelockError::TierOrderingViolation {
                boundary: "public withdrawal must open before cancellation",
            });
        }
        if let Some(public_cancellation) = self.public_cancellation {
            if self.cancellation >= public_cancellation {
                return Err(TimelockError::TierOrderingViolation {
                    boundary: "cancellation must open before public cancellation",
                });
            }
        }
        Ok(())
    }

    /// Bit-packs the tiers plus the deployment timestamp into one 256-bit
    /// word: T1 at bits 0..32, T2 at 32..64, T3 at 64..96, T4 at 96..128
    /// (0 encodes an absent T4 — unambiguous because a present T4 is
    /// strictly greater than T3), deployment seconds at 224..256.
    pub fn pack(&self, deployed_at_secs: u64) -> Result<U256, TimelockError> {
        if deployed_at_secs > TIER_MASK_BITS {
            return Err(TimelockError::EncodingOverflow { deployed_at_secs });
        }
        let mut encoded = U256::from(self.withdrawal);
        encoded = encoded | (U256::from(self.public_withdrawal) << 32);
        encoded = encoded | (U256::from(self.cancellation) << 64);
        encoded = encoded | (U256::from(self.public_cancellation.unwrap_or(0)) << 96);
        encoded = encoded | (U256::from(deployed_at_secs) << DEPLOYED_AT_SHIFT);
        Ok(encoded)
    }

    /// Exact inverse of [`pack`](Self::pack).
    pub fn unpack(encoded: U256) -> (Self, u64) {
        let mask = U256::from(u32::MAX);
        let word = |shift: usize| ((encoded >> shift) & mask).as_u32();
        let public_cancellation = match word(96) {
            0 => None,
            t4 => Some(t4),
        };
        let tiers = TimelockTiers {
            withdrawal: word(0),
            public_withdrawal: word(32),
            cancellation: word(64),
            public_cancellation,
        };
        (tiers, ((encoded >> DEPLOYED_AT_SHIFT) & mask).as_u64())
    }

    /// Projects the tiers onto absolute millisecond deadlines for the
    /// object ledger. Integer math only, so there is no precision loss.
    pub fn deadlines_ms(&self, deployed_at_ms: u64) -> TierDeadlines {
        let at = |tier: u32| deployed_at_ms + u64::from(tier) * 1000;
        TierDeadlines {
            withdrawal_ms: at(self.withdrawal),
            public_withdrawal_ms: at(self.public_withdrawal),
            cancellation_ms: at(self.cancellation),
            public_cancellation_ms: self.public_cancellation.map(at),
        }
    }

    /// Evaluates which stage a lock created at `deployed_at_ms` is in at
    /// `now_ms`. Callers feed this the *ledger's* clock, never local wall
    /// time.
    pub fn stage_at(&self, deployed_at_ms: u64, now_ms: u64) -> TierStage {
        let deadlines = self.deadlines_ms(deployed_at_ms);
        if now_ms < deadlines.withdrawal_ms {
            TierStage::Finality
        } else if now_ms < deadlines.public_withdrawal_ms {
            TierStage::ExclusiveWithdraw
        } else if now_ms < deadlines.cancellation_ms {
            TierStage::PublicWithdraw
        } else {
            match deadlines.public_cancellation_ms {
                Some(public_ms) if now_ms >= public_ms => TierStage::PublicCancel,
                _ => TierStage::ExclusiveCancel,
            }
        }
    }
}

/// Cross-ledger ordering invariant: the destination lock's cancellation
/// tiers must open strictly before the source lock's, so the source funder
/// can always observe the destination lock's fate before its own
/// cancellation window forces a decision.
pub fn validate_pair(src: &TimelockTiers, dst: &TimelockTiers) -> Result<(), TimelockError> {
    src.validate()?;
    dst.validate()?;
    if dst.cancellation >= src.cancellation {
        return Err(TimelockError::CrossLedgerOrderingViolation {
            dst_tier: dst.cancellation,
            src_tier: src.cancellation,
        });
    }
    if let (Some(dst_public), Some(src_public)) = (dst.public_cancellation, src.public_cancellation)
    {
        if dst_public >= src_public {
            return Err(TimelockError::CrossLedgerOrderingViolation {
                dst_tier: dst_public,
                src_tier: src_public,
            });
        }
    }
    Ok(())
}
