use crate::htlc::hashlock::{Commitment, Secret};
use crate::htlc::timelock::TimelockTiers;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type ChainId = u64;

/// Transaction identifier on either ledger (hash or digest, hex-encoded).
pub type TxId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerKind {
    /// Account/contract ledger: locks are rows in one escrow contract,
    /// addressed by a 32-byte id in fixed-argument calls.
    Contract,
    /// Object/ownership ledger: each lock is a shared object addressed by
    /// id plus version, the version bumping on every mutation.
    Object,
}

/// Handle to a deployed lock. The two variants mirror the two call
/// conventions; everything above the adapter treats them uniformly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LockHandle {
    Contract {
        chain_id: ChainId,
        lock_id: [u8; 32],
    },
    Object {
        chain_id: ChainId,
        object_id: String,
        version: u64,
    },
}

impl LockHandle {
    pub fn chain_id(&self) -> ChainId {
        match self {
            LockHandle::Contract { chain_id, .. } => *chain_id,
            LockHandle::Object { chain_id, .. } => *chain_id,
        }
    }
}

impl fmt::Display for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockHandle::Contract { chain_id, lock_id } => {
                write!(f, "contract:{}:0x{}", chain_id, hex::encode(lock_id))
            }
            LockHandle::Object {
                chain_id,
                object_id,
                version,
            } => write!(f, "object:{}:{}@{}", chain_id, object_id, version),
        }
    }
}

/// Parameters for a new lock. `lock_id` is a fresh salt-derived identifier;
/// replaying the same id against a ledger that already accepted it is
/// rejected, so retries must re-derive it.
#[derive(Clone, Debug)]
pub struct LockParams {
    pub lock_id: [u8; 32],
    pub commitment: Commitment,
    pub amount: u64,
    pub safety_deposit: u64,
    pub funder: String,
    pub recipient: String,
    pub tiers: TimelockTiers,
}

#[derive(Clone, Debug)]
pub struct LockReceipt {
    pub handle: LockHandle,
    /// Ledger clock at inclusion, in milliseconds.
    pub confirmed_at_ms: u64,
    pub tx: TxId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Active,
    /// Withdrawn with the secret.
    Consumed,
    /// Cancelled; amount and deposit returned to the funder.
    Refunded,
}

/// On-ledger view of a lock, read back for verification. The completion
/// protocol trusts these fields over anything cached locally.
#[derive(Clone, Debug)]
pub struct LockSnapshot {
    pub commitment: Commitment,
    pub amount: u64,
    pub safety_deposit: u64,
    pub funder: String,
    pub recipient: String,
    pub tiers: TimelockTiers,
    pub created_at_ms: u64,
    pub state: LockState,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transaction rejected by ledger: {0}")]
    Rejected(String),
    #[error("secret preimage does not match the lock commitment")]
    WrongSecret,
    #[error("withdrawal window has not opened yet")]
    NotYetWithdrawable,
    #[error("cancellation window has not opened yet")]
    NotYetCancellable,
    #[error("operation window has closed")]
    WindowExpired,
    #[error("lock already consumed")]
    AlreadyConsumed,
    #[error("no lock found for handle")]
    LockNotFound,
    #[error("ledger rpc failure: {0}")]
    Rpc(String),
}

/// Capability set each ledger exposes to the coordinator. Implementations
/// submit a transaction and resolve once the ledger confirms inclusion;
/// they never retry a rejected submission on their own.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    fn chain_id(&self) -> ChainId;

    fn kind(&self) -> LedgerKind;

    async fn create_lock(&self, params: LockParams) -> Result<LockReceipt, LedgerError>;

    async fn withdraw(&self, handle: &LockHandle, secret: &Secret) -> Result<TxId, LedgerError>;

    async fn cancel(&self, handle: &LockHandle) -> Result<TxId, LedgerError>;

    async fn read_lock(&self, handle: &LockHandle) -> Result<LockSnapshot, LedgerError>;

    /// Current ledger clock in milliseconds. Timeout detection polls this
    /// rather than scheduling against local wall-clock time, since ledger
    /// time can diverge from it.
    async fn ledger_time(&self) -> Result<u64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_display_distinguishes_conventions() {
        let contract = LockHandle::Contract {
            chain_id: 1,
            lock_id: [0xAB; 32],
        };
        let object = LockHandle::Object {
            chain_id: 101,
            object_id: "0x77aa".to_string(),
            version: 3,
        };
        assert!(contract.to_string().starts_with("contract:1:0xabab"));
        assert_eq!(object.to_string(), "object:101:0x77aa@3");
        assert_eq!(contract.chain_id(), 1);
        assert_eq!(object.chain_id(), 101);
    }
}
