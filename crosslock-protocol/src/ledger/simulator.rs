// In-memory ledger used by the test suites. Implements the full adapter
// contract, including tier-window enforcement and the object ledger's
// version bumping, against a manually-advanced clock.

use crate::htlc::hashlock::{commit, Secret};
use crate::ledger::interface::{
    ChainId, LedgerAdapter, LedgerError, LedgerKind, LockHandle, LockParams, LockReceipt,
    LockSnapshot, LockState, TxId,
};
use crate::htlc::timelock::TierStage;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

struct SimLock {
    params: LockParams,
    created_at_ms: u64,
    state: LockState,
    version: u64,
}

struct SimState {
    now_ms: u64,
    balances: HashMap<String, u64>,
    locks: HashMap<String, SimLock>,
    tx_counter: u64,
    version_counter: u64,
}

pub struct LedgerSimulator {
    chain_id: ChainId,
    kind: LedgerKind,
    state: Mutex<SimState>,
}

impl LedgerSimulator {
    pub fn new(chain_id: ChainId, kind: LedgerKind) -> Self {
        LedgerSimulator {
            chain_id,
            kind,
            state: Mutex::new(SimState {
                now_ms: 1_000_000,
                balances: HashMap::new(),
                locks: HashMap::new(),
                tx_counter: 0,
                version_counter: 0,
            }),
        }
    }

    pub fn fund(&self, address: &str, amount: u64) {
        let mut state = self.state.lock().unwrap();
        *state.balances.entry(address.to_string()).or_insert(0) += amount;
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        let state = self.state.lock().unwrap();
        state.balances.get(address).copied().unwrap_or(0)
    }

    pub fn advance_time(&self, by: Duration) {
        let mut state = self.state.lock().unwrap();
        state.now_ms += by.as_millis() as u64;
    }

    pub fn now_ms(&self) -> u64 {
        self.state.lock().unwrap().now_ms
    }

    pub fn lock_count(&self) -> usize {
        self.state.lock().unwrap().locks.len()
    }

    /// Test hook: rewrites a lock's amount in place, simulating a lock
    /// whose on-ledger parameters drifted from the agreed order.
    pub fn set_lock_amount(&self, handle: &LockHandle, amount: u64) {
        let mut state = self.state.lock().unwrap();
        let key = Self::key_of(handle);
        if let Some(lock) = state.locks.get_mut(&key) {
            lock.params.amount = amount;
        }
    }

    fn key_of(handle: &LockHandle) -> String {
        match handle {
            LockHandle::Contract { lock_id, .. } => hex::encode(lock_id),
            LockHandle::Object { object_id, .. } => object_id.clone(),
        }
    }

    fn next_tx(state: &mut SimState, chain_id: ChainId) -> TxId {
        state.tx_counter += 1;
        format!("sim{}-tx-{}", chain_id, state.tx_counter)
    }

    /// Resolves a handle to its lock key, enforcing chain identity and,
    /// for object handles, the shared-object version.
    fn resolve(
        &self,
        state: &SimState,
        handle: &LockHandle,
        check_version: bool,
    ) -> Result<String, LedgerError> {
        if handle.chain_id() != self.chain_id {
            return Err(LedgerError::Rejected(format!(
                "call for chain {} submitted to chain {}",
                handle.chain_id(),
                self.chain_id
            )));
        }
        let key = Self::key_of(handle);
        let lock = state.locks.get(&key).ok_or(LedgerError::LockNotFound)?;
        if check_version {
            if let LockHandle::Object { version, .. } = handle {
                if *version != lock.version {
                    return Err(LedgerError::Rejected(format!(
                        "stale object reference: version {} != {}",
                        version, lock.version
                    )));
                }
            }
        }
        Ok(key)
    }
}

#[async_trait]
impl LedgerAdapter for LedgerSimulator {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn kind(&self) -> LedgerKind {
        self.kind
    }

    async fn create_lock(&self, params: LockParams) -> Result<LockReceipt, LedgerError> {
        let mut state = self.state.lock().unwrap();
        let key = hex::encode(params.lock_id);
        if state.locks.contains_key(&key) {
            // Replaying accepted parameters is undefined on a real ledger;
            // the simulator rejects outright.
            return Err(LedgerError::Rejected(format!(
                "lock 0x{} already exists",
                key
            )));
        }
        let needed = params.amount + params.safety_deposit;
        let funder_balance = state.balances.get(&params.funder).copied().unwrap_or(0);
        if funder_balance < needed {
            return Err(LedgerError::Rejected(format!(
                "insufficient funds: {} < {}",
                funder_balance, needed
            )));
        }
        state
            .balances
            .insert(params.funder.clone(), funder_balance - needed);

        state.version_counter += 1;
        let version = state.version_counter;
        let handle = match self.kind {
            LedgerKind::Contract => LockHandle::Contract {
                chain_id: self.chain_id,
                lock_id: params.lock_id,
            },
            LedgerKind::Object => LockHandle::Object {
                chain_id: self.chain_id,
                object_id: format!("0x{}", hex::encode(&params.lock_id[..16])),
                version,
            },
        };
        let now_ms = state.now_ms;
        debug!(
            "sim chain {}: lock {} created at {}ms",
            self.chain_id, handle, now_ms
        );
        state.locks.insert(
            key,
            SimLock {
                params,
                created_at_ms: now_ms,
                state: LockState::Active,
                version,
            },
        );
        let tx = Self::next_tx(&mut state, self.chain_id);
        Ok(LockReceipt {
            handle,
            confirmed_at_ms: now_ms,
            tx,
        })
    }

    async fn withdraw(&self, handle: &LockHandle, secret: &Secret) -> Result<TxId, LedgerError> {
        let mut state = self.state.lock().unwrap();
        let key = self.resolve(&state, handle, true)?;
        let now_ms = state.now_ms;

        let lock = state.locks.get(&key).unwrap();
        if lock.state != LockState::Active {
            return Err(LedgerError::AlreadyConsumed);
        }
        match lock.params.tiers.stage_at(lock.created_at_ms, now_ms) {
            TierStage::Finality => return Err(LedgerError::NotYetWithdrawable),
            TierStage::ExclusiveCancel | TierStage::PublicCancel => {
                return Err(LedgerError::WindowExpired)
            }
            TierStage::ExclusiveWithdraw | TierStage::PublicWithdraw => {}
        }
        if commit(secret) != lock.params.commitment {
            return Err(LedgerError::WrongSecret);
        }

        let recipient = lock.params.recipient.clone();
        let payout = lock.params.amount + lock.params.safety_deposit;
        let lock = state.locks.get_mut(&key).unwrap();
        lock.state = LockState::Consumed;
        lock.version += 1;
        *state.balances.entry(recipient).or_insert(0) += payout;
        Ok(Self::next_tx(&mut state, self.chain_id))
    }

    async fn cancel(&self, handle: &LockHandle) -> Result<TxId, LedgerError> {
        let mut state = self.state.lock().unwrap();
        let key = self.resolve(&state, handle, true)?;
        let now_ms = state.now_ms;

        let lock = state.locks.get(&key).unwrap();
        if lock.state != LockState::Active {
            return Err(LedgerError::AlreadyConsumed);
        }
        match lock.params.tiers.stage_at(lock.created_at_ms, now_ms) {
            TierStage::ExclusiveCancel | TierStage::PublicCancel => {}
            _ => return Err(LedgerError::NotYetCancellable),
        }

        let funder = lock.params.funder.clone();
        let refund = lock.params.amount + lock.params.safety_deposit;
        let lock = state.locks.get_mut(&key).unwrap();
        lock.state = LockState::Refunded;
        lock.version += 1;
        *state.balances.entry(funder).or_insert(0) += refund;
        Ok(Self::next_tx(&mut state, self.chain_id))
    }

    async fn read_lock(&self, handle: &LockHandle) -> Result<LockSnapshot, LedgerError> {
        let state = self.state.lock().unwrap();
        // Reads do not consume the object, so a stale version is fine.
        let key = self.resolve(&state, handle, false)?;
        let lock = state.locks.get(&key).unwrap();
        Ok(LockSnapshot {
            commitment: lock.params.commitment,
            amount: lock.params.amount,
            safety_deposit: lock.params.safety_deposit,
            funder: lock.params.funder.clone(),
            recipient: lock.params.recipient.clone(),
            tiers: lock.params.tiers,
            created_at_ms: lock.created_at_ms,
            state: lock.state,
        })
    }

    async fn ledger_time(&self) -> Result<u64, LedgerError> {
        Ok(self.state.lock().unwrap().now_ms)
    }
}
