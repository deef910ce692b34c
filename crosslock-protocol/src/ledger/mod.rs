// Ledger adapters: one capability set {create_lock, withdraw, cancel,
// read_lock}, two call conventions (fixed-argument contract calls vs
// object-reference-with-version calls), plus an in-memory simulator used by
// the test suites.

pub mod evm;
pub mod interface;
pub mod object;
pub mod simulator;

pub use interface::{
    ChainId, LedgerAdapter, LedgerError, LedgerKind, LockHandle, LockParams, LockReceipt,
    LockSnapshot, LockState, TxId,
};
