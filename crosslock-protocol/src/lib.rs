pub mod config;
pub mod htlc;
pub mod ledger;
pub mod relayer;
pub mod swap;

pub mod test_utils; // Shared helpers for unit and integration tests
