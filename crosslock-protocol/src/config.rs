use crate::htlc::hashlock::SecretConstraints;
use crate::htlc::timelock::TimelockTiers;
use crate::ledger::interface::{ChainId, LedgerKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything the coordinator needs to know about one ledger. Built once
/// and injected at construction; nothing here is read from ambient process
/// state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainProfile {
    pub chain_id: ChainId,
    pub kind: LedgerKind,
    pub rpc_url: String,
    /// Escrow contract address or escrow package address, per kind.
    pub escrow_address: String,
    /// Our funding account on this ledger.
    pub funder_address: String,
    /// Native width of the commitment encoding on this ledger, in bytes.
    pub commitment_width: usize,
    /// Secret length bounds accepted by this ledger's lock contract.
    pub secret: SecretConstraints,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub source: ChainProfile,
    pub destination: ChainProfile,
    /// Tier profile applied to source-side locks.
    pub src_tiers: TimelockTiers,
    /// Tier profile applied to destination-side locks (no public
    /// cancellation stage).
    pub dst_tiers: TimelockTiers,
    pub secret_length: usize,
    pub safety_deposit: u64,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Swaps stuck before any lock deployment are abandoned after this.
    #[serde(with = "humantime_serde")]
    pub swap_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let secret = SecretConstraints {
            min_len: 32,
            max_len: 32,
        };
        CoordinatorConfig {
            source: ChainProfile {
                chain_id: 1,
                kind: LedgerKind::Contract,
                rpc_url: "http://localhost:8545".to_string(),
                escrow_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
                funder_address: "0xF38cA7A356584B8ede96615fd09E130A02b8b8c6".to_string(),
                commitment_width: 32,
                secret: secret.clone(),
            },
            destination: ChainProfile {
                chain_id: 101,
                kind: LedgerKind::Object,
                rpc_url: "http://localhost:9000".to_string(),
                escrow_address: "0x02a212de6a9dfa3a69e22387acfbafbb1a9e591bd9d636e7895dcfc8de05f331"
                    .to_string(),
                funder_address: "0x7b8e0864967427679b4e129f79dc332a885c6087ec9e187b53451a9006ee15f2"
                    .to_string(),
                commitment_width: 32,
                secret,
            },
            src_tiers: TimelockTiers::new(10, 120, 121, Some(122)),
            dst_tiers: TimelockTiers::new(10, 100, 101, None),
            secret_length: 32,
            safety_deposit: 1,
            poll_interval: Duration::from_secs(2),
            swap_timeout: Duration::from_secs(3600),
        }
    }
}
