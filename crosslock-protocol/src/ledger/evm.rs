// Contract-ledger adapter. Drives the escrow contract through `cast`
// subprocess calls: fixed-argument function signatures, one 32-byte lock id
// per escrow row.

use crate::htlc::hashlock::{Commitment, Secret};
use crate::htlc::timelock::TimelockTiers;
use crate::ledger::interface::{
    ChainId, LedgerAdapter, LedgerError, LedgerKind, LockHandle, LockParams, LockReceipt,
    LockSnapshot, LockState, TxId,
};
use async_trait::async_trait;
use ethers::types::U256;
use log::debug;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Clone, Debug)]
pub struct EvmChainConfig {
    pub chain_id: ChainId,
    pub rpc_url: String,
    pub escrow_address: String,
    /// Key of the account funding source-side locks and paying gas.
    pub funder_private_key: String,
    pub cast_path: PathBuf,
}

pub struct EvmEscrowAdapter {
    config: EvmChainConfig,
}

impl EvmEscrowAdapter {
    pub fn new(config: EvmChainConfig) -> Self {
        EvmEscrowAdapter { config }
    }

    async fn run_cast(&self, args: &[&str]) -> Result<String, LedgerError> {
        let mut cmd = Command::new(&self.config.cast_path);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        debug!("evm chain {}: cast {:?}", self.config.chain_id, args);
        let output = cmd
            .output()
            .await
            .map_err(|e| LedgerError::Rpc(format!("failed to execute cast: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(map_revert(&stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn send(&self, signature: &str, args: &[&str]) -> Result<TxId, LedgerError> {
        let mut cast_args = vec![
            "send",
            self.config.escrow_address.as_str(),
            signature,
        ];
        cast_args.extend_from_slice(args);
        cast_args.extend_from_slice(&[
            "--private-key",
            self.config.funder_private_key.as_str(),
            "--rpc-url",
            self.config.rpc_url.as_str(),
        ]);
        let stdout = self.run_cast(&cast_args).await?;
        parse_tx_hash(&stdout)
    }

    /// Single-word `cast call` against the escrow, returning the raw
    /// 32-byte hex word.
    async fn call_word(&self, signature: &str, lock_id_hex: &str) -> Result<String, LedgerError> {
        let stdout = self
            .run_cast(&[
                "call",
                self.config.escrow_address.as_str(),
                signature,
                lock_id_hex,
                "--rpc-url",
                self.config.rpc_url.as_str(),
            ])
            .await?;
        let word = stdout.trim().trim_start_matches("0x").to_string();
        if word.len() != 64 {
            return Err(LedgerError::Rpc(format!(
                "expected 32-byte word from {}, got '{}'",
                signature, stdout
            )));
        }
        Ok(word)
    }

    fn contract_lock_id<'a>(&self, handle: &'a LockHandle) -> Result<&'a [u8; 32], LedgerError> {
        match handle {
            LockHandle::Contract { chain_id, lock_id } if *chain_id == self.config.chain_id => {
                Ok(lock_id)
            }
            LockHandle::Contract { chain_id, .. } => Err(LedgerError::Rejected(format!(
                "handle for chain {} submitted to chain {}",
                chain_id, self.config.chain_id
            ))),
            other => Err(LedgerError::Rejected(format!(
                "object handle {} submitted to a contract ledger",
                other
            ))),
        }
    }
}

#[async_trait]
impl LedgerAdapter for EvmEscrowAdapter {
    fn chain_id(&self) -> ChainId {
        self.config.chain_id
    }

    fn kind(&self) -> LedgerKind {
        LedgerKind::Contract
    }

    async fn create_lock(&self, params: LockParams) -> Result<LockReceipt, LedgerError> {
        let now_ms = self.ledger_time().await?;
        let packed = params
            .tiers
            .pack(now_ms / 1000)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let lock_id_hex = format!("0x{}", hex::encode(params.lock_id));
        let commitment_hex = params.commitment.to_hex();
        let amount = U256::from(params.amount).to_string();
        let deposit = U256::from(params.safety_deposit).to_string();
        let packed_hex = format!("{:#x}", packed);

        let tx = self
            .send(
                "createLock(bytes32,bytes32,uint256,uint256,address,uint256)",
                &[
                    lock_id_hex.as_str(),
                    commitment_hex.as_str(),
                    amount.as_str(),
                    deposit.as_str(),
                    params.recipient.as_str(),
                    packed_hex.as_str(),
                ],
            )
            .await?;
        let confirmed_at_ms = self.ledger_time().await?;
        Ok(LockReceipt {
            handle: LockHandle::Contract {
                chain_id: self.config.chain_id,
                lock_id: params.lock_id,
            },
            confirmed_at_ms,
            tx,
        })
    }

    async fn withdraw(&self, handle: &LockHandle, secret: &Secret) -> Result<TxId, LedgerError> {
        let lock_id = self.contract_lock_id(handle)?;
        let lock_id_hex = format!("0x{}", hex::encode(lock_id));
        let secret_hex = format!("0x{}", hex::encode(secret.as_bytes()));
        self.send(
            "withdraw(bytes32,bytes)",
            &[lock_id_hex.as_str(), secret_hex.as_str()],
        )
        .await
    }

    async fn cancel(&self, handle: &LockHandle) -> Result<TxId, LedgerError> {
        let lock_id = self.contract_lock_id(handle)?;
        let lock_id_hex = format!("0x{}", hex::encode(lock_id));
        self.send("cancel(bytes32)", &[lock_id_hex.as_str()]).await
    }

    async fn read_lock(&self, handle: &LockHandle) -> Result<LockSnapshot, LedgerError> {
        let lock_id = self.contract_lock_id(handle)?;
        let lock_id_hex = format!("0x{}", hex::encode(lock_id));

        let commitment_word = self
            .call_word("lockCommitment(bytes32)", &lock_id_hex)
            .await?;
        let commitment = Commitment::from_hex(&commitment_word)
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        let amount = parse_word_u64(&self.call_word("lockAmount(bytes32)", &lock_id_hex).await?)?;
        let safety_deposit =
            parse_word_u64(&self.call_word("lockDeposit(bytes32)", &lock_id_hex).await?)?;
        let funder = parse_word_address(&self.call_word("lockFunder(bytes32)", &lock_id_hex).await?);
        let recipient =
            parse_word_address(&self.call_word("lockRecipient(bytes32)", &lock_id_hex).await?);
        let packed_word = self.call_word("lockTimelocks(bytes32)", &lock_id_hex).await?;
        let packed = U256::from_str_radix(&packed_word, 16)
            .map_err(|e| LedgerError::Rpc(format!("bad packed timelocks: {}", e)))?;
        let (tiers, deployed_at_secs) = TimelockTiers::unpack(packed);
        let state = match parse_word_u64(&self.call_word("lockState(bytes32)", &lock_id_hex).await?)?
        {
            0 => LockState::Active,
            1 => LockState::Consumed,
            2 => LockState::Refunded,
            other => {
                return Err(LedgerError::Rpc(format!("unknown lock state {}", other)));
            }
        };

        Ok(LockSnapshot {
            commitment,
            amount,
            safety_deposit,
            funder,
            recipient,
            tiers,
            created_at_ms: deployed_at_secs * 1000,
            state,
        })
    }

    async fn ledger_time(&self) -> Result<u64, LedgerError> {
        let stdout = self
            .run_cast(&[
                "block",
                "latest",
                "--field",
                "timestamp",
                "--rpc-url",
                self.config.rpc_url.as_str(),
            ])
            .await?;
        let secs: u64 = stdout
            .trim()
            .parse()
            .map_err(|e| LedgerError::Rpc(format!("bad block timestamp '{}': {}", stdout, e)))?;
        Ok(secs * 1000)
    }
}

/// Extracts the transaction hash from `cast send` receipt output.
fn parse_tx_hash(stdout: &str) -> Result<TxId, LedgerError> {
    let re = Regex::new(r"transactionHash\s+(0x[0-9a-fA-F]{64})").unwrap();
    re.captures(stdout)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            LedgerError::Rpc(format!(
                "failed to parse transaction hash from cast output: {}",
                stdout
            ))
        })
}

/// Maps the escrow contract's revert reasons onto the adapter error
/// surface. Anything unrecognized is reported verbatim as a rejection.
fn map_revert(stderr: &str) -> LedgerError {
    if stderr.contains("WrongSecret") {
        LedgerError::WrongSecret
    } else if stderr.contains("NotYetWithdrawable") {
        LedgerError::NotYetWithdrawable
    } else if stderr.contains("NotYetCancellable") {
        LedgerError::NotYetCancellable
    } else if stderr.contains("WindowExpired") {
        LedgerError::WindowExpired
    } else if stderr.contains("AlreadyConsumed") {
        LedgerError::AlreadyConsumed
    } else if stderr.contains("LockNotFound") {
        LedgerError::LockNotFound
    } else {
        LedgerError::Rejected(stderr.trim().to_string())
    }
}

fn parse_word_u64(word: &str) -> Result<u64, LedgerError> {
    let value = U256::from_str_radix(word, 16)
        .map_err(|e| LedgerError::Rpc(format!("bad uint word '{}': {}", word, e)))?;
    if value > U256::from(u64::MAX) {
        return Err(LedgerError::Rpc(format!("uint word overflows u64: {}", word)));
    }
    Ok(value.as_u64())
}

fn parse_word_address(word: &str) -> String {
    // Addresses come back left-padded to 32 bytes.
    format!("0x{}", &word[word.len() - 40..])
}
