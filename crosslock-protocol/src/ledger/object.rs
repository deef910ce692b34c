// Object-ledger adapter. Each lock is a shared object; every call carries
// the object id plus the version observed at read time, and the ledger
// bumps the version on each mutation. Driven through the ledger's client
// binary, which emits JSON.

use crate::htlc::hashlock::{Commitment, Secret};
use crate::htlc::timelock::TimelockTiers;
use crate::ledger::interface::{
    ChainId, LedgerAdapter, LedgerError, LedgerKind, LockHandle, LockParams, LockReceipt,
    LockSnapshot, LockState, TxId,
};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Clone, Debug)]
pub struct ObjectChainConfig {
    pub chain_id: ChainId,
    pub rpc_url: String,
    /// Escrow package published on the object ledger.
    pub package_address: String,
    pub client_path: PathBuf,
    pub gas_budget: u64,
}

pub struct ObjectEscrowAdapter {
    config: ObjectChainConfig,
}

/// JSON emitted by the client for a submitted transaction.
#[derive(Debug, Deserialize)]
struct TxOutput {
    digest: String,
    #[serde(default)]
    created: Vec<ObjectRef>,
    #[serde(default)]
    mutated: Vec<ObjectRef>,
    #[serde(default)]
    timestamp_ms: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    object_id: String,
    version: u64,
}

/// JSON shape of the lock object itself.
#[derive(Debug, Deserialize)]
struct LockObject {
    commitment: String,
    amount: u64,
    safety_deposit: u64,
    funder: String,
    recipient: String,
    created_at_ms: u64,
    withdrawal_deadline_ms: u64,
    public_withdrawal_deadline_ms: u64,
    cancellation_deadline_ms: u64,
    #[serde(default)]
    public_cancellation_deadline_ms: Option<u64>,
    state: String,
}

#[derive(Debug, Deserialize)]
struct LedgerClock {
    timestamp_ms: u64,
}

impl ObjectEscrowAdapter {
    pub fn new(config: ObjectChainConfig) -> Self {
        ObjectEscrowAdapter { config }
    }

    async fn run_client(&self, args: &[&str]) -> Result<String, LedgerError> {
        let mut cmd = Command::new(&self.config.client_path);
        cmd.args(args)
            .arg("--rpc-url")
            .arg(&self.config.rpc_url)
            .arg("--json")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!("object chain {}: client {:?}", self.config.chain_id, args);
        let output = cmd
            .output()
            .await
            .map_err(|e| LedgerError::Rpc(format!("failed to execute ledger client: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(map_abort(&stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn submit(&self, function: &str, call_args: &[String]) -> Result<TxOutput, LedgerError> {
        let gas_budget = self.config.gas_budget.to_string();
        let mut args = vec![
            "call",
            "--package",
            self.config.package_address.as_str(),
            "--module",
            "escrow",
            "--function",
            function,
            "--gas-budget",
            gas_budget.as_str(),
            "--args",
        ];
        args.extend(call_args.iter().map(String::as_str));
        let stdout = self.run_client(&args).await?;
        let parsed: TxOutput = serde_json::from_str(&stdout)
            .map_err(|e| LedgerError::Rpc(format!("bad client output: {}", e)))?;
        if let Some(reason) = parsed.error {
            return Err(map_abort(&reason));
        }
        Ok(parsed)
    }

    fn object_ref<'a>(
        &self,
        handle: &'a LockHandle,
    ) -> Result<(&'a str, u64), LedgerError> {
        match handle {
            LockHandle::Object {
                chain_id,
                object_id,
                version,
            } if *chain_id == self.config.chain_id => Ok((object_id.as_str(), *version)),
            LockHandle::Object { chain_id, .. } => Err(LedgerError::Rejected(format!(
                "handle for chain {} submitted to chain {}",
                chain_id, self.config.chain_id
            ))),
            other => Err(LedgerError::Rejected(format!(
                "contract handle {} submitted to an object ledger",
                other
            ))),
        }
    }
}

#[async_trait]
impl LedgerAdapter for ObjectEscrowAdapter {
    fn chain_id(&self) -> ChainId {
        self.config.chain_id
    }

    fn kind(&self) -> LedgerKind {
        LedgerKind::Object
    }

    async fn create_lock(&self, params: LockParams) -> Result<LockReceipt, LedgerError> {
        let now_ms = self.ledger_time().await?;
        // The object ledger takes absolute millisecond deadlines, its
        // native timelock representation.
        let deadlines = params.tiers.deadlines_ms(now_ms);

        let mut call_args = vec![
            format!("0x{}", hex::encode(params.lock_id)),
            params.commitment.to_hex(),
            params.amount.to_string(),
            params.safety_deposit.to_string(),
            params.recipient.clone(),
            deadlines.withdrawal_ms.to_string(),
            deadlines.public_withdrawal_ms.to_string(),
            deadlines.cancellation_ms.to_string(),
        ];
        if let Some(public_cancellation_ms) = deadlines.public_cancellation_ms {
            call_args.push(public_cancellation_ms.to_string());
        }

        let output = self.submit("create_lock", &call_args).await?;
        let created = output
            .created
            .first()
            .ok_or_else(|| LedgerError::Rpc("no lock object in client output".to_string()))?;
        let object_id = created.object_id.clone();
        let version = created.version;
        Ok(LockReceipt {
            handle: LockHandle::Object {
                chain_id: self.config.chain_id,
                object_id,
                version,
            },
            confirmed_at_ms: output.timestamp_ms.unwrap_or(now_ms),
            tx: output.digest,
        })
    }

    async fn withdraw(&self, handle: &LockHandle, secret: &Secret) -> Result<TxId, LedgerError> {
        let (object_id, version) = self.object_ref(handle)?;
        let output = self
            .submit(
                "withdraw",
                &[
                    object_id.to_string(),
                    version.to_string(),
                    format!("0x{}", hex::encode(secret.as_bytes())),
                ],
            )
            .await?;
        Ok(output.digest)
    }

    async fn cancel(&self, handle: &LockHandle) -> Result<TxId, LedgerError> {
        let (object_id, version) = self.object_ref(handle)?;
        let output = self
            .submit("cancel", &[object_id.to_string(), version.to_string()])
            .await?;
        Ok(output.digest)
    }

    async fn read_lock(&self, handle: &LockHandle) -> Result<LockSnapshot, LedgerError> {
        let (object_id, _) = self.object_ref(handle)?;
        let stdout = self.run_client(&["object", object_id]).await?;
        let object: LockObject = serde_json::from_str(&stdout)
            .map_err(|e| LedgerError::Rpc(format!("bad lock object json: {}", e)))?;
        snapshot_from_object(object)
    }

    async fn ledger_time(&self) -> Result<u64, LedgerError> {
        let stdout = self.run_client(&["ledger-time"]).await?;
        let clock: LedgerClock = serde_json::from_str(&stdout)
            .map_err(|e| LedgerError::Rpc(format!("bad ledger clock json: {}", e)))?;
        Ok(clock.timestamp_ms)
    }
}

/// Converts the object's absolute millisecond deadlines back into tier
/// offsets. The deadlines were produced by integer multiplication from
/// second offsets, so the division here is exact.
fn snapshot_from_object(object: LockObject) -> Result<LockSnapshot, LedgerError> {
    let offset = |deadline_ms: u64| -> Result<u32, LedgerError> {
        let secs = deadline_ms
            .checked_sub(object.created_at_ms)
            .ok_or_else(|| LedgerError::Rpc("deadline precedes creation".to_string()))?
            / 1000;
        u32::try_from(secs).map_err(|_| LedgerError::Rpc("tier offset overflows u32".to_string()))
    };
    let tiers = TimelockTiers {
        withdrawal: offset(object.withdrawal_deadline_ms)?,
        public_withdrawal: offset(object.public_withdrawal_deadline_ms)?,
        cancellation: offset(object.cancellation_deadline_ms)?,
        public_cancellation: object
            .public_cancellation_deadline_ms
            .map(offset)
            .transpose()?,
    };
    let state = match object.state.as_str() {
        "active" => LockState::Active,
        "consumed" => LockState::Consumed,
        "refunded" => LockState::Refunded,
        other => {
            return Err(LedgerError::Rpc(format!("unknown lock state '{}'", other)));
        }
    };
    Ok(LockSnapshot {
        commitment: Commitment::from_hex(&object.commitment)
            .map_err(|e| LedgerError::Rpc(e.to_string()))?,
        amount: object.amount,
        safety_deposit: object.safety_deposit,
        funder: object.funder,
        recipient: object.recipient,
        tiers,
        created_at_ms: object.created_at_ms,
        state,
    })
}

/// Maps the escrow package's abort names onto the adapter error surface.
fn map_abort(reason: &str) -> LedgerError {
    if reason.contains("EWrongSecret") {
        LedgerError::WrongSecret
    } else if reason.contains("ENotYetWithdrawable") {
        LedgerError::NotYetWithdrawable
    } else if reason.contains("ENotYetCancellable") {
        LedgerError::NotYetCancellable
    } else if reason.contains("EWindowExpired") {
        LedgerError::WindowExpired
    } else if reason.contains("EAlreadyConsumed") {
        LedgerError::AlreadyConsumed
    } else if reason.contains("ELockNotFound") || reason.contains("object not found") {
        LedgerError::LockNotFound
    } else {
        LedgerError::Rejected(reason.trim().to_string())
    }
}
