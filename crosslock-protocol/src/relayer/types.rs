use crate::ledger::interface::ChainId;
use serde::{Deserialize, Serialize};

/// Price quote for swapping `src_amount` of `src_asset` into `dst_amount`
/// of `dst_asset`, net of the backend's fee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub src_asset: String,
    pub dst_asset: String,
    pub src_amount: u64,
    pub dst_amount: u64,
    pub wallet_id: String,
}

/// Hashlock material registered with an order. Only the commitment travels;
/// the secret never leaves the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentInfo {
    pub commitment_hex: String,
    pub secret_length: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Active,
    Claimed,
    Refunded,
}

/// Order record as returned by the backend.
///
/// `destination_supported` is an explicit capability flag: fills targeting a
/// ledger the backend cannot settle are marked unsupported up front instead
/// of being smuggled through under a stand-in chain id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub quote_id: String,
    pub src_chain_id: ChainId,
    pub dst_chain_id: ChainId,
    pub src_amount: u64,
    pub dst_amount: u64,
    pub maker: String,
    pub receiver: String,
    /// Counterparty assigned to fill the order; recipient of the source
    /// lock once the secret is revealed.
    pub taker: String,
    pub commitment_hex: String,
    pub destination_supported: bool,
    pub status: OrderStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOrdersPage {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub orders: Vec<Order>,
}

/// A fill slot the counterparty is prepared to take.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyFill {
    pub index: u32,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedSecret {
    pub order_id: String,
    pub secret_hex: String,
}
