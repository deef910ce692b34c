use crate::ledger::interface::ChainId;
use crate::relayer::types::{
    ActiveOrdersPage, CommitmentInfo, Order, OrderStatus, PublishedSecret, Quote, ReadyFill,
};
use async_trait::async_trait;
use log::info;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("quote {0} not found")]
    QuoteNotFound(String),
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("backend transport failure: {0}")]
    Transport(String),
}

/// Contract of the remote negotiation service. All operations are
/// eventually consistent and independently retryable; none of them touch a
/// ledger.
#[async_trait]
pub trait NegotiationBackend: Send + Sync {
    async fn get_quote(
        &self,
        src_asset: &str,
        dst_asset: &str,
        amount: u64,
        wallet_id: &str,
    ) -> Result<Quote, BackendError>;

    async fn create_order(
        &self,
        quote: &Quote,
        commitment: CommitmentInfo,
    ) -> Result<Order, BackendError>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, BackendError>;

    async fn submit_secret(&self, order_id: &str, secret_hex: &str) -> Result<(), BackendError>;

    async fn get_active_orders(&self, page: u32, limit: u32)
        -> Result<ActiveOrdersPage, BackendError>;

    async fn get_ready_to_accept_fills(&self, order_id: &str)
        -> Result<Vec<ReadyFill>, BackendError>;

    async fn get_published_secrets(
        &self,
        order_id: &str,
    ) -> Result<Vec<PublishedSecret>, BackendError>;
}

struct BackendState {
    quotes: HashMap<String, Quote>,
    orders: HashMap<String, Order>,
    secrets: HashMap<String, Vec<PublishedSecret>>,
    counter: u64,
}

/// In-memory stand-in for the negotiation service, used by the test suites.
pub struct InMemoryBackend {
    src_chain_id: ChainId,
    dst_chain_id: ChainId,
    fee_bps: u64,
    supported_destinations: HashSet<ChainId>,
    state: Mutex<BackendState>,
}

impl InMemoryBackend {
    pub fn new(src_chain_id: ChainId, dst_chain_id: ChainId, fee_bps: u64) -> Self {
        let mut supported_destinations = HashSet::new();
        supported_destinations.insert(dst_chain_id);
        InMemoryBackend {
            src_chain_id,
            dst_chain_id,
            fee_bps,
            supported_destinations,
            state: Mutex::new(BackendState {
                quotes: HashMap::new(),
                orders: HashMap::new(),
                secrets: HashMap::new(),
                counter: 0,
            }),
        }
    }

    /// Marks the destination chain unsupported, for exercising the
    /// capability-flag path.
    pub fn without_destination_support(mut self) -> Self {
        self.supported_destinations.clear();
        self
    }

    pub fn set_order_status(&self, order_id: &str, status: OrderStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = status;
        }
    }
}

#[async_trait]
impl NegotiationBackend for InMemoryBackend {
    async fn get_quote(
        &self,
        src_asset: &str,
        dst_asset: &str,
        amount: u64,
        wallet_id: &str,
    ) -> Result<Quote, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.counter += 1;
        let quote = Quote {
            id: format!("quote-{}", state.counter),
            src_asset: src_asset.to_string(),
            dst_asset: dst_asset.to_string(),
            src_amount: amount,
            dst_amount: amount - amount * self.fee_bps / 10_000,
            wallet_id: wallet_id.to_string(),
        };
        state.quotes.insert(quote.id.clone(), quote.clone());
        Ok(quote)
    }

    async fn create_order(
        &self,
        quote: &Quote,
        commitment: CommitmentInfo,
    ) -> Result<Order, BackendError> {
        let mut state = self.state.lock().unwrap();
        if !state.quotes.contains_key(&quote.id) {
            return Err(BackendError::QuoteNotFound(quote.id.clone()));
        }
        state.counter += 1;
        let order = Order {
            id: format!("order-{}", state.counter),
            quote_id: quote.id.clone(),
            src_chain_id: self.src_chain_id,
            dst_chain_id: self.dst_chain_id,
            src_amount: quote.src_amount,
            dst_amount: quote.dst_amount,
            maker: quote.wallet_id.clone(),
            receiver: quote.wallet_id.clone(),
            taker: format!("resolver-{}", self.src_chain_id),
            commitment_hex: commitment.commitment_hex,
            destination_supported: self.supported_destinations.contains(&self.dst_chain_id),
            status: OrderStatus::Pending,
        };
        info!("backend: created order {} for quote {}", order.id, quote.id);
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, BackendError> {
        let state = self.state.lock().unwrap();
        state
            .orders
            .get(order_id)
            .map(|order| order.status)
            .ok_or_else(|| BackendError::OrderNotFound(order_id.to_string()))
    }

    async fn submit_secret(&self, order_id: &str, secret_hex: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if !state.orders.contains_key(order_id) {
            return Err(BackendError::OrderNotFound(order_id.to_string()));
        }
        state
            .secrets
            .entry(order_id.to_string())
            .or_default()
            .push(PublishedSecret {
                order_id: order_id.to_string(),
                secret_hex: secret_hex.to_string(),
            });
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = OrderStatus::Claimed;
        }
        Ok(())
    }

    async fn get_active_orders(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<ActiveOrdersPage, BackendError> {
        let state = self.state.lock().unwrap();
        let mut active: Vec<Order> = state
            .orders
            .values()
            .filter(|order| {
                matches!(order.status, OrderStatus::Pending | OrderStatus::Active)
            })
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        let total = active.len();
        let start = (page as usize) * (limit as usize);
        let orders = active
            .into_iter()
            .skip(start)
            .take(limit as usize)
            .collect();
        Ok(ActiveOrdersPage {
            page,
            limit,
            total,
            orders,
        })
    }

    async fn get_ready_to_accept_fills(
        &self,
        order_id: &str,
    ) -> Result<Vec<ReadyFill>, BackendError> {
        let state = self.state.lock().unwrap();
        let order = state
            .orders
            .get(order_id)
            .ok_or_else(|| BackendError::OrderNotFound(order_id.to_string()))?;
        // Partial fills are not negotiated here; an actionable order exposes
        // one full-amount slot.
        match order.status {
            OrderStatus::Pending | OrderStatus::Active => Ok(vec![ReadyFill {
                index: 0,
                amount: order.dst_amount,
            }]),
            _ => Ok(Vec::new()),
        }
    }

    async fn get_published_secrets(
        &self,
        order_id: &str,
    ) -> Result<Vec<PublishedSecret>, BackendError> {
        let state = self.state.lock().unwrap();
        Ok(state.secrets.get(order_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> InMemoryBackend {
        InMemoryBackend::new(1, 101, 100)
    }

    fn commitment_info() -> CommitmentInfo {
        CommitmentInfo {
            commitment_hex: format!("0x{}", "11".repeat(32)),
            secret_length: 32,
        }
    }

    #[tokio::test]
    async fn quote_applies_fee() {
        let backend = backend();
        let quote = backend.get_quote("TKA", "TKB", 100, "wallet-1").await.unwrap();
        assert_eq!(quote.src_amount, 100);
        assert_eq!(quote.dst_amount, 99);
    }

    #[tokio::test]
    async fn order_carries_destination_capability_flag() {
        let backend = backend();
        let quote = backend.get_quote("TKA", "TKB", 100, "wallet-1").await.unwrap();
        let order = backend.create_order(&quote, commitment_info()).await.unwrap();
        assert!(order.destination_supported);
        assert_eq!(order.status, OrderStatus::Pending);

        let unsupported = InMemoryBackend::new(1, 101, 100).without_destination_support();
        let quote = unsupported
            .get_quote("TKA", "TKB", 100, "wallet-1")
            .await
            .unwrap();
        let order = unsupported
            .create_order(&quote, commitment_info())
            .await
            .unwrap();
        assert!(!order.destination_supported);
    }

    #[tokio::test]
    async fn submitted_secret_becomes_published() {
        let backend = backend();
        let quote = backend.get_quote("TKA", "TKB", 100, "wallet-1").await.unwrap();
        let order = backend.create_order(&quote, commitment_info()).await.unwrap();

        assert!(backend.get_published_secrets(&order.id).await.unwrap().is_empty());
        backend.submit_secret(&order.id, "0xdeadbeef").await.unwrap();
        let published = backend.get_published_secrets(&order.id).await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].secret_hex, "0xdeadbeef");
        assert_eq!(
            backend.get_order_status(&order.id).await.unwrap(),
            OrderStatus::Claimed
        );
    }

    #[tokio::test]
    async fn active_orders_are_paged() {
        let backend = backend();
        for i in 0..5 {
            let quote = backend
                .get_quote("TKA", "TKB", 100 + i, "wallet-1")
                .await
                .unwrap();
            backend.create_order(&quote, commitment_info()).await.unwrap();
        }
        let first = backend.get_active_orders(0, 2).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.orders.len(), 2);
        let last = backend.get_active_orders(2, 2).await.unwrap();
        assert_eq!(last.orders.len(), 1);
    }

    #[tokio::test]
    async fn claimed_order_offers_no_fills() {
        let backend = backend();
        let quote = backend.get_quote("TKA", "TKB", 100, "wallet-1").await.unwrap();
        let order = backend.create_order(&quote, commitment_info()).await.unwrap();
        assert_eq!(
            backend.get_ready_to_accept_fills(&order.id).await.unwrap(),
            vec![ReadyFill { index: 0, amount: 99 }]
        );
        backend.submit_secret(&order.id, "0xff").await.unwrap();
        assert!(backend
            .get_ready_to_accept_fills(&order.id)
            .await
            .unwrap()
            .is_empty());
    }
}
