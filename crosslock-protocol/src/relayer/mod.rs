// Interface to the quote/order negotiation backend. The backend itself is
// an external service; only its contract (and an in-memory double for
// tests) lives here.

pub mod backend;
pub mod types;

pub use backend::{BackendError, InMemoryBackend, NegotiationBackend};
pub use types::{
    ActiveOrdersPage, CommitmentInfo, Order, OrderStatus, PublishedSecret, Quote, ReadyFill,
};
