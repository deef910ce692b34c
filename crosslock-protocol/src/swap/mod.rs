// Swap coordination: deployment orchestration, the atomic completion
// protocol, and the state tracker that records a swap's progress.

pub mod coordinator;
pub mod state;
pub mod types;

pub use coordinator::SwapCoordinator;
pub use state::{advance, SwapEvent, SwapPhase};
pub use types::{CancellationReport, CompletionReport, LockSide, SwapError, SwapId};
