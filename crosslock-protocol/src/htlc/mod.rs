// Hash time-lock primitives shared by both escrow sides.

pub mod hashlock;
pub mod timelock;

pub use hashlock::{commit, generate_secret, Commitment, HashLockError, Secret, SecretConstraints};
pub use timelock::{validate_pair, TierDeadlines, TierStage, TimelockError, TimelockTiers};
