//! AMM Model - Constant product pool simulator (x·y=k)
//!
//! Off-chain model of a two-asset constant product pool, driven the same way a
//! router drives a live pair:
//! - **Reserve ledger** ([`pool`]): reserve pair, liquidity total, atomic commit
//! - **Quote engine** ([`math`]): swap output/input and deposit ratio quotes
//! - **Fee-on-transfer adapter** ([`asset`]): nominal → actually received
//! - **Guarded executor** ([`executor`]): quote, guard, commit or abort
//! - **Registry** ([`registry`]): per-pool locking and the caller-facing API
//!
//! All amounts are `u128` in the asset's smallest unit. Intermediate products
//! are computed in 256 bits and checked back down.

pub mod asset;
pub mod clock;
pub mod executor;
pub mod guard;
pub mod math;
pub mod pool;
pub mod registry;

pub use asset::{actual_received, Asset, AssetId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::{LiquidityReceipt, SwapReceipt, WithdrawReceipt};
pub use guard::{Guard, LiquidityGuard};
pub use math::{Quote, U256};
pub use pool::{Pool, PoolKey, PoolRow};
pub use registry::{PathReceipt, PoolRegistry};

/// Basis points scale (10,000 bps = 100%)
pub const BPS_SCALE: u128 = 10_000;

/// Amount in an asset's smallest indivisible unit
pub type Amount = u128;

/// Error types for AMM operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmmError {
    /// Malformed reserves or a commit against an uninitialized pool
    #[error("invariant violation")]
    InvariantViolation,
    /// Pool cannot serve the requested trade
    #[error("insufficient liquidity")]
    InsufficientLiquidity,
    /// Realized amount is outside the caller's tolerance
    #[error("slippage exceeded")]
    SlippageExceeded,
    /// Clock passed the caller's deadline
    #[error("deadline expired")]
    DeadlineExpired,
    /// Seeding a pool that already holds reserves
    #[error("pool already initialized")]
    AlreadyInitialized,
    /// Invalid amount (zero, or more shares than exist)
    #[error("invalid amount")]
    InvalidAmount,
    /// Fee or transfer tax of 100% or more
    #[error("invalid fee")]
    InvalidFee,
    /// Result does not fit the 128-bit amount range
    #[error("arithmetic overflow")]
    Overflow,
    /// Asset was never registered
    #[error("unknown asset")]
    UnknownAsset,
    /// No pool exists for the pair
    #[error("unknown pool")]
    UnknownPool,
    /// Both sides of a pair are the same asset
    #[error("identical assets")]
    IdenticalAssets,
}

impl AmmError {
    /// Errors a caller is expected to handle by re-quoting and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AmmError::SlippageExceeded | AmmError::DeadlineExpired)
    }
}

pub type Result<T> = core::result::Result<T, AmmError>;
