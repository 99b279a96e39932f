//! Space AMM model - off-chain simulator of the Space yield-space pool
//!
//! Prices Principal Tokens (PTs) against a yield-bearing Target asset on the
//! constant-power-sum curve `x^a + y^a = k`, tracks LP mint bookkeeping, and
//! solves for the Target a user must borrow (via flash-issuance) to buy Yield
//! Tokens (YTs) with leverage.
//!
//! All pool math runs on [`rust_decimal::Decimal`]; nothing here touches the
//! network or the filesystem.

#![forbid(unsafe_code)]

pub mod borrow;
pub mod math;
pub mod optimize;
pub mod pool;

pub use borrow::YtPurchase;
pub use optimize::{powell, powell_within, Minimum, PowellOptions};
pub use pool::{FluxerParams, SpaceFluxer};
pub use rust_decimal::Decimal;

/// Seconds in a 365-day year
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Time-stretch of the reference pool, in years (`ts = 1 / (SECONDS_PER_YEAR * 12)`)
pub const DEFAULT_TS_YEARS: u64 = 12;

/// Fee numerator/denominator applied when selling PTs (`g2 = 1000 / 950`)
pub const G2_NUMERATOR: u64 = 1000;
pub const G2_DENOMINATOR: u64 = 950;

/// Error types for Space pool operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpaceError {
    /// The requested input pushes the post-swap invariant term below zero
    #[error("swap of {amount_in} exceeds the curve's feasible bound")]
    CurveExceeded { amount_in: Decimal },

    /// Invariant exponent `a = 1 - g2·ts·ttm` is not positive
    #[error("invariant exponent {0} is not positive; check g2, ts and ttm")]
    InvalidExponent(Decimal),

    /// Amount rejected by input validation
    #[error("invalid {0}: {1}")]
    InvalidAmount(&'static str, Decimal),

    /// Pool has no PT or no Target reserves to price against
    #[error("pool has no liquidity; mint first")]
    EmptyPool,

    /// Decimal overflow
    #[error("decimal overflow in curve math")]
    Overflow,

    /// Minimizer was given no starting coordinates
    #[error("minimizer start vector is empty")]
    EmptyStartVector,

    /// Minimizer start point lies where the objective has no value
    #[error("minimizer start point is outside the objective's domain")]
    InfeasibleStart,
}

/// Convenience alias used throughout the crate
pub type Result<T> = core::result::Result<T, SpaceError>;
