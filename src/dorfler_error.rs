//! DorflerError: Unified error type for dorfler-mark public APIs
//!
//! Every failure of the threshold computation is reported through this enum.
//! None of them is recoverable by retrying: the computation is deterministic,
//! so the same inputs fail the same way on the next attempt.

use thiserror::Error;

/// Unified error type for Dörfler marking operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DorflerError {
    /// The local estimate set was empty.
    #[error("Estimates must be non-empty")]
    EmptyEstimates,
    /// The requested fraction lies outside `(0, 1]`.
    #[error("Marking fraction {0} must lie in (0, 1]")]
    FractionOutOfRange(f64),
    /// An estimate was negative, NaN or infinite.
    #[error("Estimate #{index} = {value} is not a finite non-negative value")]
    InvalidEstimate { index: usize, value: f64 },
    /// The global total squared error is zero; no threshold can be positive.
    #[error("Global squared error is zero; nothing to mark")]
    DegenerateEstimates,
    /// The reduced bracket came back with `min > max`.
    #[error("Threshold bracket inverted: min {min:e} > max {max:e}")]
    InvertedBracket { min: f64, max: f64 },
    /// A bisection candidate marked no elements or no error across the group.
    #[error(
        "Threshold {threshold:e} left the valid range: {elements} elements and {error:e} error marked"
    )]
    NothingMarked {
        threshold: f64,
        elements: u64,
        error: f64,
    },
    /// The final threshold does not capture the requested fraction of error.
    #[error(
        "Marked error: {marked:e} total error: {total:e} fraction: {fraction}. Dorfler marking predicate failed!"
    )]
    MarkingPredicateFailed {
        marked: f64,
        total: f64,
        fraction: f64,
    },
    /// The final threshold was zero or negative.
    #[error("Threshold must be positive, got {0:e}")]
    NonPositiveThreshold(f64),
    /// A data structure failed its internal consistency checks.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// A collective reduction failed or the group left lockstep.
    #[error("Communication error: {0}")]
    Communication(String),
}
