//! Element-wise reduction operators for collective calls.
//!
//! Contributions are always folded in rank order `0..size`, so every rank of a
//! group that folds the same contributions observes bit-identical results. This
//! matters for `Sum` over `f64`, which is not associative.

use serde::{Deserialize, Serialize};

/// Reduction applied element-wise across all ranks of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceOp {
    Min,
    Max,
    Sum,
}

impl ReduceOp {
    /// Stable tag carried on the wire.
    pub fn code(self) -> u16 {
        match self {
            ReduceOp::Min => 1,
            ReduceOp::Max => 2,
            ReduceOp::Sum => 3,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(ReduceOp::Min),
            2 => Some(ReduceOp::Max),
            3 => Some(ReduceOp::Sum),
            _ => None,
        }
    }

    #[inline]
    pub fn combine_f64(self, acc: f64, x: f64) -> f64 {
        match self {
            ReduceOp::Min => acc.min(x),
            ReduceOp::Max => acc.max(x),
            ReduceOp::Sum => acc + x,
        }
    }

    #[inline]
    pub fn combine_u64(self, acc: u64, x: u64) -> u64 {
        match self {
            ReduceOp::Min => acc.min(x),
            ReduceOp::Max => acc.max(x),
            ReduceOp::Sum => acc + x,
        }
    }

    /// Fold per-rank `f64` contributions (indexed by rank) into `out`.
    ///
    /// Every contribution must have `out.len()` entries; callers validate this
    /// before folding.
    pub fn fold_f64<'a, I>(self, contributions: I, out: &mut [f64])
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let mut iter = contributions.into_iter();
        if let Some(first) = iter.next() {
            out.copy_from_slice(first);
        }
        for contrib in iter {
            for (acc, &x) in out.iter_mut().zip(contrib) {
                *acc = self.combine_f64(*acc, x);
            }
        }
    }

    /// Fold per-rank `u64` contributions (indexed by rank) into `out`.
    pub fn fold_u64<'a, I>(self, contributions: I, out: &mut [u64])
    where
        I: IntoIterator<Item = &'a [u64]>,
    {
        let mut iter = contributions.into_iter();
        if let Some(first) = iter.next() {
            out.copy_from_slice(first);
        }
        for contrib in iter {
            for (acc, &x) in out.iter_mut().zip(contrib) {
                *acc = self.combine_u64(*acc, x);
            }
        }
    }
}
