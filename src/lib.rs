#![cfg_attr(docsrs, feature(doc_cfg))]
//! # dorfler-mark
//!
//! dorfler-mark computes Dörfler marking thresholds for adaptive mesh refinement when the
//! per-element error estimates are partitioned across the ranks of a process group. It
//! finds one global threshold such that elements with estimate `>= threshold` carry at least
//! a requested fraction of the global squared error, without ever gathering the estimates.
//!
//! ## Features
//! - Sorted local index with prefix sums of squared error for O(log n) marking queries
//! - Distributed bisection driven only by scalar all-reductions (min, max, sum)
//! - Pluggable communication backends (serial, in-process threads, MPI)
//! - Over-marking finalization: the returned threshold always covers the fraction
//!
//! ## Determinism
//!
//! Reductions fold contributions in rank order, so every rank observes bit-identical
//! results and follows the same bisection path.
//!
//! ## Usage
//!
//! ```
//! use dorfler_mark::prelude::*;
//!
//! let threshold = compute_threshold(&NoComm, 0.5, &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
//! assert_eq!(threshold, 4.0);
//! ```
//!
//! Enable the `mpi-support` feature for [`algs::communicator::MpiComm`].

pub mod adapt;
pub mod algs;
pub mod debug_invariants;
pub mod dorfler_error;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapt::dorfler::{
        compute_threshold, compute_threshold_with, DorflerOptions, MarkingSummary,
    };
    pub use crate::adapt::estimates::{mark_elements, SortedEstimates};
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::reduction::ReduceOp;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::dorfler_error::DorflerError;
}
