//! Error-driven adaptivity: Dörfler marking over a distributed estimate set.

pub mod dorfler;
pub mod estimates;

pub use dorfler::{
    compute_threshold, compute_threshold_with, marks_too_much, Convergence, DorflerOptions,
    MarkingSummary,
};
pub use estimates::{mark_elements, MarkStats, SortedEstimates};
