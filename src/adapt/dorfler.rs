//! Distributed Dörfler marking threshold.
//!
//! Given error estimates spread over all ranks of a group, find one global
//! threshold `t` such that the elements with estimate `>= t` hold at least a
//! `fraction` of the global squared error, while marking as few elements as
//! the bisection can resolve.
//!
//! Every rank runs the same sequence of collective reductions:
//!
//! 1. global min/max of each rank's locally-optimal threshold, which bracket
//!    the global answer;
//! 2. global sums of element counts and squared error at both bracket ends,
//!    and the global max estimate;
//! 3. up to `max_iter` bisection steps, each with one sum of the candidate's
//!    marked count and one sum of its marked error.
//!
//! Only scalars cross rank boundaries, so communication volume does not
//! depend on the number of local elements.

use serde::{Deserialize, Serialize};

use crate::adapt::estimates::{MarkStats, SortedEstimates};
use crate::algs::communicator::Communicator;
use crate::dorfler_error::DorflerError;

/// Maximum bisection steps; bounds the work regardless of convergence.
pub const DEFAULT_MAX_ITER: usize = 100;

/// Knobs for [`compute_threshold_with`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DorflerOptions {
    /// Cap on bisection iterations.
    pub max_iter: usize,
    /// Emit the summary line on rank 0.
    pub report: bool,
}

impl Default for DorflerOptions {
    fn default() -> Self {
        Self {
            max_iter: DEFAULT_MAX_ITER,
            report: true,
        }
    }
}

/// Why the bisection stopped before the iteration cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Convergence {
    /// Bracket narrower than `2ε · max estimate`.
    ThresholdWidth,
    /// Candidate fraction within `2ε` of the target.
    Fraction,
    /// Bracket endpoints mark element counts differing by at most one.
    ElementCount,
}

/// Global outcome of a marking decision. Identical on every rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkingSummary {
    pub threshold: f64,
    pub elements_marked: u64,
    pub elements_total: u64,
    pub error_marked: f64,
    pub error_total: f64,
    pub iterations: usize,
    /// `None` when the iteration cap was reached.
    pub converged: Option<Convergence>,
}

impl MarkingSummary {
    /// Fraction of the global squared error captured by `threshold`.
    pub fn fraction_marked(&self) -> f64 {
        self.error_marked / self.error_total
    }
}

/// `true` when a candidate captured more than the target fraction.
///
/// Lower thresholds mark more elements and so a larger fraction; a candidate
/// that marks too much must raise the lower end of the bracket.
#[inline]
pub fn marks_too_much(candidate_fraction: f64, target_fraction: f64) -> bool {
    candidate_fraction > target_fraction
}

/// A threshold together with the global statistics it marks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    pub threshold: f64,
    pub marked: MarkStats,
}

/// Bracket `[lower, upper]` containing the global threshold.
///
/// `lower` always marks at least as many elements as `upper`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lower: Endpoint,
    pub upper: Endpoint,
}

impl Bracket {
    pub fn midpoint(&self) -> f64 {
        (self.lower.threshold + self.upper.threshold) / 2.0
    }

    pub fn width(&self) -> f64 {
        (self.upper.threshold - self.lower.threshold).abs()
    }

    /// Check the stopping criteria against a freshly evaluated candidate.
    fn converged(
        &self,
        candidate_fraction: f64,
        target_fraction: f64,
        threshold_tol: f64,
    ) -> Option<Convergence> {
        let fraction_tol = 2.0 * f64::EPSILON;
        if self.width() < threshold_tol {
            Some(Convergence::ThresholdWidth)
        } else if (candidate_fraction - target_fraction).abs() < fraction_tol {
            Some(Convergence::Fraction)
        } else if self.lower.marked.elements <= self.upper.marked.elements + 1 {
            Some(Convergence::ElementCount)
        } else {
            None
        }
    }

    /// Replace one endpoint by `candidate`. Exact equality leaves the bracket as is.
    fn narrow(&mut self, candidate: Endpoint, candidate_fraction: f64, target_fraction: f64) {
        if marks_too_much(candidate_fraction, target_fraction) {
            self.lower = candidate;
        } else if marks_too_much(target_fraction, candidate_fraction) {
            // marked too little
            self.upper = candidate;
        }
    }
}

/// Global (count, error) for `threshold`: two sum reductions.
fn global_marked<C: Communicator + ?Sized>(
    comm: &C,
    index: &SortedEstimates,
    threshold: f64,
) -> Result<MarkStats, DorflerError> {
    let local = index.marked(threshold);
    let mut elements = [local.elements];
    let mut error = [local.error];
    comm.global_sum_u64(&mut elements)?;
    comm.global_sum_f64(&mut error)?;
    Ok(MarkStats {
        elements: elements[0],
        error: error[0],
    })
}

/// Compute the global Dörfler threshold for `fraction` of the squared error.
///
/// Must be called collectively by every rank of `comm`. All ranks return the
/// same value, or the same error when the failure is detected on reduced data.
pub fn compute_threshold<C: Communicator + ?Sized>(
    comm: &C,
    fraction: f64,
    estimates: &[f64],
) -> Result<f64, DorflerError> {
    compute_threshold_with(comm, fraction, estimates, &DorflerOptions::default())
        .map(|s| s.threshold)
}

/// [`compute_threshold`] with explicit options, returning the full summary.
pub fn compute_threshold_with<C: Communicator + ?Sized>(
    comm: &C,
    fraction: f64,
    estimates: &[f64],
    opts: &DorflerOptions,
) -> Result<MarkingSummary, DorflerError> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(DorflerError::FractionOutOfRange(fraction));
    }
    let index = SortedEstimates::try_new(estimates)?;

    let local_threshold = index.local_optimal_threshold(fraction);
    // Ranks without error abstain from the bracket.
    let min_threshold = comm.global_min(local_threshold.unwrap_or(f64::INFINITY))?;
    let max_threshold = comm.global_max(local_threshold.unwrap_or(f64::NEG_INFINITY))?;

    let at_min = index.marked(min_threshold);
    let at_max = index.marked(max_threshold);
    let mut elements = [index.len() as u64, at_min.elements, at_max.elements];
    let mut error = [index.total_error(), at_min.error, at_max.error];
    comm.global_sum_u64(&mut elements)?;
    comm.global_sum_f64(&mut error)?;
    let max_estimate = comm.global_max(index.max_estimate())?;
    let [elements_total, lower_elements, upper_elements] = elements;
    let [error_total, lower_error, upper_error] = error;

    if error_total <= 0.0 {
        return Err(DorflerError::DegenerateEstimates);
    }
    if !(min_threshold <= max_threshold) {
        return Err(DorflerError::InvertedBracket {
            min: min_threshold,
            max: max_threshold,
        });
    }

    let mut bracket = Bracket {
        lower: Endpoint {
            threshold: min_threshold,
            marked: MarkStats {
                elements: lower_elements,
                error: lower_error,
            },
        },
        upper: Endpoint {
            threshold: max_threshold,
            marked: MarkStats {
                elements: upper_elements,
                error: upper_error,
            },
        },
    };

    let threshold_tol = 2.0 * f64::EPSILON * max_estimate;
    let mut converged = None;
    let mut iterations = 0;
    while iterations < opts.max_iter {
        iterations += 1;
        let candidate = bracket.midpoint();
        let marked = global_marked(comm, &index, candidate)?;
        if marked.elements == 0 || marked.error <= 0.0 {
            return Err(DorflerError::NothingMarked {
                threshold: candidate,
                elements: marked.elements,
                error: marked.error,
            });
        }
        let candidate_fraction = marked.error / error_total;
        log::debug!(
            "Threshold: {:e} < {:e} < {:e}, Marked Elems: {} <= {} <= {}",
            bracket.lower.threshold,
            candidate,
            bracket.upper.threshold,
            bracket.upper.marked.elements,
            marked.elements,
            bracket.lower.marked.elements
        );

        converged = bracket.converged(candidate_fraction, fraction, threshold_tol);
        if let Some(reason) = converged {
            log::debug!(
                "Converged ({reason:?}): ΔFraction {:.3e}, ΔThreshold {:.3e} (tol {:.3e}), ΔElements {}",
                candidate_fraction - fraction,
                bracket.width(),
                threshold_tol,
                bracket
                    .lower
                    .marked
                    .elements
                    .saturating_sub(bracket.upper.marked.elements)
            );
            break;
        }

        bracket.narrow(
            Endpoint {
                threshold: candidate,
                marked,
            },
            candidate_fraction,
            fraction,
        );
    }
    if converged.is_none() {
        log::warn!(
            "Dorfler bisection hit the {} iteration cap; bracket [{:e}, {:e}]",
            opts.max_iter,
            bracket.lower.threshold,
            bracket.upper.threshold
        );
    }

    // Finalize on the lower end, which marks the larger set.
    let summary = MarkingSummary {
        threshold: bracket.lower.threshold,
        elements_marked: bracket.lower.marked.elements,
        elements_total,
        error_marked: bracket.lower.marked.error,
        error_total,
        iterations,
        converged,
    };

    if opts.report && comm.rank() == 0 {
        log::info!(
            "Threshold {:.3e} marked {} of {} and {:.2}%",
            summary.threshold,
            summary.elements_marked,
            summary.elements_total,
            100.0 * summary.fraction_marked()
        );
    }

    if !(summary.error_marked >= fraction * summary.error_total) {
        return Err(DorflerError::MarkingPredicateFailed {
            marked: summary.error_marked,
            total: summary.error_total,
            fraction,
        });
    }
    if !(summary.threshold > 0.0) {
        return Err(DorflerError::NonPositiveThreshold(summary.threshold));
    }
    Ok(summary)
}
