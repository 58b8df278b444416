//! Sorted local error estimates with a cumulative squared-error index.
//!
//! Elements with estimate `>= t` always form a contiguous suffix of the sorted
//! sequence, so the count and squared error marked by any threshold are found
//! with a single binary search.

use serde::{Deserialize, Serialize};

use crate::debug_invariants::DebugInvariants;
use crate::dorfler_error::DorflerError;

/// Elements and squared error marked by one threshold.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarkStats {
    pub elements: u64,
    pub error: f64,
}

/// Immutable index over one rank's estimates.
#[derive(Debug, Clone)]
pub struct SortedEstimates {
    /// Ascending estimates.
    values: Vec<f64>,
    /// `cumulative[i] = Σ values[0..=i]²`.
    cumulative: Vec<f64>,
}

impl SortedEstimates {
    /// Sort `estimates` and build the squared prefix sums.
    ///
    /// Fails on an empty slice or on any negative, NaN or infinite estimate.
    pub fn try_new(estimates: &[f64]) -> Result<Self, DorflerError> {
        if estimates.is_empty() {
            return Err(DorflerError::EmptyEstimates);
        }
        if let Some((index, &value)) = estimates
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(DorflerError::InvalidEstimate { index, value });
        }

        let mut values = estimates.to_vec();
        values.sort_unstable_by(f64::total_cmp);
        let cumulative = values
            .iter()
            .scan(0.0, |acc, &v| {
                *acc += v * v;
                Some(*acc)
            })
            .collect();

        let out = Self { values, cumulative };
        crate::debug_invariants!(out.validate_invariants(), "SortedEstimates::try_new");
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    /// Local total squared error.
    pub fn total_error(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Largest local estimate.
    pub fn max_estimate(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    /// Count and squared error of local elements with estimate `>= threshold`.
    pub fn marked(&self, threshold: f64) -> MarkStats {
        let start = self.values.partition_point(|&v| v < threshold);
        let unmarked = if start > 0 {
            self.cumulative[start - 1]
        } else {
            0.0
        };
        MarkStats {
            elements: (self.values.len() - start) as u64,
            error: self.total_error() - unmarked,
        }
    }

    /// Threshold this rank would pick if it were alone.
    ///
    /// The pivot is the first element whose prefix sum reaches
    /// `(1 - fraction)` of the local total; the suffix from there holds at
    /// least `fraction` of the local error. Exact-zero estimates are never
    /// chosen since they carry no error. Returns `None` when the local error
    /// is zero.
    pub fn local_optimal_threshold(&self, fraction: f64) -> Option<f64> {
        let total = self.total_error();
        if total <= 0.0 {
            return None;
        }
        let target = (1.0 - fraction) * total;
        let pivot = self.cumulative.partition_point(|&s| s < target);
        let first_positive = self.values.partition_point(|&v| v <= 0.0);
        let index = pivot.max(first_positive).min(self.values.len() - 1);
        Some(self.values[index])
    }
}

impl DebugInvariants for SortedEstimates {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "SortedEstimates");
    }

    fn validate_invariants(&self) -> Result<(), DorflerError> {
        if self.values.len() != self.cumulative.len() {
            return Err(DorflerError::InvariantViolation(format!(
                "{} estimates but {} prefix sums",
                self.values.len(),
                self.cumulative.len()
            )));
        }
        if let Some(i) = self.values.windows(2).position(|w| w[0] > w[1]) {
            return Err(DorflerError::InvariantViolation(format!(
                "estimates not ascending at {i}"
            )));
        }
        if let Some(i) = self.cumulative.windows(2).position(|w| w[0] > w[1]) {
            return Err(DorflerError::InvariantViolation(format!(
                "prefix sums decrease at {i}"
            )));
        }
        Ok(())
    }
}

/// Local indices whose estimate meets or exceeds `threshold`, in input order.
pub fn mark_elements(estimates: &[f64], threshold: f64) -> Vec<usize> {
    estimates
        .iter()
        .enumerate()
        .filter(|&(_, &e)| e >= threshold)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(v: &[f64]) -> SortedEstimates {
        SortedEstimates::try_new(v).unwrap()
    }

    #[test]
    fn prefix_sums_of_squares() {
        let s = index(&[3.0, 1.0, 2.0]);
        assert_eq!(s.values(), &[1.0, 2.0, 3.0]);
        assert_eq!(s.cumulative(), &[1.0, 5.0, 14.0]);
        assert_eq!(s.total_error(), 14.0);
        assert_eq!(s.max_estimate(), 3.0);
        s.validate_invariants().unwrap();
    }

    #[test]
    fn marked_is_a_suffix() {
        let s = index(&[1.0, 2.0, 3.0]);
        assert_eq!(s.marked(0.0), MarkStats { elements: 3, error: 14.0 });
        assert_eq!(s.marked(1.0), MarkStats { elements: 3, error: 14.0 });
        assert_eq!(s.marked(1.5), MarkStats { elements: 2, error: 13.0 });
        assert_eq!(s.marked(3.0), MarkStats { elements: 1, error: 9.0 });
        assert_eq!(s.marked(3.5), MarkStats { elements: 0, error: 0.0 });
    }

    #[test]
    fn marked_is_monotone_in_threshold() {
        let s = index(&[0.5, 4.0, 1.0, 1.0, 2.0, 0.0, 3.0]);
        let mut last = s.marked(-1.0);
        for k in 0..50 {
            let m = s.marked(k as f64 * 0.1);
            assert!(m.elements <= last.elements);
            assert!(m.error <= last.error);
            last = m;
        }
    }

    #[test]
    fn ties_are_marked_together() {
        let s = index(&[2.0, 2.0, 2.0, 1.0]);
        assert_eq!(s.marked(2.0).elements, 3);
    }

    #[test]
    fn local_optimal_threshold_matches_pivot() {
        // squares 1, 4, 9, 16, 25; prefix 1, 5, 14, 30, 55
        let s = index(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        // (1 - 0.5) * 55 = 27.5 -> first prefix >= 27.5 is 30 at index 3
        assert_eq!(s.local_optimal_threshold(0.5), Some(4.0));
        assert_eq!(s.local_optimal_threshold(1.0), Some(1.0));
        assert_eq!(s.local_optimal_threshold(0.1), Some(5.0));
    }

    #[test]
    fn zero_estimates_are_skipped() {
        let s = index(&[0.0, 0.0, 1.0, 2.0]);
        assert_eq!(s.local_optimal_threshold(1.0), Some(1.0));
        let z = index(&[0.0, 0.0]);
        assert_eq!(z.total_error(), 0.0);
        assert_eq!(z.local_optimal_threshold(0.5), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            SortedEstimates::try_new(&[]).unwrap_err(),
            DorflerError::EmptyEstimates
        );
        assert!(matches!(
            SortedEstimates::try_new(&[1.0, -0.5]),
            Err(DorflerError::InvalidEstimate { index: 1, .. })
        ));
        assert!(matches!(
            SortedEstimates::try_new(&[f64::NAN]),
            Err(DorflerError::InvalidEstimate { index: 0, .. })
        ));
    }

    #[test]
    fn mark_elements_keeps_input_order() {
        assert_eq!(mark_elements(&[3.0, 0.5, 2.0, 2.5], 2.0), vec![0, 2, 3]);
    }
}
