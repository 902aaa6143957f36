//! Candidate selection - Reduce a frame's correlation vector to marked hypotheses.
//!
//! A lag is marked when its correlation reaches `min_acceptable_peak_val`
//! times the frame's maximum. At most `max_hypotheses_per_frame - 1` lags
//! survive; the remaining slot belongs to the unvoiced hypothesis, which is
//! never stored in the marked list but is always available to the
//! dynamic-programming stage.

use std::cmp::Ordering;

use crate::params::RaptParams;

/// A period hypothesis for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Period in samples (0 = unvoiced).
    pub lag: usize,
    /// Normalized cross-correlation at `lag`.
    pub correlation: f64,
}

impl Candidate {
    /// The reserved unvoiced hypothesis `(0, 0.0)`.
    pub const UNVOICED: Candidate = Candidate {
        lag: 0,
        correlation: 0.0,
    };

    /// Create a new candidate.
    pub fn new(lag: usize, correlation: f64) -> Self {
        Self { lag, correlation }
    }

    /// Whether this is the unvoiced hypothesis.
    #[inline]
    pub fn is_unvoiced(&self) -> bool {
        self.lag == 0
    }

    /// Frequency implied by the lag at `sample_rate` (0 if unvoiced).
    #[inline]
    pub fn frequency(&self, sample_rate: f64) -> f64 {
        if self.is_unvoiced() {
            0.0
        } else {
            sample_rate / self.lag as f64
        }
    }
}

/// Mark the strongest lags of one frame.
///
/// `correlations` pairs each evaluated lag with its correlation, in any
/// order. `max_correlation` is the frame maximum the threshold is relative
/// to; it is passed in rather than recomputed so that re-applying the rule
/// to its own output is a no-op.
///
/// The result is sorted by descending correlation, ties broken toward the
/// shorter lag, and holds at most `max_hypotheses_per_frame - 1` entries.
/// A frame whose maximum is not positive has no periodicity to mark and
/// yields an empty list.
pub fn select_candidates(
    correlations: &[Candidate],
    max_correlation: f64,
    params: &RaptParams,
) -> Vec<Candidate> {
    if !(max_correlation > 0.0) {
        return Vec::new();
    }

    let threshold = max_correlation * params.min_acceptable_peak_val;
    let mut marked: Vec<Candidate> = correlations
        .iter()
        .filter(|c| !c.is_unvoiced() && c.correlation >= threshold)
        .copied()
        .collect();

    marked.sort_by(rank);
    marked.truncate(params.max_hypotheses_per_frame.saturating_sub(1));
    marked
}

/// Descending correlation, then ascending lag.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.correlation
        .partial_cmp(&a.correlation)
        .unwrap_or(Ordering::Equal)
        .then(a.lag.cmp(&b.lag))
}
