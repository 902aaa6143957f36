//! Dynamic programming - Pick the lowest-cost voicing/period path.
//!
//! Documentation sources:
//! - Talkin (1995), section 3.4: local costs (Eq. 5, 6) and transition
//!   costs (Eq. 7 to 10)
//!
//! Each frame holds one node per marked candidate plus an unvoiced node at
//! index 0. Node costs follow
//!
//! ```text
//! D(t, j) = d(t, j) + min_k [ D(t-1, k) + δ(t, k, j) ]
//! ```
//!
//! and the winning `k` is kept as a backpointer. The lattice is an arena
//! indexed `[frame][node]`, so the path is recovered by walking indices
//! backward from the cheapest node of the last frame.
//!
//! Local costs:
//! - voiced: `1 - C · (1 - β · L)` with `β = lag_weight / longest_lag`
//! - unvoiced: `voicing_bias + max_correlation_for_frame`
//!
//! Transition costs:
//! - unvoiced → unvoiced: 0
//! - voiced → voiced: `freq_weight · min(|ρ|, doubling_cost + |ρ ± ln 2|)`,
//!   with `ρ = ln(L_t / L_{t-1})`
//! - unvoiced → voiced: `transition_cost + spec_mod · S_t + amp_mod / r_t`
//! - voiced → unvoiced: `transition_cost + spec_mod · S_t + amp_mod · r_t`

use std::f64::consts::LN_2;

use ndarray::ArrayView1;
use rayon::prelude::*;

use crate::candidates::Candidate;
use crate::error::{Error, Result};
use crate::params::RaptParams;
use crate::stationarity::Stationarity;

/// One lattice node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DpNode {
    /// Lowest cumulative cost of any path ending here.
    pub cost: f64,
    /// Hypothesis this node stands for.
    pub candidate: Candidate,
    /// Node index in the previous frame (None in frame 0).
    pub backpointer: Option<usize>,
}

/// Everything the cost functions need besides the candidates.
#[derive(Debug, Clone, Copy)]
pub struct CostContext<'a> {
    /// Tracker parameters.
    pub params: &'a RaptParams,
    /// "K" of the pass the candidate lags come from.
    pub longest_lag: usize,
    /// Maximum correlation of each frame.
    pub max_correlations: ArrayView1<'a, f64>,
    /// Spectral/amplitude change of each frame.
    pub stationarity: &'a Stationarity,
}

impl CostContext<'_> {
    /// Cost of `candidate` in `frame`, independent of history.
    pub fn local_cost(&self, frame: usize, candidate: &Candidate) -> f64 {
        if candidate.is_unvoiced() {
            self.params.voicing_bias + self.max_correlations[frame]
        } else {
            let beta = self.params.lag_weight / self.longest_lag as f64;
            1.0 - candidate.correlation * (1.0 - beta * candidate.lag as f64)
        }
    }

    /// Cost of moving from `previous` in frame `frame - 1` to `current` in `frame`.
    pub fn transition_cost(&self, frame: usize, previous: &Candidate, current: &Candidate) -> f64 {
        let params = self.params;
        match (previous.is_unvoiced(), current.is_unvoiced()) {
            (true, true) => 0.0,
            (false, false) => {
                let rho = (current.lag as f64 / previous.lag as f64).ln();
                let octave = params.doubling_cost + (rho + LN_2).abs().min((rho - LN_2).abs());
                params.freq_weight * rho.abs().min(octave)
            }
            (true, false) => {
                self.voicing_change_base(frame)
                    + params.amp_mod_transition_cost / self.stationarity.amplitude_ratio()[frame]
            }
            (false, true) => {
                self.voicing_change_base(frame)
                    + params.amp_mod_transition_cost * self.stationarity.amplitude_ratio()[frame]
            }
        }
    }

    fn voicing_change_base(&self, frame: usize) -> f64 {
        self.params.transition_cost
            + self.params.spec_mod_transition_cost * self.stationarity.spectral()[frame]
    }
}

/// Build the cost lattice over all frames.
///
/// `candidates[t]` holds the marked voiced hypotheses of frame `t`; the
/// unvoiced node is added in front of them. Ties are resolved toward the
/// lower node index, so the lattice is fully deterministic.
///
/// # Errors
///
/// `Error::InvalidInput` when the per-frame inputs disagree on the number
/// of frames.
pub fn build_lattice(candidates: &[Vec<Candidate>], context: &CostContext<'_>) -> Result<Vec<Vec<DpNode>>> {
    let n_frames = candidates.len();
    if context.max_correlations.len() != n_frames || context.stationarity.n_frames() != n_frames {
        return Err(Error::InvalidInput(format!(
            "frame count mismatch: {} candidate frames, {} maxima, {} stationarity frames",
            n_frames,
            context.max_correlations.len(),
            context.stationarity.n_frames()
        )));
    }

    let mut lattice: Vec<Vec<DpNode>> = Vec::with_capacity(n_frames);

    for (frame, marked) in candidates.iter().enumerate() {
        let hypotheses: Vec<Candidate> = std::iter::once(Candidate::UNVOICED)
            .chain(marked.iter().copied())
            .collect();

        let nodes: Vec<DpNode> = match lattice.last() {
            None => hypotheses
                .iter()
                .map(|c| DpNode {
                    cost: context.local_cost(frame, c),
                    candidate: *c,
                    backpointer: None,
                })
                .collect(),
            Some(previous) => hypotheses
                .par_iter()
                .map(|c| {
                    let (best, cost) = cheapest_predecessor(previous, frame, c, context);
                    DpNode {
                        cost: context.local_cost(frame, c) + cost,
                        candidate: *c,
                        backpointer: Some(best),
                    }
                })
                .collect(),
        };

        lattice.push(nodes);
    }

    Ok(lattice)
}

/// Index and accumulated cost of the best way into `current`.
fn cheapest_predecessor(
    previous: &[DpNode],
    frame: usize,
    current: &Candidate,
    context: &CostContext<'_>,
) -> (usize, f64) {
    let mut best = 0;
    let mut best_cost = f64::INFINITY;
    for (k, node) in previous.iter().enumerate() {
        let cost = node.cost + context.transition_cost(frame, &node.candidate, current);
        if cost < best_cost {
            best = k;
            best_cost = cost;
        }
    }
    (best, best_cost)
}

/// Walk backpointers from the cheapest node of the last frame.
///
/// Returns one chosen candidate per frame, frame 0 first.
pub fn backtrace(lattice: &[Vec<DpNode>]) -> Vec<Candidate> {
    let last = match lattice.last() {
        Some(last) => last,
        None => return Vec::new(),
    };

    let mut index = argmin(last);
    let mut path = Vec::with_capacity(lattice.len());
    for frame in lattice.iter().rev() {
        let node = &frame[index];
        path.push(node.candidate);
        index = node.backpointer.unwrap_or(0);
    }
    path.reverse();
    path
}

fn argmin(nodes: &[DpNode]) -> usize {
    let mut best = 0;
    for (i, node) in nodes.iter().enumerate() {
        if node.cost < nodes[best].cost {
            best = i;
        }
    }
    best
}

/// Choose the lowest-cost hypothesis sequence for a whole signal.
///
/// Frames without marked candidates pass through unvoiced.
pub fn find_best_path(candidates: &[Vec<Candidate>], context: &CostContext<'_>) -> Result<Vec<Candidate>> {
    let lattice = build_lattice(candidates, context)?;
    let path = backtrace(&lattice);

    let voiced = path.iter().filter(|c| !c.is_unvoiced()).count();
    tracing::debug!(frames = path.len(), voiced, "dynamic programming complete");

    Ok(path)
}
