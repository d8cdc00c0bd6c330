use serde::{Deserialize, Serialize};

use crate::align::peak::{AlignmentError, Peak, PeakList, Result};
use crate::align::similarity::{Polarity, Similarity};

/// Search parameters for the windowed matcher. Constructed through `new` so a
/// bad window or threshold is rejected up front rather than mid-run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MatchParams {
    /// Score cutoff applied to the winning candidate; 0.0 disables the cut.
    pub threshold: f64,
    /// Maximum |Δrt| between query and candidate, in retention units.
    pub window: f64,
}

impl MatchParams {
    pub fn new(threshold: f64, window: f64) -> Result<Self> {
        if !window.is_finite() || window <= 0.0 {
            return Err(AlignmentError::InvalidWindow(window));
        }
        if !threshold.is_finite() {
            return Err(AlignmentError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold, window })
    }
}

/// Best-scoring candidate for `query` within the retention window, or `None`
/// if the list is empty, nothing falls inside the window, or the winner fails
/// the threshold.
///
/// `candidates` must be sorted non-decreasing by rt: the scan stops as soon
/// as a candidate lies past the window, which makes the expected cost
/// proportional to the window occupancy rather than the list length. Ties
/// keep the first candidate in list order (deterministic, not an optimality
/// claim).
pub fn find_best_match(
    query: &Peak,
    candidates: &PeakList,
    sim: &dyn Similarity,
    params: &MatchParams,
) -> Option<(usize, f64)> {
    let minimize = sim.polarity() == Polarity::Minimize;
    let mut best: Option<(usize, f64)> = None;

    for (i, c) in candidates.peaks.iter().enumerate() {
        let diff = query.rt - c.rt;
        if diff < -params.window {
            // sorted order: every later candidate is even further past the window
            break;
        }
        if diff > params.window {
            // candidate still before the window
            continue;
        }
        let score = sim.score(query, c);
        let better = match best {
            None => true,
            Some((_, b)) => {
                if minimize {
                    score < b
                } else {
                    score > b
                }
            }
        };
        if better {
            best = Some((i, score));
        }
    }

    let (i, s) = best?;
    if params.threshold != 0.0 {
        let rejected = if minimize {
            s > params.threshold
        } else {
            s < params.threshold
        };
        if rejected {
            return None;
        }
    }
    Some((i, s))
}

/// True iff `list_a[i]` and its best hit in `list_b` are each other's best
/// hits under the same similarity and parameters.
pub fn is_mutual_best_hit(
    list_a: &PeakList,
    i: usize,
    list_b: &PeakList,
    sim: &dyn Similarity,
    params: &MatchParams,
) -> bool {
    let Some((j, _)) = find_best_match(list_a.get(i), list_b, sim, params) else {
        return false;
    };
    match find_best_match(list_b.get(j), list_a, sim, params) {
        Some((back, _)) => back == i,
        None => false,
    }
}
