use serde::{Deserialize, Serialize};

use crate::align::peak::Peak;

/// Whether lower or higher scores are better. Fixed per similarity instance,
/// so forward and reverse queries within one run can never disagree on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Minimize,
    Maximize,
}

/// Scoring strategy between two peaks. Implementations must be pure: same
/// inputs, same score, no side effects.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &Peak, b: &Peak) -> f64;
    fn polarity(&self) -> Polarity;
}

#[inline]
fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut na = 0.0;
    let mut nb = 0.0;
    // mismatched lengths are tolerated; the shorter vector decides
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Default similarity: feature-vector cosine damped by a Gaussian penalty on
/// the retention-time difference (and, if both peaks carry one, on the
/// second-dimension difference). Score is in [-1, 1], higher is better.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaussianRtDot {
    pub rt_tolerance: f64,            // sigma of the rt penalty (seconds)
    pub rt2_tolerance: Option<f64>,   // sigma of the second-dimension penalty
}

impl Default for GaussianRtDot {
    fn default() -> Self {
        Self {
            rt_tolerance: 10.0,
            rt2_tolerance: None,
        }
    }
}

impl Similarity for GaussianRtDot {
    fn score(&self, a: &Peak, b: &Peak) -> f64 {
        let d_rt = a.rt - b.rt;
        let mut s = cosine(&a.feature, &b.feature)
            * (-(d_rt * d_rt) / (2.0 * self.rt_tolerance * self.rt_tolerance)).exp();

        if let (Some(tol), Some(ra), Some(rb)) = (self.rt2_tolerance, a.rt2, b.rt2) {
            let d2 = ra - rb;
            s *= (-(d2 * d2) / (2.0 * tol * tol)).exp();
        }
        s
    }

    fn polarity(&self) -> Polarity {
        Polarity::Maximize
    }
}

/// Plain |Δrt| distance, lower is better. Useful when no informative feature
/// vectors are available, and as a transparent instance in tests.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct RtDelta;

impl Similarity for RtDelta {
    fn score(&self, a: &Peak, b: &Peak) -> f64 {
        (a.rt - b.rt).abs()
    }

    fn polarity(&self) -> Polarity {
        Polarity::Minimize
    }
}
