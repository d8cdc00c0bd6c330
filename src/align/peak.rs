use std::collections::HashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Stable 64-bit id for peaks; never reused within a run
pub type PeakId = i64;

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("peak list for sample {sample} is not sorted by retention time: \
             rt drops from {prev} to {next} at index {index}")]
    UnsortedPeakList {
        sample: usize,
        index: usize,
        prev: f64,
        next: f64,
    },

    #[error("duplicate peak id {id} in sample {sample} at index {index}")]
    DuplicatePeakId {
        sample: usize,
        index: usize,
        id: PeakId,
    },

    #[error("peak at index {index} of sample {sample} is tagged with sample {tag}")]
    SampleTagMismatch {
        sample: usize,
        index: usize,
        tag: usize,
    },

    #[error("invalid match window {0}: must be finite and > 0")]
    InvalidWindow(f64),

    #[error("invalid match threshold {0}: must be finite")]
    InvalidThreshold(f64),
}

// Type alias for Result
pub type Result<T> = std::result::Result<T, AlignmentError>;

/// One detected chromatographic feature in one sample. Immutable once
/// produced by the detection stage; this subsystem only reads it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub id: PeakId,
    pub sample: usize,           // originating sample index
    pub rt: f64,                 // primary retention coordinate (seconds)
    pub rt2: Option<f64>,        // second-dimension retention (GCxGC), if any
    pub feature: Vec<f64>,       // spectral fingerprint, compared by the similarity fn
    pub apex: f64,               // apex intensity, carried through unchanged
    pub area: f64,               // integrated area, carried through unchanged
}

impl Peak {
    pub fn new(id: PeakId, sample: usize, rt: f64, feature: Vec<f64>) -> Self {
        Self {
            id,
            sample,
            rt,
            rt2: None,
            feature,
            apex: 0.0,
            area: 0.0,
        }
    }
}

/// All peaks of one sample, sorted non-decreasing by `rt`. The sort order is
/// a required precondition (the matcher's early exit relies on it) and is
/// checked by `validate_peak_lists` before a run, not re-checked per query.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PeakList {
    pub peaks: Vec<Peak>,
}

impl PeakList {
    pub fn new(peaks: Vec<Peak>) -> Self {
        Self { peaks }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Peak {
        &self.peaks[index]
    }

    /// Check the sort and uniqueness preconditions for the list at position
    /// `sample`. Unsorted input would not fail loudly downstream; it would
    /// silently truncate candidate scans, so it is rejected here.
    pub fn validate(&self, sample: usize) -> Result<()> {
        let mut seen: HashSet<PeakId> = HashSet::with_capacity(self.peaks.len());
        let mut prev_rt = f64::NEG_INFINITY;

        for (index, p) in self.peaks.iter().enumerate() {
            if p.sample != sample {
                return Err(AlignmentError::SampleTagMismatch {
                    sample,
                    index,
                    tag: p.sample,
                });
            }
            if p.rt < prev_rt {
                return Err(AlignmentError::UnsortedPeakList {
                    sample,
                    index,
                    prev: prev_rt,
                    next: p.rt,
                });
            }
            prev_rt = p.rt;
            if !seen.insert(p.id) {
                return Err(AlignmentError::DuplicatePeakId {
                    sample,
                    index,
                    id: p.id,
                });
            }
        }
        Ok(())
    }
}

/// Validate all lists of a run up front. Lists are independent, so the pass
/// runs in parallel; the reported error is the one from the lowest sample
/// index so the outcome does not depend on scheduling.
pub fn validate_peak_lists(lists: &[PeakList]) -> Result<()> {
    let mut errors: Vec<AlignmentError> = lists
        .par_iter()
        .enumerate()
        .filter_map(|(sample, list)| list.validate(sample).err())
        .collect();

    match errors.is_empty() {
        true => Ok(()),
        false => Err(errors.remove(0)),
    }
}
