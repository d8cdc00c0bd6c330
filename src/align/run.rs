use std::sync::Arc;

use log::{debug, info};

use crate::align::chain::{Chain, ChainBuilder, UsedMarks};
use crate::align::clique::{Clique, MutualBestHitCriterion, RtStatsUpdater};
use crate::align::matching::MatchParams;
use crate::align::peak::{validate_peak_lists, PeakList, Result};
use crate::align::similarity::Similarity;

/// Everything one run produces: the draft chains in seed order and the
/// cliques materialized from them (clique id = chain position). Peaks whose
/// clique admission failed are counted here; they stay consumed for the run
/// and simply do not appear in any clique.
#[derive(Debug)]
pub struct Alignment {
    pub chains: Vec<Chain>,
    pub cliques: Vec<Clique>,
    pub rejected_adds: usize,
}

/// Drives one full correspondence run: validate the input lists, build all
/// chains once, then fold every chain into a clique in sample order.
pub struct PeakAligner {
    sim: Arc<dyn Similarity>,
    params: MatchParams,
}

impl PeakAligner {
    pub fn new(sim: Arc<dyn Similarity>, params: MatchParams) -> Self {
        Self { sim, params }
    }

    /// Run with the default strategies: mutual-best-hit admission against
    /// every member, rt statistics and a feature-space medoid.
    pub fn align(&self, lists: Arc<Vec<PeakList>>) -> Result<Alignment> {
        let criterion = Arc::new(MutualBestHitCriterion::new(
            lists.clone(),
            self.sim.clone(),
            self.params,
        ));
        let updater = Arc::new(RtStatsUpdater);
        self.align_with(&lists, |id| {
            Clique::new(id, criterion.clone(), updater.clone())
        })
    }

    /// Run with caller-supplied cliques, one per chain.
    pub fn align_with<F>(&self, lists: &[PeakList], mut make_clique: F) -> Result<Alignment>
    where
        F: FnMut(u64) -> Clique,
    {
        validate_peak_lists(lists)?;

        let builder = ChainBuilder::new(lists, self.sim.as_ref(), self.params);
        let mut used = UsedMarks::new(lists.len());
        let chains = builder.build_chains(&mut used);

        let mut rejected_adds = 0usize;
        let mut cliques = Vec::with_capacity(chains.len());
        for (k, chain) in chains.iter().enumerate() {
            let mut clique = make_clique(k as u64);
            for (sample, index) in chain.matched() {
                let peak = lists[sample].get(index);
                if !clique.add(peak) {
                    // soft rejection: the peak stays consumed and is dropped
                    // from the output of this run
                    rejected_adds += 1;
                    debug!(
                        "clique {}: rejected peak {} from sample {}",
                        k, peak.id, sample
                    );
                }
            }
            cliques.push(clique);
        }

        info!(
            "aligned {} samples: {} chains, {} rejected adds",
            lists.len(),
            chains.len(),
            rejected_adds
        );

        Ok(Alignment {
            chains,
            cliques,
            rejected_adds,
        })
    }
}
