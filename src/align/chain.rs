use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::align::matching::{find_best_match, is_mutual_best_hit, MatchParams};
use crate::align::peak::{PeakId, PeakList};
use crate::align::similarity::Similarity;

/// One slot of a chain: the matched peak's index within that sample's list,
/// or no match for that sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    NoMatch,
    Matched(usize),
}

/// Draft correspondence spanning all samples: exactly one slot per sample
/// once finished. Slots are written once during extension and never
/// rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    slots: Vec<Slot>,
}

impl Chain {
    fn seeded(seed_sample: usize, seed_index: usize) -> Self {
        let mut slots = vec![Slot::NoMatch; seed_sample];
        slots.push(Slot::Matched(seed_index));
        Self { slots }
    }

    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Matched slots as (sample, peak index) pairs, in sample order.
    pub fn matched(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.slots.iter().enumerate().filter_map(|(s, slot)| match slot {
            Slot::Matched(i) => Some((s, *i)),
            Slot::NoMatch => None,
        })
    }

    #[inline]
    pub fn match_count(&self) -> usize {
        self.matched().count()
    }
}

/// Per-run bookkeeping of peaks already committed to some chain, one id set
/// per sample. Created empty at run start, mutated only by the chain
/// builder, dropped at run end.
#[derive(Clone, Debug)]
pub struct UsedMarks {
    marked: Vec<HashSet<PeakId>>,
}

impl UsedMarks {
    pub fn new(n_samples: usize) -> Self {
        Self {
            marked: vec![HashSet::new(); n_samples],
        }
    }

    #[inline]
    pub fn is_marked(&self, sample: usize, id: PeakId) -> bool {
        self.marked[sample].contains(&id)
    }

    /// Mark a peak as consumed. Returns false if it was already marked
    /// (re-marking the current anchor on a later commit is the only expected
    /// repeat).
    #[inline]
    pub fn mark(&mut self, sample: usize, id: PeakId) -> bool {
        self.marked[sample].insert(id)
    }

    #[inline]
    pub fn marked_count(&self, sample: usize) -> usize {
        self.marked[sample].len()
    }
}

/// Greedy seeded chain assembly over N sorted peak lists.
///
/// Every still-unused peak of samples 0..N-1 seeds one chain, left to right;
/// the chain is extended sample by sample from a moving anchor. An extension
/// commits only if the candidate is the anchor's mutual best hit and its own
/// best hit in every previously committed sample of the chain agrees with
/// what the chain already holds. On any failure the anchor stays put and the
/// sample records `NoMatch`, so a chain can skip a sample with a missing peak
/// and still continue further right.
///
/// The shared `used` marks make seed order observable: a peak consumed by an
/// earlier chain is never available to a later one.
pub struct ChainBuilder<'a> {
    lists: &'a [PeakList],
    sim: &'a dyn Similarity,
    params: MatchParams,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(lists: &'a [PeakList], sim: &'a dyn Similarity, params: MatchParams) -> Self {
        Self { lists, sim, params }
    }

    /// Run the full outer loop once and emit all chains in seed order.
    /// Leftover peaks of the last sample (which never seeds in the loop)
    /// emit singleton chains at the end.
    pub fn build_chains(&self, used: &mut UsedMarks) -> Vec<Chain> {
        let n = self.lists.len();
        let mut chains = Vec::new();
        if n == 0 {
            return chains;
        }

        for h in 0..n - 1 {
            for i in 0..self.lists[h].len() {
                if used.is_marked(h, self.lists[h].get(i).id) {
                    continue;
                }
                chains.push(self.extend_from_seed(h, i, used));
            }
        }

        let last = n - 1;
        for i in 0..self.lists[last].len() {
            if used.is_marked(last, self.lists[last].get(i).id) {
                continue;
            }
            let mut slots = vec![Slot::NoMatch; last];
            slots.push(Slot::Matched(i));
            chains.push(Chain { slots });
        }

        chains
    }

    fn extend_from_seed(&self, h: usize, i: usize, used: &mut UsedMarks) -> Chain {
        let n = self.lists.len();
        let mut chain = Chain::seeded(h, i);
        let mut anchor_list = h;
        let mut anchor_idx = i;

        for r in h + 1..n {
            let mut committed = false;
            let anchor = self.lists[anchor_list].get(anchor_idx);

            if let Some((j, _)) = find_best_match(anchor, &self.lists[r], self.sim, &self.params) {
                let candidate_id = self.lists[r].get(j).id;
                if !used.is_marked(r, candidate_id)
                    && is_mutual_best_hit(
                        &self.lists[anchor_list],
                        anchor_idx,
                        &self.lists[r],
                        self.sim,
                        &self.params,
                    )
                    && self.consistent_with_chain(&chain, anchor_list, r, j)
                {
                    chain.slots.push(Slot::Matched(j));
                    used.mark(anchor_list, anchor.id);
                    used.mark(r, candidate_id);
                    anchor_list = r;
                    anchor_idx = j;
                    committed = true;
                }
            }

            if !committed {
                chain.slots.push(Slot::NoMatch);
            }
        }

        chain
    }

    /// Re-query the candidate's best hit against every sample already
    /// committed in this chain (the anchor's own sample is covered by the
    /// mutual check). Any disagreement with an existing slot vetoes the
    /// extension; this is what keeps a later sample from contradicting an
    /// already established pairwise correspondence in the same group.
    fn consistent_with_chain(
        &self,
        chain: &Chain,
        anchor_list: usize,
        r: usize,
        j: usize,
    ) -> bool {
        let candidate = self.lists[r].get(j);
        for (x_list, slot) in chain.slots.iter().enumerate() {
            if x_list == anchor_list {
                continue;
            }
            let Slot::Matched(x_idx) = *slot else {
                continue;
            };
            match find_best_match(candidate, &self.lists[x_list], self.sim, &self.params) {
                Some((back, _)) if back == x_idx => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::peak::Peak;
    use crate::align::similarity::RtDelta;

    fn list(sample: usize, entries: &[(PeakId, f64)]) -> PeakList {
        PeakList::new(
            entries
                .iter()
                .map(|&(id, rt)| Peak::new(id, sample, rt, vec![1.0]))
                .collect(),
        )
    }

    fn build(lists: &[PeakList], window: f64) -> (Vec<Chain>, UsedMarks) {
        let params = MatchParams::new(0.0, window).unwrap();
        let builder = ChainBuilder::new(lists, &RtDelta, params);
        let mut used = UsedMarks::new(lists.len());
        let chains = builder.build_chains(&mut used);
        (chains, used)
    }

    fn slots(chain: &Chain) -> Vec<Slot> {
        chain.slots().to_vec()
    }

    #[test]
    fn test_perfect_three_sample_chain() {
        // scenario: one analyte seen in all three samples
        let lists = vec![
            list(0, &[(1, 10.0)]),
            list(1, &[(2, 10.2)]),
            list(2, &[(3, 9.9)]),
        ];
        let (chains, used) = build(&lists, 1.0);
        assert_eq!(chains.len(), 1);
        assert_eq!(
            slots(&chains[0]),
            vec![Slot::Matched(0), Slot::Matched(0), Slot::Matched(0)]
        );
        assert!(used.is_marked(0, 1) && used.is_marked(1, 2) && used.is_marked(2, 3));
    }

    #[test]
    fn test_chain_skips_sample_with_missing_peak() {
        // middle sample saw nothing; anchor must not advance past it
        let lists = vec![list(0, &[(1, 10.0)]), list(1, &[]), list(2, &[(3, 9.9)])];
        let (chains, _) = build(&lists, 1.0);
        assert_eq!(chains.len(), 1);
        assert_eq!(
            slots(&chains[0]),
            vec![Slot::Matched(0), Slot::NoMatch, Slot::Matched(0)]
        );
    }

    #[test]
    fn test_inconsistent_candidate_is_rejected() {
        // c (id 5) is b's best hit, but c's own best hit in sample 0 is d,
        // not the already committed a: the extension must be vetoed.
        let lists = vec![
            list(0, &[(1, 10.0), (2, 10.8)]), // a, d
            list(1, &[(3, 10.2)]),            // b
            list(2, &[(5, 10.5), (6, 10.9)]), // c, e
        ];
        let (chains, _) = build(&lists, 1.0);
        assert_eq!(chains.len(), 3);
        // seed a: picks up b, then refuses c
        assert_eq!(
            slots(&chains[0]),
            vec![Slot::Matched(0), Slot::Matched(0), Slot::NoMatch]
        );
        // seed d: b already used, pairs with e instead
        assert_eq!(
            slots(&chains[1]),
            vec![Slot::Matched(1), Slot::NoMatch, Slot::Matched(1)]
        );
        // c is left over and emits its own singleton
        assert_eq!(
            slots(&chains[2]),
            vec![Slot::NoMatch, Slot::NoMatch, Slot::Matched(0)]
        );
    }

    #[test]
    fn test_used_peak_is_not_reassigned() {
        // both seeds would take c in the last sample; only the first one
        // (outer-loop order) gets it, with no fallback to the second best e
        let lists = vec![
            list(0, &[(1, 10.0)]),           // a
            list(1, &[(2, 11.5)]),           // f, too far from a
            list(2, &[(3, 10.7), (4, 12.4)]), // c within window of both, e only of f
        ];
        let (chains, used) = build(&lists, 1.0);
        assert_eq!(chains.len(), 3);
        assert_eq!(
            slots(&chains[0]),
            vec![Slot::Matched(0), Slot::NoMatch, Slot::Matched(0)]
        );
        // f's best hit c is taken; e (0.9 away, in window) is NOT considered
        assert_eq!(
            slots(&chains[1]),
            vec![Slot::NoMatch, Slot::Matched(0), Slot::NoMatch]
        );
        assert_eq!(
            slots(&chains[2]),
            vec![Slot::NoMatch, Slot::NoMatch, Slot::Matched(1)]
        );
        assert!(used.is_marked(2, 3));
        assert!(!used.is_marked(2, 4));
    }

    #[test]
    fn test_single_sample_emits_singletons() {
        let lists = vec![list(0, &[(1, 1.0), (2, 2.0), (3, 3.0)])];
        let (chains, _) = build(&lists, 1.0);
        assert_eq!(chains.len(), 3);
        for (i, c) in chains.iter().enumerate() {
            assert_eq!(slots(c), vec![Slot::Matched(i)]);
        }
    }

    #[test]
    fn test_no_samples() {
        let (chains, _) = build(&[], 1.0);
        assert!(chains.is_empty());
    }

    #[test]
    fn test_failed_seed_emits_matched_seed_slot() {
        // nothing within the window anywhere: one chain per seed, seed slot
        // still recorded as matched
        let lists = vec![list(0, &[(1, 10.0)]), list(1, &[(2, 50.0)])];
        let (chains, used) = build(&lists, 1.0);
        assert_eq!(chains.len(), 2);
        assert_eq!(slots(&chains[0]), vec![Slot::Matched(0), Slot::NoMatch]);
        assert_eq!(slots(&chains[1]), vec![Slot::NoMatch, Slot::Matched(0)]);
        // a seed that never commits is never marked used
        assert_eq!(used.marked_count(0), 0);
        assert_eq!(used.marked_count(1), 0);
    }

    #[test]
    fn test_anchor_advances_on_commit() {
        // after committing b the anchor is b, whose best hit in the last
        // sample is c; had the anchor stayed on a, it would have picked g
        let lists = vec![
            list(0, &[(1, 10.0)]),            // a
            list(1, &[(2, 10.6)]),            // b
            list(2, &[(3, 9.9), (4, 11.1)]),  // g (a's nearest), c (b's nearest)
        ];
        let (chains, _) = build(&lists, 1.5);
        assert_eq!(chains.len(), 2);
        assert_eq!(
            slots(&chains[0]),
            vec![Slot::Matched(0), Slot::Matched(0), Slot::Matched(1)]
        );
        assert_eq!(
            slots(&chains[1]),
            vec![Slot::NoMatch, Slot::NoMatch, Slot::Matched(0)]
        );
    }

    #[test]
    fn test_disjointness_over_all_chains() {
        let lists = vec![
            list(0, &[(1, 1.0), (2, 5.0), (3, 9.0)]),
            list(1, &[(4, 1.1), (5, 5.2)]),
            list(2, &[(6, 0.9), (7, 5.1), (8, 9.4)]),
        ];
        let (chains, _) = build(&lists, 1.0);
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for c in &chains {
            for (sample, idx) in c.matched() {
                assert!(seen.insert((sample, idx)), "peak assigned twice");
            }
        }
        // every peak appears exactly once across all chains
        let total: usize = lists.iter().map(|l| l.len()).sum();
        assert_eq!(seen.len(), total);
    }

    #[test]
    fn test_mark_is_insert_once() {
        let mut used = UsedMarks::new(2);
        assert!(used.mark(0, 42));
        assert!(!used.mark(0, 42));
        assert!(used.is_marked(0, 42));
        assert!(!used.is_marked(1, 42));
    }
}
