use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::align::matching::{find_best_match, MatchParams};
use crate::align::peak::{Peak, PeakId, PeakList};
use crate::align::similarity::Similarity;

/// Running summary over the members' primary retention coordinate.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CliqueStats {
    pub n: usize,
    pub mean: f64,
    pub variance: f64,
}

/// Plain data of one correspondence group: members, running statistics and
/// the medoid centroid. Mutated only through `Clique` and the updater
/// strategy stored next to it.
#[derive(Clone, Debug)]
pub struct CliqueState {
    id: u64,
    members: Vec<Peak>,
    member_ids: HashSet<PeakId>,
    pub stats: CliqueStats,
    centroid: Option<usize>, // index into members
}

impl CliqueState {
    fn new(id: u64) -> Self {
        Self {
            id,
            members: Vec::new(),
            member_ids: HashSet::new(),
            stats: CliqueStats::default(),
            centroid: None,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Members in insertion order.
    #[inline]
    pub fn members(&self) -> &[Peak] {
        &self.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: PeakId) -> bool {
        self.member_ids.contains(&id)
    }

    #[inline]
    pub fn centroid(&self) -> Option<&Peak> {
        self.centroid.map(|i| &self.members[i])
    }

    /// Designate the centroid by member index; used by updater strategies.
    pub fn set_centroid_index(&mut self, index: Option<usize>) {
        debug_assert!(index.map_or(true, |i| i < self.members.len()));
        self.centroid = index;
    }

    fn push_member(&mut self, peak: Peak) {
        self.member_ids.insert(peak.id);
        self.members.push(peak);
    }
}

/// Admission gate evaluated before a peak joins a clique.
pub trait MembershipCriterion: Send + Sync {
    fn accept(&self, clique: &CliqueState, peak: &Peak) -> bool;
}

/// Folds an admitted peak into the running statistics and recomputes the
/// centroid after each successful add.
pub trait CliqueUpdater: Send + Sync {
    fn update(&self, clique: &mut CliqueState, peak: &Peak);
    fn set_centroid(&self, clique: &mut CliqueState);
}

/// One finalized correspondence group with pluggable admission and update
/// policies. Exclusively owned by its constructing call; not meant for
/// concurrent `add`.
pub struct Clique {
    state: CliqueState,
    criterion: Arc<dyn MembershipCriterion>,
    updater: Arc<dyn CliqueUpdater>,
}

impl std::fmt::Debug for Clique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clique").field("state", &self.state).finish_non_exhaustive()
    }
}

impl Clique {
    pub fn new(
        id: u64,
        criterion: Arc<dyn MembershipCriterion>,
        updater: Arc<dyn CliqueUpdater>,
    ) -> Self {
        Self {
            state: CliqueState::new(id),
            criterion,
            updater,
        }
    }

    /// Permissive clique: accepts every non-duplicate member, keeps rt
    /// statistics and a feature-space medoid.
    pub fn with_defaults(id: u64) -> Self {
        Self::new(id, Arc::new(AcceptAll), Arc::new(RtStatsUpdater))
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.state.id
    }

    #[inline]
    pub fn state(&self) -> &CliqueState {
        &self.state
    }

    #[inline]
    pub fn stats(&self) -> &CliqueStats {
        &self.state.stats
    }

    #[inline]
    pub fn centroid(&self) -> Option<&Peak> {
        self.state.centroid()
    }

    /// Try to admit a peak. A duplicate id or a criterion veto leaves the
    /// clique untouched and returns false; otherwise statistics are updated,
    /// the peak is inserted and the centroid recomputed.
    pub fn add(&mut self, peak: &Peak) -> bool {
        if self.state.contains(peak.id) {
            return false;
        }
        if !self.criterion.accept(&self.state, peak) {
            return false;
        }
        self.updater.update(&mut self.state, peak);
        self.state.push_member(peak.clone());
        self.updater.set_centroid(&mut self.state);
        true
    }

    /// Members ordered by originating sample (ids break ties), deterministic
    /// across calls.
    pub fn members(&self) -> Vec<&Peak> {
        self.members_by(|a, b| a.sample.cmp(&b.sample).then(a.id.cmp(&b.id)))
    }

    /// Members ordered by a caller-supplied comparator.
    pub fn members_by<F>(&self, cmp: F) -> Vec<&Peak>
    where
        F: FnMut(&Peak, &Peak) -> Ordering,
    {
        let mut cmp = cmp;
        let mut out: Vec<&Peak> = self.state.members.iter().collect();
        out.sort_by(|a, b| cmp(a, b));
        out
    }

    /// Reset membership, statistics and centroid to empty.
    pub fn clear(&mut self) {
        let id = self.state.id;
        self.state = CliqueState::new(id);
    }
}

/// Admits everything that is not a duplicate.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl MembershipCriterion for AcceptAll {
    fn accept(&self, _clique: &CliqueState, _peak: &Peak) -> bool {
        true
    }
}

/// Incremental mean/variance over the primary retention coordinate plus a
/// brute-force feature-space medoid.
///
/// The variance recurrence divides by (n - 2), not the textbook (n - 1);
/// kept as-is so exported statistics stay comparable with earlier releases.
#[derive(Clone, Copy, Debug, Default)]
pub struct RtStatsUpdater;

impl CliqueUpdater for RtStatsUpdater {
    fn update(&self, clique: &mut CliqueState, peak: &Peak) {
        let n = clique.len() + 1;
        let x = peak.rt;
        let delta = x - clique.stats.mean;
        clique.stats.mean += delta / n as f64;
        if n > 2 {
            clique.stats.variance =
                (clique.stats.variance + delta * (x - clique.stats.mean)) / (n - 2) as f64;
        }
        clique.stats.n = n;
    }

    fn set_centroid(&self, clique: &mut CliqueState) {
        let members = clique.members();
        if members.is_empty() {
            clique.set_centroid_index(None);
            return;
        }
        // O(k²) total squared feature distance; k is bounded by the sample
        // count, so this stays cheap
        let medoid = members
            .iter()
            .map(|p| {
                members
                    .iter()
                    .map(|q| squared_feature_distance(p, q))
                    .sum::<f64>()
            })
            .position_min_by_key(|&cost| OrderedFloat(cost));
        clique.set_centroid_index(medoid);
    }
}

#[inline]
fn squared_feature_distance(a: &Peak, b: &Peak) -> f64 {
    a.feature
        .iter()
        .zip(b.feature.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

/// Admits a candidate only if it is a mutual best hit against every current
/// member, under the same similarity and window used for chain building.
/// An empty clique accepts any candidate. This re-applies the chain
/// builder's transitivity discipline as a standalone gate, so cliques can
/// also be grown incrementally outside the builder.
pub struct MutualBestHitCriterion {
    lists: Arc<Vec<PeakList>>,
    sim: Arc<dyn Similarity>,
    params: MatchParams,
    location: HashMap<PeakId, (usize, usize)>, // id -> (sample, index in list)
}

impl MutualBestHitCriterion {
    pub fn new(lists: Arc<Vec<PeakList>>, sim: Arc<dyn Similarity>, params: MatchParams) -> Self {
        let mut location = HashMap::new();
        for (sample, list) in lists.iter().enumerate() {
            for (index, p) in list.peaks.iter().enumerate() {
                location.insert(p.id, (sample, index));
            }
        }
        Self {
            lists,
            sim,
            params,
            location,
        }
    }
}

impl MembershipCriterion for MutualBestHitCriterion {
    fn accept(&self, clique: &CliqueState, peak: &Peak) -> bool {
        if clique.is_empty() {
            return true;
        }
        let Some(&(p_sample, p_idx)) = self.location.get(&peak.id) else {
            // unknown peaks cannot be verified against the run's lists
            return false;
        };

        for member in clique.members() {
            let Some(&(m_sample, m_idx)) = self.location.get(&member.id) else {
                return false;
            };
            if m_sample == p_sample {
                // a clique holds at most one peak per sample
                return false;
            }
            let forward = find_best_match(
                peak,
                &self.lists[m_sample],
                self.sim.as_ref(),
                &self.params,
            );
            if forward.map(|(j, _)| j) != Some(m_idx) {
                return false;
            }
            let reverse = find_best_match(
                member,
                &self.lists[p_sample],
                self.sim.as_ref(),
                &self.params,
            );
            if reverse.map(|(j, _)| j) != Some(p_idx) {
                return false;
            }
        }
        true
    }
}
