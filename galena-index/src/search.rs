//! Beam search within one layer.
//!
//! The search keeps three ordered structures: the frontier (best `ef`
//! vertices found so far), the unvisited frontier (frontier minus expanded
//! vertices), and an exact visited list. A fixed-capacity hash filter
//! short-circuits most repeat discoveries; the exact visited list absorbs
//! the rest. Everything is ordered by `(distance, id)`, which makes results
//! independent of seed order and reproducible across runs.

use crate::graph::{NodeId, threshold_m};
use crate::index::HnswIndex;
use crate::{IndexError, Result};
use galena_core::Descriptor;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Prefix-cut slack applied when the merged frontier grows past the beam
/// width; entries beyond `FRONTIER_CUT` times the beam-th distance are
/// dropped, but never below the previous frontier size.
const FRONTIER_CUT: f32 = 1.35;

/// A vertex paired with its distance to the query.
///
/// Ordered by `(distance ascending, id ascending)` with NaN compared as
/// positive infinity. The id tie-break is what keeps searches deterministic.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    /// Internal vertex id.
    pub id: NodeId,
    /// Distance to the query.
    pub dist: f32,
}

/// Total order on distances with NaN sorted after every finite value.
#[inline]
pub(crate) fn cmp_dist(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_dist(self.dist, other.dist).then_with(|| self.id.cmp(&other.id))
    }
}

/// Per-query knobs recognized by the search routines.
#[derive(Debug, Clone, Copy)]
pub struct SearchControl<'a> {
    /// Cap on vertices consumed from the unvisited frontier during the
    /// layer-0 search. Exceeding the cap returns the best frontier found so
    /// far without an error. `Some(0)` is an invalid argument.
    pub limit_eval: Option<usize>,

    /// Early-termination slack: a layer search stops once the nearest
    /// unvisited candidate is farther than `beta` times the worst frontier
    /// entry. The default of 1.0 never triggers.
    pub beta: f32,

    /// Start the query at this vertex instead of the entrance set, skipping
    /// the upper-layer descent.
    pub entry_point: Option<NodeId>,

    /// Incremented by the number of distance computations performed.
    pub count_cmps: Option<&'a AtomicU64>,
}

impl Default for SearchControl<'_> {
    fn default() -> Self {
        Self {
            limit_eval: None,
            beta: 1.0,
            entry_point: None,
            count_cmps: None,
        }
    }
}

const EMPTY_SLOT: NodeId = NodeId::MAX;

/// Fixed-capacity, open-addressed single-slot membership filter.
///
/// A colliding insert evicts the previous occupant, so an evicted vertex can
/// be rediscovered and expanded again later; the exact visited list
/// downstream absorbs those duplicates. The filter never claims membership
/// for an id it does not currently store.
struct SeenFilter {
    slots: Vec<NodeId>,
    mask: u64,
}

impl SeenFilter {
    fn for_beam(beam: usize) -> Self {
        let squared = (beam as f64) * (beam as f64);
        let bits = (squared.log2().ceil() as i64 - 2).max(10) as u32;
        let size = 1usize << bits;
        Self {
            slots: vec![EMPTY_SLOT; size],
            mask: size as u64 - 1,
        }
    }

    /// Returns true when `id` is already recorded; records it otherwise.
    #[inline]
    fn check_and_mark(&mut self, id: NodeId) -> bool {
        let slot = (hash64(u64::from(id)) & self.mask) as usize;
        if self.slots[slot] == id {
            return true;
        }
        self.slots[slot] = id;
        false
    }
}

/// 64-bit mix used to spread node ids across filter slots.
#[inline]
fn hash64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    x
}

/// Sorted set union of two `(dist, id)`-ordered slices; entries equal under
/// the total order are taken once.
fn merge_union(a: &[Neighbor], b: &[Neighbor], out: &mut Vec<Neighbor>) {
    out.clear();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
}

/// Sorted set difference `a \ b`.
fn set_difference(a: &[Neighbor], b: &[Neighbor], out: &mut Vec<Neighbor>) {
    out.clear();
    let mut j = 0;
    for &x in a {
        while j < b.len() && b[j] < x {
            j += 1;
        }
        if j < b.len() && b[j] == x {
            continue;
        }
        out.push(x);
    }
}

/// Shrink `size` to the largest prefix of `frontier` whose distances stay
/// within `cut` times the distance at index `prefix_k`, never below
/// `prior_len` (the frontier size before the merge).
fn apply_distance_cut(
    frontier: &[Neighbor],
    size: usize,
    prefix_k: usize,
    cut: f32,
    prior_len: usize,
) -> usize {
    if prefix_k == 0 || cut <= 1.0 || size <= prefix_k {
        return size;
    }
    let bound = cut * frontier[prefix_k].dist;
    let prefix = frontier[..size].partition_point(|c| cmp_dist(c.dist, bound) == Ordering::Less);
    prefix.max(prior_len)
}

impl<D: Descriptor> HnswIndex<D> {
    /// Beam search within `layer`, starting from `seeds`.
    ///
    /// Returns at most `ef` vertices ordered by `(distance, id)`. Seeds must
    /// be vertices whose level is at least `layer`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on an empty seed set, `ef == 0`, or
    /// `limit_eval == Some(0)`.
    pub fn search_layer(
        &self,
        query: &D::Point,
        seeds: &[NodeId],
        ef: usize,
        layer: u32,
        ctrl: &SearchControl<'_>,
    ) -> Result<Vec<Neighbor>> {
        if seeds.is_empty() {
            return Err(IndexError::InvalidArgument(
                "layer search requires at least one seed".into(),
            ));
        }
        if ef == 0 {
            return Err(IndexError::InvalidArgument("ef must be positive".into()));
        }
        if ctrl.limit_eval == Some(0) {
            return Err(IndexError::InvalidArgument(
                "limit_eval must be positive".into(),
            ));
        }

        let beam = ef;
        let limit = ctrl.limit_eval.unwrap_or(self.graph.len());
        let degree_limit = threshold_m(self.params.m, layer) as usize;
        let mut cmps: u64 = 0;

        let mut seen = SeenFilter::for_beam(beam);
        let mut frontier: Vec<Neighbor> = Vec::with_capacity(beam + 1);
        for &s in seeds {
            if seen.check_and_mark(s) {
                continue;
            }
            let d = D::distance(query, &self.graph.node(s).point, self.params.dim);
            cmps += 1;
            frontier.push(Neighbor { id: s, dist: d });
        }
        frontier.sort_unstable();

        let mut unvisited = frontier.clone();
        let mut visited: Vec<Neighbor> = Vec::with_capacity(2 * beam);
        let mut candidates: Vec<Neighbor> = Vec::with_capacity(degree_limit + beam);
        let mut merged: Vec<Neighbor> = Vec::with_capacity(2 * beam + degree_limit);
        let mut scratch: Vec<Neighbor> = Vec::with_capacity(beam);

        let mut evaluated = 0usize;
        let mut offset = 0usize;

        while offset < unvisited.len() && evaluated < limit {
            let current = unvisited[offset];
            if let Some(worst) = frontier.last() {
                if cmp_dist(current.dist, ctrl.beta * worst.dist) == Ordering::Greater {
                    break;
                }
            }

            let pos = visited.partition_point(|c| c < &current);
            visited.insert(pos, current);
            evaluated += 1;

            // Expand, keeping only candidates that beat the frontier cutoff.
            let cutoff = if frontier.len() == beam {
                frontier[beam - 1].dist
            } else {
                f32::INFINITY
            };
            {
                let nbrs = self.graph.node(current.id).read_neighbors(layer);
                for &v in nbrs.iter().take(degree_limit) {
                    if seen.check_and_mark(v) {
                        continue;
                    }
                    let d = D::distance(query, &self.graph.node(v).point, self.params.dim);
                    cmps += 1;
                    if cmp_dist(d, cutoff) != Ordering::Less {
                        continue;
                    }
                    candidates.push(Neighbor { id: v, dist: d });
                }
            }

            // Low-yield vertices are consumed without a merge; their
            // surviving candidates accumulate into the next merge.
            if candidates.is_empty()
                || (limit >= 2 * beam
                    && candidates.len() < beam / 8
                    && offset + 1 < unvisited.len())
            {
                offset += 1;
                continue;
            }
            offset = 0;

            candidates.sort_unstable();
            candidates.dedup_by(|a, b| a.id == b.id);

            merge_union(&frontier, &candidates, &mut merged);
            candidates.clear();

            let mut new_size = merged.len().min(beam);
            new_size = apply_distance_cut(&merged, new_size, beam, FRONTIER_CUT, frontier.len());

            frontier.clear();
            frontier.extend_from_slice(&merged[..new_size]);

            set_difference(&frontier, &visited, &mut scratch);
            std::mem::swap(&mut unvisited, &mut scratch);
        }

        self.stats.visited.add(cmps);
        self.stats.evaluated.add(evaluated as u64);
        self.stats.frontier.add(frontier.len() as u64);
        if let Some(counter) = ctrl.count_cmps {
            counter.fetch_add(cmps, AtomicOrdering::Relaxed);
        }

        Ok(frontier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: NodeId, dist: f32) -> Neighbor {
        Neighbor { id, dist }
    }

    #[test]
    fn test_cmp_dist_orders_nan_last() {
        assert_eq!(cmp_dist(1.0, 2.0), Ordering::Less);
        assert_eq!(cmp_dist(2.0, 1.0), Ordering::Greater);
        assert_eq!(cmp_dist(f32::NAN, 1.0), Ordering::Greater);
        assert_eq!(cmp_dist(1.0, f32::NAN), Ordering::Less);
        assert_eq!(cmp_dist(f32::NAN, f32::NAN), Ordering::Equal);
        assert_eq!(cmp_dist(f32::INFINITY, f32::NAN), Ordering::Less);
    }

    #[test]
    fn test_neighbor_order_breaks_ties_by_id() {
        let mut v = vec![n(5, 1.0), n(2, 1.0), n(9, 0.5)];
        v.sort_unstable();
        assert_eq!(v.iter().map(|c| c.id).collect::<Vec<_>>(), vec![9, 2, 5]);
    }

    #[test]
    fn test_merge_union_dedups_equal_entries() {
        let a = vec![n(1, 0.1), n(2, 0.2), n(4, 0.4)];
        let b = vec![n(2, 0.2), n(3, 0.3), n(5, 0.5)];
        let mut out = Vec::new();
        merge_union(&a, &b, &mut out);
        assert_eq!(out.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_set_difference_drops_visited() {
        let a = vec![n(1, 0.1), n(2, 0.2), n(3, 0.3)];
        let b = vec![n(2, 0.2)];
        let mut out = Vec::new();
        set_difference(&a, &b, &mut out);
        assert_eq!(out.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_distance_cut_keeps_near_prefix() {
        let frontier = vec![n(0, 1.0), n(1, 1.1), n(2, 1.2), n(3, 10.0), n(4, 20.0)];
        // Bound is 1.35 * frontier[2].dist = 1.62, so the far tail is cut.
        let size = apply_distance_cut(&frontier, 5, 2, 1.35, 1);
        assert_eq!(size, 3);
    }

    #[test]
    fn test_distance_cut_never_shrinks_below_prior() {
        let frontier = vec![n(0, 1.0), n(1, 9.0), n(2, 9.5), n(3, 10.0)];
        let size = apply_distance_cut(&frontier, 4, 1, 1.01, 3);
        assert_eq!(size, 3);
    }

    #[test]
    fn test_distance_cut_disabled() {
        let frontier = vec![n(0, 1.0), n(1, 100.0)];
        assert_eq!(apply_distance_cut(&frontier, 2, 0, 1.35, 0), 2);
        assert_eq!(apply_distance_cut(&frontier, 2, 1, 1.0, 0), 2);
    }

    #[test]
    fn test_seen_filter_marks_and_evicts() {
        let mut filter = SeenFilter::for_beam(4);
        assert!(!filter.check_and_mark(7));
        assert!(filter.check_and_mark(7));

        // Force an eviction by finding an id that shares slot with 7.
        let mask = filter.mask;
        let slot7 = hash64(7) & mask;
        let collider = (8u32..100_000)
            .find(|&x| hash64(u64::from(x)) & mask == slot7)
            .unwrap();
        assert!(!filter.check_and_mark(collider));
        // 7 was evicted: the filter forgets it rather than lying about it.
        assert!(!filter.check_and_mark(7));
    }

    #[test]
    fn test_seen_filter_minimum_size() {
        let filter = SeenFilter::for_beam(1);
        assert_eq!(filter.slots.len(), 1 << 10);
        let filter = SeenFilter::for_beam(128);
        // ceil(log2(128^2)) - 2 = 12
        assert_eq!(filter.slots.len(), 1 << 12);
    }
}
