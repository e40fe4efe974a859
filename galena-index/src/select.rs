//! Diversified neighbor selection.

use crate::graph::{GraphStore, NodeId};
use crate::search::{Neighbor, cmp_dist};
use galena_core::Descriptor;
use std::cmp::Ordering;

/// Select up to `max_neighbors` diversified neighbors from `candidates`.
///
/// Candidates are walked in `(distance, id)` order. A candidate `c` is
/// admitted only when every already-admitted neighbor `r` satisfies
/// `d(c, r) >= alpha * d(q, c)`; otherwise `r` already covers `c`'s
/// direction and `c` is pruned. `alpha = 1` reproduces the classic
/// nearest-M heuristic; larger values keep longer-range, better-spread
/// edges.
///
/// With `keep_pruned`, rejected candidates are appended best-first until the
/// target size is reached.
pub(crate) fn select_diverse<D: Descriptor>(
    graph: &GraphStore<D::Point>,
    mut candidates: Vec<Neighbor>,
    max_neighbors: usize,
    alpha: f32,
    dim: u32,
    keep_pruned: bool,
) -> Vec<NodeId> {
    candidates.sort_unstable();

    let mut selected: Vec<Neighbor> = Vec::with_capacity(max_neighbors.min(candidates.len()));
    let mut rejected: Vec<Neighbor> = Vec::new();

    for &c in &candidates {
        let covered_bound = c.dist * alpha;
        let covered = selected.iter().any(|r| {
            let d = D::distance(&graph.node(c.id).point, &graph.node(r.id).point, dim);
            cmp_dist(d, covered_bound) == Ordering::Less
        });

        if covered {
            rejected.push(c);
        } else {
            selected.push(c);
            if selected.len() == max_neighbors {
                break;
            }
        }
    }

    if keep_pruned {
        for r in rejected {
            if selected.len() == max_neighbors {
                break;
            }
            selected.push(r);
        }
    }

    selected.into_iter().map(|c| c.id).collect()
}
