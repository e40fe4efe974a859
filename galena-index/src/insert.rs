//! Batched insertion.
//!
//! A batch is installed level by level from the top of the graph down, with
//! a barrier between phases: every new node searches its neighborhood and
//! selects forward edges over a stable snapshot of the layer, the forward
//! lists are written, and finally the pending reverse edges are grouped by
//! target so each existing list is mutated by exactly one worker. Searches
//! at a layer therefore observe all installs at the layers above it.

use crate::Result;
use crate::graph::{Node, NodeId, threshold_m};
use crate::index::HnswIndex;
use crate::level::sample_level;
use crate::search::{Neighbor, SearchControl};
use crate::select::select_diverse;
use galena_core::Descriptor;
use rayon::prelude::*;
use std::collections::BTreeMap;

impl<D: Descriptor> HnswIndex<D> {
    /// Insert `points` as one batch.
    ///
    /// An empty index is bootstrapped from the first point, which becomes
    /// the sole entrance. Determinism across runs holds modulo the worker
    /// schedule: level draws come from per-worker seeded generators, and
    /// reverse-edge truncation depends on which batch mates share a target.
    pub fn insert(&mut self, points: &[D::Point]) -> Result<()> {
        let mut rest = points;
        if self.graph.is_empty() {
            let Some((first, tail)) = points.split_first() else {
                return Ok(());
            };
            let level = sample_level(self.params.m_l);
            let id = self.graph.push(Node::new(level, first.clone()));
            self.graph.set_entrance(vec![id]);
            rest = tail;
        }
        if rest.is_empty() {
            return Ok(());
        }
        self.insert_batch(rest)
    }

    fn insert_batch(&mut self, batch: &[D::Point]) -> Result<()> {
        let level_top = self.graph.height();
        let size_batch = batch.len();
        let ef = self.params.ef_construction as usize;
        let m_l = self.params.m_l;

        // Materialize the new nodes; the pool grows once, then every write
        // below targets disjoint, already-allocated slots.
        let offset = self.graph.len() as NodeId;
        let new_nodes: Vec<Node<D::Point>> = batch
            .par_iter()
            .map(|p| Node::new(sample_level(m_l), p.clone()))
            .collect();
        self.graph.extend(new_nodes);
        let node_new: Vec<NodeId> = (offset..offset + size_batch as NodeId).collect();

        tracing::debug!(
            batch = size_batch,
            pool = self.graph.len(),
            "batch nodes settled"
        );

        // Descend the upper layers to a per-node entry seed.
        let mut seeds: Vec<Vec<NodeId>> = node_new
            .par_iter()
            .map(|&pu| -> Result<Vec<NodeId>> {
                let level_u = self.graph.node(pu).level;
                let mut eps = self.graph.entrance().to_vec();
                let ctrl = SearchControl::default();
                for layer in (level_u + 1..=level_top).rev() {
                    let res =
                        self.search_layer(&self.graph.node(pu).point, &eps, ef, layer, &ctrl)?;
                    eps.clear();
                    eps.push(res[0].id);
                }
                Ok(eps)
            })
            .collect::<Result<Vec<_>>>()?;

        for layer in (0..=level_top).rev() {
            let cap = threshold_m(self.params.m, layer) as usize;

            // Phase A: search the layer and select diversified forward
            // neighbors; the full search result seeds the next layer down.
            let forward: Vec<Option<Vec<NodeId>>> = node_new
                .par_iter()
                .zip(seeds.par_iter_mut())
                .map(|(&pu, eps)| -> Result<Option<Vec<NodeId>>> {
                    let u = self.graph.node(pu);
                    if layer > u.level {
                        return Ok(None);
                    }
                    let res =
                        self.search_layer(&u.point, eps, ef, layer, &SearchControl::default())?;
                    let next_eps: Vec<NodeId> = res.iter().map(|c| c.id).collect();
                    let chosen = select_diverse::<D>(
                        &self.graph,
                        res,
                        cap,
                        self.params.alpha,
                        self.params.dim,
                        false,
                    );
                    *eps = next_eps;
                    Ok(Some(chosen))
                })
                .collect::<Result<Vec<_>>>()?;

            // Phase B: write forward lists, one writer per new node.
            node_new
                .par_iter()
                .zip(forward.par_iter())
                .for_each(|(&pu, fwd)| {
                    if let Some(list) = fwd {
                        *self.graph.node(pu).write_neighbors(layer) = list.clone();
                    }
                });

            // Phase C: group pending reverse edges by target so each
            // existing list has exactly one writer.
            let mut grouped: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
            for (i, fwd) in forward.into_iter().enumerate() {
                if let Some(list) = fwd {
                    for v in list {
                        grouped.entry(v).or_default().push(node_new[i]);
                    }
                }
            }
            let grouped: Vec<(NodeId, Vec<NodeId>)> = grouped.into_iter().collect();

            grouped.par_iter().for_each(|&(pv, ref incoming)| {
                let target = self.graph.node(pv);
                let mut nbh = target.write_neighbors(layer);
                if nbh.len() + incoming.len() <= cap {
                    nbh.extend_from_slice(incoming);
                } else {
                    // Over the cap the target keeps the plain nearest `cap`
                    // neighbors, not an alpha selection; diversifying here
                    // would need a second distance matrix per target.
                    let mut ranked: Vec<Neighbor> = nbh
                        .iter()
                        .chain(incoming.iter())
                        .map(|&w| Neighbor {
                            id: w,
                            dist: D::distance(
                                &self.graph.node(w).point,
                                &target.point,
                                self.params.dim,
                            ),
                        })
                        .collect();
                    ranked.sort_unstable();
                    ranked.truncate(cap);
                    nbh.clear();
                    nbh.extend(ranked.into_iter().map(|c| c.id));
                }
            });
        }

        // Entrance update, single-threaded; the first highest new node wins
        // ties.
        let mut highest = node_new[0];
        for &pu in &node_new[1..] {
            if self.graph.node(pu).level > self.graph.node(highest).level {
                highest = pu;
            }
        }
        let level_highest = self.graph.node(highest).level;
        if level_highest > level_top {
            tracing::debug!(node = highest, level = level_highest, "entrance replaced");
            self.graph.set_entrance(vec![highest]);
        } else if level_highest == level_top {
            self.graph.push_entrance(highest);
        }

        Ok(())
    }
}
