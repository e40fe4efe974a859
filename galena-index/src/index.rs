//! The index type and its query surface.

use crate::graph::{GraphStore, NodeId};
use crate::parallel::SearchStats;
use crate::params::HnswParams;
use crate::search::{Neighbor, SearchControl};
use crate::{IndexError, Result};
use galena_core::Descriptor;
use serde::{Deserialize, Serialize};

/// A single query hit: external id and distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// External identifier of the matched point.
    pub id: u32,
    /// Distance to the query under the index's descriptor.
    pub distance: f32,
}

impl SearchResult {
    pub fn new(id: u32, distance: f32) -> Self {
        Self { id, distance }
    }
}

/// An in-memory approximate nearest-neighbor index over points of descriptor
/// `D`.
///
/// Shared references support concurrent queries; insertion requires
/// exclusive access, so queries never observe a batch mid-flight.
pub struct HnswIndex<D: Descriptor> {
    pub(crate) params: HnswParams,
    pub(crate) graph: GraphStore<D::Point>,
    pub(crate) stats: SearchStats,
}

impl<D: Descriptor> HnswIndex<D> {
    /// Create an empty index.
    pub fn new(params: HnswParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            graph: GraphStore::new(),
            stats: SearchStats::new(),
        })
    }

    /// Build an index over `points`.
    ///
    /// The corpus is inserted in geometrically growing batches
    /// (`batch_base` ratio, capped at 2% of the corpus per batch) so the
    /// early graph is well connected before the large parallel batches run.
    pub fn build(params: HnswParams, points: &[D::Point]) -> Result<Self> {
        let mut index = Self::new(params)?;
        let n = points.len();
        if n == 0 {
            return Ok(index);
        }

        index.insert(&points[..1])?;
        let growth_cap = ((n as f64 * 0.02).ceil() as usize).max(1);
        let mut built = 1usize;
        let mut reported = 0.0f64;
        while built < n {
            let target = (built as f64 * f64::from(index.params.batch_base)).ceil() as usize + 1;
            let end = n.min(target).min(built + growth_cap);
            tracing::debug!(begin = built, end, "inserting batch");
            index.insert(&points[built..end])?;
            built = end;
            if built as f64 > n as f64 * (reported + 0.05) {
                reported = built as f64 / n as f64;
                tracing::info!(percent = (reported * 100.0) as u32, "build progress");
            }
        }
        tracing::info!(
            nodes = index.graph.len(),
            height = index.graph.height(),
            "index built"
        );
        Ok(index)
    }

    /// Top-k approximate search with beam width `ef`.
    ///
    /// Descends from the entrance with a beam of one, then runs the wide
    /// beam search at layer 0 and returns up to `k` hits ordered by
    /// `(distance, id)`. The evaluation cap in `ctrl` applies to the
    /// layer-0 search only.
    pub fn search(
        &self,
        query: &D::Point,
        k: usize,
        ef: usize,
        ctrl: &SearchControl<'_>,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be positive".into()));
        }
        if ef == 0 {
            return Err(IndexError::InvalidArgument("ef must be positive".into()));
        }
        if ctrl.limit_eval == Some(0) {
            return Err(IndexError::InvalidArgument(
                "limit_eval must be positive".into(),
            ));
        }
        if self.graph.is_empty() {
            return Err(IndexError::InvalidArgument(
                "search on an empty index".into(),
            ));
        }

        let seeds: Vec<NodeId> = if let Some(ep) = ctrl.entry_point {
            if ep as usize >= self.graph.len() {
                return Err(IndexError::InvalidArgument(format!(
                    "entry point {ep} out of range"
                )));
            }
            vec![ep]
        } else {
            let descent = SearchControl {
                count_cmps: ctrl.count_cmps,
                ..SearchControl::default()
            };
            let mut eps = self.graph.entrance().to_vec();
            for layer in (1..=self.graph.height()).rev() {
                let res = self.search_layer(query, &eps, 1, layer, &descent)?;
                eps.clear();
                eps.push(res[0].id);
            }
            eps
        };

        let mut frontier = self.search_layer(query, &seeds, ef, 0, ctrl)?;
        frontier.truncate(k);
        Ok(frontier
            .into_iter()
            .map(|c| SearchResult::new(D::id(&self.graph.node(c.id).point), c.dist))
            .collect())
    }

    /// Exhaustive top-k scan over the whole pool, for groundtruth and tests.
    pub fn search_exact(&self, query: &D::Point, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be positive".into()));
        }
        let mut all: Vec<Neighbor> = self
            .graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, node)| Neighbor {
                id: i as NodeId,
                dist: D::distance(query, &node.point, self.params.dim),
            })
            .collect();
        all.sort_unstable();
        all.truncate(k);
        Ok(all
            .into_iter()
            .map(|c| SearchResult::new(D::id(&self.graph.node(c.id).point), c.dist))
            .collect())
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Graph height: the level of the entrance set.
    pub fn height(&self) -> u32 {
        self.graph.height()
    }

    /// The entrance set. Empty only for an empty index.
    pub fn entry_points(&self) -> &[NodeId] {
        self.graph.entrance()
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Level of a vertex.
    pub fn node_level(&self, id: NodeId) -> Option<u32> {
        ((id as usize) < self.graph.len()).then(|| self.graph.node(id).level)
    }

    /// External id of a vertex.
    pub fn external_id(&self, id: NodeId) -> Option<u32> {
        ((id as usize) < self.graph.len()).then(|| D::id(&self.graph.node(id).point))
    }

    /// Point of a vertex.
    pub fn point(&self, id: NodeId) -> Option<&D::Point> {
        ((id as usize) < self.graph.len()).then(|| &self.graph.node(id).point)
    }

    /// Snapshot of the outgoing edges of `id` at `layer`, or `None` when the
    /// vertex does not reach that layer.
    pub fn neighbors(&self, id: NodeId, layer: u32) -> Option<Vec<NodeId>> {
        if id as usize >= self.graph.len() {
            return None;
        }
        let node = self.graph.node(id);
        (layer <= node.level).then(|| node.read_neighbors(layer).clone())
    }

    /// Number of vertices appearing at `layer`.
    pub fn vertex_count(&self, layer: u32) -> usize {
        self.graph.vertex_count(layer)
    }

    /// Sum of out-degrees at `layer`.
    pub fn degree_total(&self, layer: u32) -> usize {
        self.graph.degree_total(layer)
    }

    /// Largest out-degree at `layer`.
    pub fn degree_max(&self, layer: u32) -> usize {
        self.graph.degree_max(layer)
    }

    /// Accumulated per-worker search counters.
    pub fn search_stats(&self) -> &SearchStats {
        &self.stats
    }
}
