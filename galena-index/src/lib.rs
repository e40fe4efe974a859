//! Galena index engine: in-memory approximate nearest-neighbor search over a
//! hierarchical navigable small-world (HNSW) graph.
//!
//! The index is a stack of directed graphs over a shared vertex pool. Every
//! vertex lives in layer 0; a vertex assigned level `l` also appears in
//! layers `1..=l`. Higher layers act as sparse long-range shortcuts, layer 0
//! carries the dense neighborhood structure. Queries descend from the top
//! layer with a beam of one, then run a wide beam search at layer 0.
//!
//! # Features
//!
//! - **Parallel batched construction**: the corpus is inserted in
//!   geometrically growing batches; within a batch, searching, neighbor
//!   selection, and edge installation run on a work-stealing thread pool.
//! - **Diversified neighbor selection**: forward edges are chosen with a
//!   relative-neighborhood pruning rule controlled by `alpha`.
//! - **Opaque points**: the engine sees points only through a
//!   [`Descriptor`](galena_core::Descriptor), chosen at compile time.
//! - **Persistence**: the graph saves to and loads from a compact binary
//!   file; the point store stays outside the index and is re-attached on
//!   load through a caller-supplied getter.
//!
//! # Example
//!
//! ```no_run
//! use galena_core::{DensePoint, Euclidean};
//! use galena_index::{HnswIndex, HnswParams, SearchControl};
//!
//! # fn main() -> galena_index::Result<()> {
//! let points: Vec<DensePoint> = (0..1000)
//!     .map(|i| DensePoint::new(i, vec![i as f32, (i * 7 % 13) as f32]))
//!     .collect();
//!
//! let params = HnswParams::new(2, 1.2);
//! let index = HnswIndex::<Euclidean>::build(params, &points)?;
//!
//! let query = DensePoint::new(0, vec![3.0, 4.0]);
//! let hits = index.search(&query, 10, 50, &SearchControl::default())?;
//! # Ok(())
//! # }
//! ```

mod graph;
mod index;
mod insert;
mod level;
mod parallel;
mod params;
mod persist;
mod search;
mod select;

pub use graph::NodeId;
pub use index::{HnswIndex, SearchResult};
pub use parallel::{SearchStats, WorkerCounter};
pub use params::HnswParams;
pub use search::{Neighbor, SearchControl};

/// Errors surfaced by index construction, queries, and persistence.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
