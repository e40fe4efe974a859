//! Construction parameters.

use crate::{IndexError, Result};
use serde::{Deserialize, Serialize};

/// Parameters fixed once construction begins.
///
/// `alpha` has no default on purpose: published values around 1.2-1.5 work
/// well for metric data, `1.0` reproduces classic nearest-M selection, and
/// larger values trade degree for long-range connectivity. Pick one
/// deliberately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HnswParams {
    /// Number of coordinates handed to the distance evaluator.
    pub dim: u32,

    /// Target out-degree in layers >= 1; layer 0 allows `2 * m`.
    /// Typical values: 8-48.
    pub m: u32,

    /// Scale of the geometric level distribution. A node's level is drawn as
    /// `floor(-ln(u) * m_l)`, so larger values build taller graphs.
    pub m_l: f32,

    /// Beam width for construction-time neighbor searches.
    /// Higher values build a better graph, more slowly.
    pub ef_construction: u32,

    /// Diversification coefficient of neighbor selection. A candidate is
    /// rejected when an already-selected neighbor sits closer to it than
    /// `alpha` times its distance to the inserted point.
    pub alpha: f32,

    /// Growth ratio of progressive construction batches.
    pub batch_base: f32,
}

impl HnswParams {
    /// Create parameters with the given dimensionality and `alpha`, using
    /// the default `m = 16`, `m_l = 16`, `ef_construction = 50`,
    /// `batch_base = 2`.
    pub fn new(dim: u32, alpha: f32) -> Self {
        Self {
            dim,
            m: 16,
            m_l: 16.0,
            ef_construction: 50,
            alpha,
            batch_base: 2.0,
        }
    }

    /// Set the target out-degree.
    pub fn with_m(mut self, m: u32) -> Self {
        self.m = m;
        self
    }

    /// Set the level-distribution scale.
    pub fn with_m_l(mut self, m_l: f32) -> Self {
        self.m_l = m_l;
        self
    }

    /// Set the construction beam width.
    pub fn with_ef_construction(mut self, ef_construction: u32) -> Self {
        self.ef_construction = ef_construction;
        self
    }

    /// Set the progressive batch growth ratio.
    pub fn with_batch_base(mut self, batch_base: f32) -> Self {
        self.batch_base = batch_base;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(IndexError::InvalidArgument(
                "dimension must be positive".into(),
            ));
        }
        if self.m == 0 {
            return Err(IndexError::InvalidArgument("m must be positive".into()));
        }
        if self.ef_construction == 0 {
            return Err(IndexError::InvalidArgument(
                "ef_construction must be positive".into(),
            ));
        }
        if !(self.m_l > 0.0) {
            return Err(IndexError::InvalidArgument(
                "m_l must be positive".into(),
            ));
        }
        if !(self.alpha >= 1.0) {
            return Err(IndexError::InvalidArgument(
                "alpha must be at least 1.0".into(),
            ));
        }
        if !(self.batch_base > 1.0) {
            return Err(IndexError::InvalidArgument(
                "batch_base must be greater than 1.0".into(),
            ));
        }
        Ok(())
    }
}
