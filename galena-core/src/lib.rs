//! Point abstractions shared across the Galena workspace.
//!
//! The index engine never looks inside a point. It works through a
//! [`Descriptor`]: a capability set giving it a distance function and an
//! external identifier for an otherwise opaque point type. This crate defines
//! that trait, a dense `f32` point type, and descriptors for the three
//! metrics the shipped kernels cover:
//!
//! - [`Euclidean`] - L2 distance
//! - [`Cosine`] - 1 minus cosine similarity
//! - [`DotProduct`] - 1 minus inner product (intended for normalized vectors)
//!
//! Custom point layouts (quantized codes, memory-mapped rows, ...) plug in by
//! implementing [`Descriptor`] for their own point type.

pub mod distance;

use serde::{Deserialize, Serialize};

/// Capability set the index requires from a point type.
///
/// The descriptor is a compile-time parameter of the index, so distance
/// dispatch is static in the hot path. Implementations must be cheap
/// zero-sized tags; all state lives in the points themselves.
pub trait Descriptor: Send + Sync + 'static {
    /// Opaque point handle stored in the index.
    type Point: Clone + Send + Sync;

    /// Distance between two points over the first `dim` coordinates.
    ///
    /// Must be non-negative for metric use. Callers order NaN results as
    /// positive infinity. Points shorter than `dim` are a caller contract
    /// violation and may panic.
    fn distance(a: &Self::Point, b: &Self::Point, dim: u32) -> f32;

    /// External (user-facing) identifier of a point.
    fn id(p: &Self::Point) -> u32;
}

/// A dense `f32` vector paired with its external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensePoint {
    /// External identifier reported in search results.
    pub id: u32,
    /// Vector coordinates.
    pub coords: Vec<f32>,
}

impl DensePoint {
    /// Create a new point.
    pub fn new(id: u32, coords: Vec<f32>) -> Self {
        Self { id, coords }
    }

    /// Number of coordinates.
    pub fn dim(&self) -> usize {
        self.coords.len()
    }
}

/// Euclidean (L2) descriptor over [`DensePoint`].
#[derive(Debug, Clone, Copy)]
pub struct Euclidean;

impl Descriptor for Euclidean {
    type Point = DensePoint;

    #[inline]
    fn distance(a: &DensePoint, b: &DensePoint, dim: u32) -> f32 {
        let d = dim as usize;
        distance::euclidean_distance(&a.coords[..d], &b.coords[..d])
    }

    #[inline]
    fn id(p: &DensePoint) -> u32 {
        p.id
    }
}

/// Cosine-distance descriptor over [`DensePoint`]: `1 - cosine_similarity`.
#[derive(Debug, Clone, Copy)]
pub struct Cosine;

impl Descriptor for Cosine {
    type Point = DensePoint;

    #[inline]
    fn distance(a: &DensePoint, b: &DensePoint, dim: u32) -> f32 {
        let d = dim as usize;
        1.0 - distance::cosine_similarity(&a.coords[..d], &b.coords[..d])
    }

    #[inline]
    fn id(p: &DensePoint) -> u32 {
        p.id
    }
}

/// Inner-product descriptor over [`DensePoint`]: `1 - dot(a, b)`.
///
/// Only a meaningful proximity order for normalized vectors; kept for parity
/// with the cosine path when inputs are pre-normalized.
#[derive(Debug, Clone, Copy)]
pub struct DotProduct;

impl Descriptor for DotProduct {
    type Point = DensePoint;

    #[inline]
    fn distance(a: &DensePoint, b: &DensePoint, dim: u32) -> f32 {
        let d = dim as usize;
        1.0 - distance::dot_product(&a.coords[..d], &b.coords[..d])
    }

    #[inline]
    fn id(p: &DensePoint) -> u32 {
        p.id
    }
}
