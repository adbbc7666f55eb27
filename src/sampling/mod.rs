//! Spatial structures holding the sampled function values.

pub mod cache;
pub mod collection;
pub mod grid;

use nalgebra::DVector;

use crate::algorithms::kernel::Kernel;
use crate::core::error::Result;

pub use cache::{fingerprint, CacheKey, FileCache, MemoryCache, WeightCache};
pub use collection::{
    builtin_samplers, SamplingConstructor, SamplingContext, SamplingPointsCollection,
    SamplingRegistry,
};
pub use grid::{Grid, GridParameters, IndexLayout};

/// Location in the plane, the manifold value sampled there and its RBF weights
#[derive(Debug, Clone)]
pub struct SamplePoint<P> {
    pub x: f64,
    pub y: f64,
    pub evaluation: P,
    /// Tangent coordinates of the node's RBF coefficient
    pub lambda: DVector<f64>,
}

impl<P> SamplePoint<P> {
    pub fn location(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// Sample point found by a radius query, with the kernel value at the query
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a, P> {
    pub point: &'a SamplePoint<P>,
    pub kernel_value: f64,
}

/// Anything answering kernel-support queries over sample points
pub trait SampleIndex<P> {
    /// Sample points whose kernel value at `(x, y)` is non-zero
    fn points_in_radius<'a>(
        &'a self,
        x: f64,
        y: f64,
    ) -> Box<dyn Iterator<Item = Neighbor<'a, P>> + 'a>
    where
        P: 'a;

    /// Kernel defining the support of a query
    fn kernel(&self) -> &Kernel;

    /// Number of sample points
    fn len(&self) -> usize;

    /// Locations of all sample points, in a fixed order
    fn locations(&self) -> Vec<(f64, f64)>;

    /// Store RBF weights, one per entry of [`SampleIndex::locations`]
    fn assign_weights(&mut self, weights: &[DVector<f64>]) -> Result<()>;

    /// Whether every sample point carries solved weights
    fn has_weights(&self) -> bool;

    /// Fingerprint separating the cached weights of different structures
    fn cache_scope(&self) -> u64 {
        0
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
