//! Several sampling structures queried as one.

use nalgebra::DVector;
use tracing::info;

use crate::algorithms::kernel::Kernel;
use crate::algorithms::weights::WeightSolver;
use crate::core::config::GridSpec;
use crate::core::error::{Error, Result};
use crate::core::registry::Registry;
use crate::core::traits::Manifold;
use crate::sampling::cache::fingerprint;
use crate::sampling::grid::{Grid, GridParameters, IndexLayout};
use crate::sampling::{Neighbor, SampleIndex};

/// Everything a sampling structure needs to be built
pub struct SamplingContext<'a, M: Manifold> {
    pub manifold: &'a M,
    pub kernel: Kernel,
    pub layout: IndexLayout,
    /// Function being interpolated
    pub function: &'a dyn Fn(f64, f64) -> M::Point,
}

impl<'a, M: Manifold> SamplingContext<'a, M> {
    pub fn new(
        manifold: &'a M,
        kernel: Kernel,
        function: &'a dyn Fn(f64, f64) -> M::Point,
    ) -> Self {
        SamplingContext {
            manifold,
            kernel,
            layout: IndexLayout::default(),
            function,
        }
    }

    pub fn with_layout(mut self, layout: IndexLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Builds a sampling structure holding function values but no weights yet
pub type SamplingConstructor<M> = fn(
    GridParameters,
    &SamplingContext<'_, M>,
) -> Result<Box<dyn SampleIndex<<M as Manifold>::Point>>>;

pub type SamplingRegistry<M> = Registry<SamplingConstructor<M>>;

fn grid_sampler<M>(
    params: GridParameters,
    ctx: &SamplingContext<'_, M>,
) -> Result<Box<dyn SampleIndex<M::Point>>>
where
    M: Manifold,
    M::Point: 'static,
{
    Ok(Box::new(Grid::sample(params, ctx)?))
}

/// Registry holding the regular "Grid" class
pub fn builtin_samplers<M>() -> SamplingRegistry<M>
where
    M: Manifold,
    M::Point: 'static,
{
    let mut registry = Registry::new("sampling class");
    registry.register("Grid", grid_sampler::<M> as SamplingConstructor<M>);
    registry
}

/// Union of sampling structures sharing one kernel
///
/// A radius query returns the neighbours found in every member structure, and
/// the weights are solved over the union.
pub struct SamplingPointsCollection<P> {
    kernel: Kernel,
    members: Vec<Box<dyn SampleIndex<P>>>,
}

impl<P: 'static> SamplingPointsCollection<P> {
    pub fn new(kernel: Kernel) -> Self {
        SamplingPointsCollection {
            kernel,
            members: Vec::new(),
        }
    }

    /// Build one structure per [`GridSpec`], then solve the weights of the union
    pub fn build<M>(
        registry: &SamplingRegistry<M>,
        specs: &[GridSpec],
        ctx: &SamplingContext<'_, M>,
        solver: &mut WeightSolver,
    ) -> Result<Self>
    where
        M: Manifold<Point = P>,
    {
        if specs.is_empty() {
            return Err(Error::InvalidParameter(
                "a sampling collection needs at least one structure".to_string(),
            ));
        }

        let mut collection = Self::new(ctx.kernel);
        for spec in specs {
            let constructor = registry.resolve(&spec.class)?;
            collection.push(constructor(spec.parameters, ctx)?)?;
        }
        let weights = solver.solve(ctx.manifold, &collection, &collection.locations())?;
        collection.assign_weights(&weights)?;

        info!(
            structures = collection.members.len(),
            points = collection.len(),
            "built sampling collection"
        );
        Ok(collection)
    }

    /// Add a structure; its kernel must match the collection's
    pub fn push(&mut self, member: Box<dyn SampleIndex<P>>) -> Result<()> {
        if member.kernel() != &self.kernel {
            return Err(Error::InvalidParameter(format!(
                "sampling structure kernel {:?} differs from collection kernel {:?}",
                member.kernel(),
                self.kernel
            )));
        }
        self.members.push(member);
        Ok(())
    }

    pub fn members(&self) -> &[Box<dyn SampleIndex<P>>] {
        &self.members
    }
}

impl<P> SampleIndex<P> for SamplingPointsCollection<P> {
    fn points_in_radius<'a>(
        &'a self,
        x: f64,
        y: f64,
    ) -> Box<dyn Iterator<Item = Neighbor<'a, P>> + 'a>
    where
        P: 'a,
    {
        Box::new(
            self.members
                .iter()
                .flat_map(move |member| member.points_in_radius(x, y)),
        )
    }

    fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    fn len(&self) -> usize {
        self.members.iter().map(|member| member.len()).sum()
    }

    fn locations(&self) -> Vec<(f64, f64)> {
        self.members.iter().flat_map(|member| member.locations()).collect()
    }

    fn assign_weights(&mut self, weights: &[DVector<f64>]) -> Result<()> {
        if weights.len() != self.len() {
            return Err(Error::DimensionMismatch {
                expected: self.len(),
                got: weights.len(),
            });
        }
        let mut offset = 0;
        for member in &mut self.members {
            let count = member.len();
            member.assign_weights(&weights[offset..offset + count])?;
            offset += count;
        }
        Ok(())
    }

    fn has_weights(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|member| member.has_weights())
    }

    fn cache_scope(&self) -> u64 {
        fingerprint(self.members.iter().map(|member| member.cache_scope()))
    }
}
