//! End-to-end interpolation problems built from an [`InterpolationConfig`].

use ndarray::Array2;
use serde::Serialize;
use tracing::info;

use crate::algorithms::interpolation::{max_derivative, Interpolator};
use crate::algorithms::weights::WeightSolver;
use crate::core::config::InterpolationConfig;
use crate::core::error::Result;
use crate::core::traits::Manifold;
use crate::functions::{rotation_functions, scalar_functions, spd_functions};
use crate::manifolds::{builtin_manifolds, AnyManifold};
use crate::sampling::cache::{FileCache, MemoryCache, WeightCache};
use crate::sampling::collection::{
    builtin_samplers, SamplingContext, SamplingPointsCollection, SamplingRegistry,
};
use crate::sampling::grid::GridParameters;

/// Sampled function, its weights and the interpolant over all configured grids
pub struct InterpolationProblem<M: Manifold> {
    interpolator: Interpolator<M, SamplingPointsCollection<M::Point>>,
    solver: WeightSolver,
}

impl<M> InterpolationProblem<M>
where
    M: Manifold,
    M::Point: 'static,
{
    /// Build with the built-in sampling classes
    pub fn build(
        config: &InterpolationConfig,
        manifold: M,
        function: &dyn Fn(f64, f64) -> M::Point,
    ) -> Result<Self> {
        Self::build_with(config, manifold, function, &builtin_samplers())
    }

    pub fn build_with(
        config: &InterpolationConfig,
        manifold: M,
        function: &dyn Fn(f64, f64) -> M::Point,
        samplers: &SamplingRegistry<M>,
    ) -> Result<Self> {
        config.validate()?;
        let kernel = config.kernel()?;
        let cache: Box<dyn WeightCache> = match &config.cache_path {
            Some(path) => Box::new(FileCache::open(path)?),
            None => Box::new(MemoryCache::new()),
        };
        let mut solver = WeightSolver::new(config.solver, cache);

        let collection = {
            let ctx = SamplingContext::new(&manifold, kernel, function).with_layout(config.layout);
            SamplingPointsCollection::build(samplers, &config.grids, &ctx, &mut solver)?
        };
        let interpolator =
            Interpolator::new(manifold, collection).with_karcher(config.solver.karcher);

        Ok(InterpolationProblem { interpolator, solver })
    }

    pub fn interpolator(&self) -> &Interpolator<M, SamplingPointsCollection<M::Point>> {
        &self.interpolator
    }

    pub fn solver(&self) -> &WeightSolver {
        &self.solver
    }

    pub fn evaluate(&self, x: f64, y: f64) -> Result<M::Point> {
        self.interpolator.evaluate(x, y)
    }

    /// Persist the weight cache and release the problem
    pub fn close(mut self) -> Result<()> {
        self.solver.close()
    }
}

/// Interpolation error of a configured problem on an evaluation grid
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub manifold: String,
    pub function: String,
    pub evaluation: GridParameters,
    /// Geodesic distance to the true value at every evaluation node
    pub errors: Array2<f64>,
    pub max_error: f64,
    pub mean_error: f64,
    /// Largest directional difference quotient of the true function per node
    pub derivatives: Array2<f64>,
    pub max_derivative: f64,
    /// `max_error / max_derivative`, absent for a locally constant function
    pub normalized_max_error: Option<f64>,
}

/// Resolve manifold and function by name, interpolate and measure the error
pub fn error_report(
    config: &InterpolationConfig,
    evaluation: &GridParameters,
) -> Result<ErrorReport> {
    config.validate()?;
    let manifold = (builtin_manifolds().resolve(&config.manifold)?)(&config.manifold_settings)?;
    let (errors, derivatives) = match manifold {
        AnyManifold::Numbers(m) => {
            measure(config, m, *scalar_functions().resolve(&config.function)?, evaluation)?
        }
        AnyManifold::PositiveNumbers(m) => {
            measure(config, m, *scalar_functions().resolve(&config.function)?, evaluation)?
        }
        AnyManifold::Rotations(m) => {
            measure(config, m, *rotation_functions().resolve(&config.function)?, evaluation)?
        }
        AnyManifold::Spd(m) => {
            measure(config, m, *spd_functions().resolve(&config.function)?, evaluation)?
        }
    };

    let max_error = errors.iter().fold(0.0_f64, |acc, &e| acc.max(e));
    let mean_error = errors.mean().unwrap_or(0.0);
    let max_derivative = derivatives.iter().fold(0.0_f64, |acc, &d| acc.max(d));
    let normalized_max_error = (max_derivative > 0.0).then(|| max_error / max_derivative);
    info!(
        manifold = %config.manifold,
        function = %config.function,
        max_error,
        mean_error,
        max_derivative,
        "interpolation error"
    );

    Ok(ErrorReport {
        manifold: config.manifold.clone(),
        function: config.function.clone(),
        evaluation: *evaluation,
        errors,
        max_error,
        mean_error,
        derivatives,
        max_derivative,
        normalized_max_error,
    })
}

fn measure<M>(
    config: &InterpolationConfig,
    manifold: M,
    function: fn(f64, f64) -> M::Point,
    evaluation: &GridParameters,
) -> Result<(Array2<f64>, Array2<f64>)>
where
    M: Manifold,
    M::Point: 'static,
{
    let problem = InterpolationProblem::build(config, manifold, &function)?;
    let errors = problem.interpolator().error_on_grid(evaluation, &function)?;
    let derivatives = max_derivative(problem.interpolator().manifold(), &function, evaluation)?;
    problem.close()?;
    Ok((errors, derivatives))
}
