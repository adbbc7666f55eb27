//! Evaluation of the manifold-valued RBF interpolant.
//!
//! At a query `q` the neighbours `x_j` are averaged with weights `Φ(q, x_j)`
//! to get a base point `m(q)`, and the interpolant is
//! `exp(m(q), Σ_j Φ(q, x_j) λ_j)` with `λ_j` the stored tangent coordinates.

use ndarray::Array2;
use nalgebra::DVector;
use tracing::{debug, warn};

use crate::algorithms::karcher::{KarcherConfig, KarcherMean};
use crate::core::error::{Error, Result};
use crate::core::traits::Manifold;
use crate::sampling::grid::GridParameters;
use crate::sampling::SampleIndex;

/// Interpolant of a manifold-valued function sampled on an index
#[derive(Debug, Clone)]
pub struct Interpolator<M, S> {
    manifold: M,
    index: S,
    karcher: KarcherConfig,
}

impl<M, S> Interpolator<M, S>
where
    M: Manifold,
    S: SampleIndex<M::Point>,
{
    pub fn new(manifold: M, index: S) -> Self {
        Interpolator {
            manifold,
            index,
            karcher: KarcherConfig::default(),
        }
    }

    /// Settings of the Karcher mean giving the base point of a query
    pub fn with_karcher(mut self, karcher: KarcherConfig) -> Self {
        self.karcher = karcher;
        self
    }

    pub fn manifold(&self) -> &M {
        &self.manifold
    }

    pub fn index(&self) -> &S {
        &self.index
    }

    /// Value of the interpolant at `(x, y)`
    ///
    /// The index must carry solved weights, as produced by `build`.
    pub fn evaluate(&self, x: f64, y: f64) -> Result<M::Point> {
        if !self.index.has_weights() {
            return Err(Error::InvalidParameter(
                "sample index has no RBF weights, build it with a weight solver".to_string(),
            ));
        }
        let neighbors: Vec<_> = self.index.points_in_radius(x, y).collect();
        if neighbors.is_empty() {
            return Err(Error::EmptyNeighborhood { x, y });
        }

        let values: Vec<M::Point> = neighbors.iter().map(|n| n.point.evaluation.clone()).collect();
        let weights: Vec<f64> = neighbors.iter().map(|n| n.kernel_value).collect();
        let mean = KarcherMean::new(self.karcher).solve(&self.manifold, &values, &weights)?;
        if !mean.converged {
            debug!(x, y, "interpolating from an unconverged base point");
        }

        let mut coords = DVector::zeros(self.manifold.dim());
        for neighbor in &neighbors {
            if neighbor.point.lambda.len() != coords.len() {
                return Err(Error::DimensionMismatch {
                    expected: coords.len(),
                    got: neighbor.point.lambda.len(),
                });
            }
            coords += &neighbor.point.lambda * neighbor.kernel_value;
        }
        let tangent = self.manifold.from_coords(&mean.point, &coords)?;
        Ok(self.manifold.exp_unchecked(&mean.point, &tangent))
    }

    /// Interpolant on the nodes of a grid, as an `ny x nx` array
    pub fn evaluate_on_grid(&self, params: &GridParameters) -> Result<Array2<M::Point>> {
        params.validate()?;
        let xs = params.xs();
        let ys = params.ys();

        let mut values = Vec::with_capacity(xs.len() * ys.len());
        for &y in ys.iter() {
            for &x in xs.iter() {
                values.push(self.evaluate(x, y)?);
            }
        }
        Array2::from_shape_vec((ys.len(), xs.len()), values)
            .map_err(|e| Error::InvalidParameter(format!("grid shape: {}", e)))
    }

    /// Geodesic distance to the true function on the nodes of a grid
    pub fn error_on_grid(
        &self,
        params: &GridParameters,
        truth: &dyn Fn(f64, f64) -> M::Point,
    ) -> Result<Array2<f64>> {
        params.validate()?;
        let xs = params.xs();
        let ys = params.ys();

        let mut errors = Array2::zeros((ys.len(), xs.len()));
        for (i, &y) in ys.iter().enumerate() {
            for (j, &x) in xs.iter().enumerate() {
                let approximation = self.evaluate(x, y)?;
                errors[[i, j]] = self.manifold.distance(&truth(x, y), &approximation)?;
            }
        }

        let worst = errors.iter().fold(0.0_f64, |acc, &e| acc.max(e));
        if !worst.is_finite() {
            warn!(manifold = self.manifold.name(), "non-finite interpolation error");
        }
        debug!(manifold = self.manifold.name(), max_error = worst, "computed error map");
        Ok(errors)
    }
}

/// Largest geodesic difference quotient of `function` at every node of a grid
///
/// Each node is compared with the values at distance `fill_distance / 2` in the
/// eight compass directions, giving `max_u d(f(p), f(p + δu)) / δ` as an
/// `ny x nx` array. Evaluation errors are measured against this scale.
pub fn max_derivative<M: Manifold>(
    manifold: &M,
    function: &dyn Fn(f64, f64) -> M::Point,
    params: &GridParameters,
) -> Result<Array2<f64>> {
    params.validate()?;
    let delta = params.fill_distance / 2.0;
    let diagonal = delta / 2f64.sqrt();
    let offsets = [
        (delta, 0.0),
        (-delta, 0.0),
        (0.0, delta),
        (0.0, -delta),
        (diagonal, diagonal),
        (diagonal, -diagonal),
        (-diagonal, diagonal),
        (-diagonal, -diagonal),
    ];
    let xs = params.xs();
    let ys = params.ys();

    let mut derivatives = Array2::zeros((ys.len(), xs.len()));
    for (i, &y) in ys.iter().enumerate() {
        for (j, &x) in xs.iter().enumerate() {
            let center = function(x, y);
            let mut steepest = 0.0_f64;
            for &(dx, dy) in &offsets {
                let slope = manifold.distance(&function(x + dx, y + dy), &center)? / delta;
                steepest = steepest.max(slope);
            }
            derivatives[[i, j]] = steepest;
        }
    }
    Ok(derivatives)
}
