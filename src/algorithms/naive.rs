//! Global scalar RBF interpolation, the baseline for the manifold scheme.
//!
//! The function is summarised through [`Manifold::to_number`] and a single
//! kernel system over all samples is solved, ignoring the geometry.

use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use tracing::debug;

use crate::algorithms::kernel::Kernel;
use crate::core::error::{Error, Result};
use crate::core::traits::Manifold;
use crate::sampling::grid::GridParameters;

/// Scalar interpolant `s(q) = Σ_j c_j Φ(q, x_j)`
#[derive(Debug, Clone)]
pub struct NaiveInterpolant {
    kernel: Kernel,
    centers: Vec<(f64, f64)>,
    coefficients: DVector<f64>,
}

impl NaiveInterpolant {
    /// Fit scalar values at the given centers
    pub fn fit(kernel: Kernel, centers: Vec<(f64, f64)>, values: &[f64]) -> Result<Self> {
        if centers.len() != values.len() {
            return Err(Error::DimensionMismatch {
                expected: centers.len(),
                got: values.len(),
            });
        }
        if centers.is_empty() {
            return Err(Error::InvalidParameter("no interpolation centers".to_string()));
        }

        let n = centers.len();
        let gram = DMatrix::from_fn(n, n, |j, k| kernel.between(centers[j], centers[k]));
        let cholesky = gram.cholesky().ok_or_else(|| Error::DegenerateSystem {
            x: centers[0].0,
            y: centers[0].1,
            reason: "global kernel matrix is not positive definite".to_string(),
        })?;
        let coefficients = cholesky.solve(&DVector::from_vec(values.to_vec()));
        debug!(centers = n, "fitted naive interpolant");

        Ok(NaiveInterpolant {
            kernel,
            centers,
            coefficients,
        })
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.centers
            .iter()
            .zip(self.coefficients.iter())
            .map(|(&center, c)| c * self.kernel.between((x, y), center))
            .sum()
    }

    pub fn evaluate_on_grid(&self, params: &GridParameters) -> Result<Array2<f64>> {
        params.validate()?;
        let xs = params.xs();
        let ys = params.ys();
        Ok(Array2::from_shape_fn((ys.len(), xs.len()), |(i, j)| {
            self.evaluate(xs[j], ys[i])
        }))
    }
}

/// Interpolate the scalar summary of a manifold-valued function on `samples`
pub fn naive_interpolation<M: Manifold>(
    manifold: &M,
    function: &dyn Fn(f64, f64) -> M::Point,
    kernel: Kernel,
    samples: &GridParameters,
) -> Result<NaiveInterpolant> {
    samples.validate()?;
    let xs = samples.xs();
    let ys = samples.ys();

    let mut centers = Vec::with_capacity(xs.len() * ys.len());
    let mut values = Vec::with_capacity(xs.len() * ys.len());
    for &y in ys.iter() {
        for &x in xs.iter() {
            centers.push((x, y));
            values.push(manifold.to_number(&function(x, y)));
        }
    }
    NaiveInterpolant::fit(kernel, centers, &values)
}
