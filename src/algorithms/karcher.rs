use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::core::error::{Error, Result};
use crate::core::traits::Manifold;

/// Stopping criteria of the Karcher mean iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KarcherConfig {
    /// Maximum number of fixed-point updates
    pub max_iterations: usize,
    /// Convergence when the tangent-space update norm drops below this
    pub tolerance: f64,
}

impl Default for KarcherConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tolerance: 1e-8,
        }
    }
}

impl KarcherConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "Karcher tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Outcome of a Karcher mean computation
#[derive(Debug, Clone)]
pub struct MeanEstimate<P> {
    /// Best estimate of the mean
    pub point: P,
    /// Number of fixed-point updates evaluated
    pub iterations: usize,
    /// Whether the update norm fell below the tolerance
    pub converged: bool,
    /// Update norm of every iteration, in order
    pub residuals: Vec<f64>,
}

/// Weighted Fréchet mean by fixed-point iteration in the tangent space
///
/// Starting from the first sample, each iteration computes
/// `r = Σ w_i log(m, x_i) / Σ w_i` at the current estimate `m` and moves to
/// `exp(m, r)`, until `|r|` drops below the tolerance or the iteration cap is
/// hit. Hitting the cap is reported through [`MeanEstimate::converged`],
/// never as an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct KarcherMean {
    pub config: KarcherConfig,
}

impl KarcherMean {
    pub fn new(config: KarcherConfig) -> Self {
        KarcherMean { config }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    pub fn solve<M: Manifold>(
        &self,
        manifold: &M,
        values: &[M::Point],
        weights: &[f64],
    ) -> Result<MeanEstimate<M::Point>> {
        let total = check_average_inputs(values.len(), weights)?;
        for value in values {
            manifold.validate_point(value)?;
        }

        let mut estimator = values[0].clone();
        let mut residuals = Vec::with_capacity(self.config.max_iterations);

        for iteration in 0..self.config.max_iterations {
            let update = self.tangent_update(manifold, &estimator, values, weights, total)?;
            let residual = manifold.norm(&estimator, &update);
            residuals.push(residual);
            trace!(iteration, residual, "karcher step");

            if residual < self.config.tolerance {
                return Ok(MeanEstimate {
                    point: estimator,
                    iterations: iteration + 1,
                    converged: true,
                    residuals,
                });
            }

            estimator = manifold.exp_unchecked(&estimator, &update);
        }

        warn!(
            manifold = manifold.name(),
            iterations = self.config.max_iterations,
            last_residual = residuals.last().copied().unwrap_or(f64::NAN),
            "Karcher mean did not converge"
        );

        Ok(MeanEstimate {
            point: estimator,
            iterations: self.config.max_iterations,
            converged: false,
            residuals,
        })
    }

    /// Weighted average of the logarithms at `estimator`
    fn tangent_update<M: Manifold>(
        &self,
        manifold: &M,
        estimator: &M::Point,
        values: &[M::Point],
        weights: &[f64],
        total: f64,
    ) -> Result<M::Vector> {
        let mut sum = DVector::zeros(manifold.dim());
        for (value, &weight) in values.iter().zip(weights) {
            if weight == 0.0 {
                continue;
            }
            let v = manifold.log_unchecked(estimator, value)?;
            sum += manifold.to_coords(estimator, &v) * weight;
        }
        manifold.from_coords(estimator, &(sum / total))
    }
}

/// Check the preconditions of a weighted average and return the weight sum
pub fn check_average_inputs(len: usize, weights: &[f64]) -> Result<f64> {
    if len == 0 {
        return Err(Error::InvalidParameter(
            "cannot average an empty set of values".to_string(),
        ));
    }
    if weights.len() != len {
        return Err(Error::DimensionMismatch {
            expected: len,
            got: weights.len(),
        });
    }
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "weights must have a positive finite sum, got {}",
            total
        )));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifolds::{Rotations, Spd};
    use approx::assert_relative_eq;
    use ndarray::{arr2, Array2};

    #[test]
    fn test_single_value_is_its_own_mean() {
        let spd = Spd::new(2);
        let p = arr2(&[[2.0, 0.3], [0.3, 1.0]]);

        let estimate = KarcherMean::default().solve(&spd, &[p.clone()], &[0.7]).unwrap();
        assert!(estimate.converged);
        assert_eq!(estimate.iterations, 1);
        assert_eq!(estimate.point, p);
    }

    #[test]
    fn test_commuting_spd_mean_is_geometric() {
        let spd = Spd::new(2);
        let a = Array2::from_diag(&ndarray::arr1(&[1.0, 4.0]));
        let b = Array2::from_diag(&ndarray::arr1(&[4.0, 1.0]));

        let estimate = KarcherMean::default()
            .with_max_iterations(50)
            .solve(&spd, &[a, b], &[1.0, 1.0])
            .unwrap();

        assert!(estimate.converged);
        assert_relative_eq!(estimate.point[[0, 0]], 2.0, epsilon = 1e-8);
        assert_relative_eq!(estimate.point[[1, 1]], 2.0, epsilon = 1e-8);
        assert_relative_eq!(estimate.point[[0, 1]], 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let rotations = Rotations::new();
        let about_z = arr2(&[[0.0, 0.5, 0.0], [-0.5, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        let about_x = arr2(&[[0.0, 0.0, 0.0], [0.0, 0.0, 0.6], [0.0, -0.6, 0.0]]);
        let a = rotations.exp_unchecked(&Array2::eye(3), &about_z);
        let b = rotations.exp_unchecked(&Array2::eye(3), &about_x);

        let estimate = KarcherMean::default()
            .with_max_iterations(1)
            .with_tolerance(1e-14)
            .solve(&rotations, &[a, b], &[1.0, 1.0])
            .unwrap();

        assert!(!estimate.converged);
        assert_eq!(estimate.iterations, 1);
        assert_eq!(estimate.residuals.len(), 1);
        assert!(rotations.is_in_manifold(&estimate.point));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let spd = Spd::new(2);
        let p: Array2<f64> = Array2::eye(2);
        let solver = KarcherMean::default();

        assert!(solver.solve(&spd, &[], &[]).is_err());
        assert!(solver.solve(&spd, &[p.clone()], &[1.0, 2.0]).is_err());
        assert!(solver.solve(&spd, &[p.clone()], &[0.0]).is_err());
        assert!(solver.solve(&spd, &[p.clone(), p], &[1.0, -1.0]).is_err());
    }

    #[test]
    fn test_invalid_point_rejected() {
        let spd = Spd::new(2);
        let not_spd = arr2(&[[1.0, 2.0], [2.0, 1.0]]);
        let err = KarcherMean::default().solve(&spd, &[not_spd], &[1.0]).unwrap_err();
        assert!(matches!(err, Error::NotOnManifold(_)));
    }
}
