use nalgebra::DVector;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::algorithms::karcher::check_average_inputs;
use crate::core::{Error, Manifold, Result};

fn scalar_coords(coords: &DVector<f64>) -> Result<f64> {
    if coords.len() != 1 {
        return Err(Error::DimensionMismatch {
            expected: 1,
            got: coords.len(),
        });
    }
    Ok(coords[0])
}

/// The real line with the standard metric
#[derive(Debug, Clone, Copy, Default)]
pub struct Reals;

impl Reals {
    pub fn new() -> Self {
        Reals
    }
}

impl Manifold for Reals {
    type Point = f64;
    type Vector = f64;

    fn name(&self) -> &'static str {
        "numbers"
    }

    fn dim(&self) -> usize {
        1
    }

    /// Exponential map: simple addition
    fn exp_unchecked(&self, p: &f64, x: &f64) -> f64 {
        p + x
    }

    /// Logarithmic map: simple subtraction
    fn log_unchecked(&self, p: &f64, q: &f64) -> Result<f64> {
        Ok(q - p)
    }

    fn norm(&self, _p: &f64, x: &f64) -> f64 {
        x.abs()
    }

    fn distance(&self, p: &f64, q: &f64) -> Result<f64> {
        self.validate_point(p)?;
        self.validate_point(q)?;
        Ok((q - p).abs())
    }

    fn to_coords(&self, _p: &f64, x: &f64) -> DVector<f64> {
        DVector::from_element(1, *x)
    }

    fn from_coords(&self, _p: &f64, coords: &DVector<f64>) -> Result<f64> {
        scalar_coords(coords)
    }

    /// Closed-form weighted mean
    fn average(&self, values: &[f64], weights: &[f64]) -> Result<f64> {
        let total = check_average_inputs(values.len(), weights)?;
        for value in values {
            self.validate_point(value)?;
        }
        let sum: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
        Ok(sum / total)
    }

    fn zero_func(&self, _x0: f64, _x1: f64) -> f64 {
        0.0
    }

    fn is_in_manifold(&self, p: &f64) -> bool {
        p.is_finite()
    }

    fn gen_point<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        StandardNormal.sample(rng)
    }

    fn to_number(&self, p: &f64) -> f64 {
        *p
    }
}

/// Positive reals R+ with the scale-invariant metric g_x(u, v) = uv / x^2
///
/// This is SPD(1): exp_x(v) = x e^{v/x}, log_x(y) = x ln(y/x),
/// d(x, y) = |ln y - ln x|, and the Fréchet mean is the weighted geometric mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositiveReals;

impl PositiveReals {
    pub fn new() -> Self {
        PositiveReals
    }
}

impl Manifold for PositiveReals {
    type Point = f64;
    type Vector = f64;

    fn name(&self) -> &'static str {
        "positive_numbers"
    }

    fn dim(&self) -> usize {
        1
    }

    fn exp_unchecked(&self, p: &f64, x: &f64) -> f64 {
        p * (x / p).exp()
    }

    fn log_unchecked(&self, p: &f64, q: &f64) -> Result<f64> {
        Ok(p * (q / p).ln())
    }

    fn norm(&self, p: &f64, x: &f64) -> f64 {
        (x / p).abs()
    }

    fn distance(&self, p: &f64, q: &f64) -> Result<f64> {
        self.validate_point(p)?;
        self.validate_point(q)?;
        Ok((q.ln() - p.ln()).abs())
    }

    /// Whitened coordinate v / p, shared by every tangent space
    fn to_coords(&self, p: &f64, x: &f64) -> DVector<f64> {
        DVector::from_element(1, x / p)
    }

    fn from_coords(&self, p: &f64, coords: &DVector<f64>) -> Result<f64> {
        Ok(scalar_coords(coords)? * p)
    }

    /// Weighted geometric mean
    fn average(&self, values: &[f64], weights: &[f64]) -> Result<f64> {
        let total = check_average_inputs(values.len(), weights)?;
        for value in values {
            self.validate_point(value)?;
        }
        let log_sum: f64 = values.iter().zip(weights).map(|(v, w)| v.ln() * w).sum();
        Ok((log_sum / total).exp())
    }

    fn zero_func(&self, _x0: f64, _x1: f64) -> f64 {
        1.0
    }

    fn is_in_manifold(&self, p: &f64) -> bool {
        p.is_finite() && *p > 0.0
    }

    /// Log-normal draw
    fn gen_point<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = StandardNormal.sample(rng);
        z.exp()
    }

    fn to_number(&self, p: &f64) -> f64 {
        *p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_reals_exp_log() {
        let reals = Reals::new();
        let q = reals.exp(&1.5, &-0.25).unwrap();
        assert_relative_eq!(q, 1.25);
        assert_relative_eq!(reals.log(&1.5, &q).unwrap(), -0.25);
    }

    #[test]
    fn test_reals_average_is_weighted_mean() {
        let reals = Reals::new();
        let mean = reals.average(&[1.0, 2.0, 4.0], &[1.0, 1.0, 2.0]).unwrap();
        assert_relative_eq!(mean, 11.0 / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reals_average_rejects_zero_weights() {
        let reals = Reals::new();
        assert!(reals.average(&[1.0, 2.0], &[0.0, 0.0]).is_err());
        assert!(reals.average(&[], &[]).is_err());
    }

    #[test]
    fn test_reals_validation() {
        let reals = Reals::new();
        assert!(reals.validate_point(&3.0).is_ok());
        assert!(reals.validate_point(&f64::NAN).is_err());
        assert!(reals.log(&0.0, &f64::INFINITY).is_err());
    }

    #[test]
    fn test_positive_reals_exp_log_inverse() {
        let positive = PositiveReals::new();
        let p = 2.0;
        let q = 5.0;

        let v = positive.log(&p, &q).unwrap();
        assert_relative_eq!(positive.exp(&p, &v).unwrap(), q, epsilon = 1e-12);
        assert_relative_eq!(positive.distance(&p, &q).unwrap(), (2.5_f64).ln(), epsilon = 1e-12);
        assert_relative_eq!(positive.norm(&p, &v), (2.5_f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_positive_reals_average_is_geometric() {
        let positive = PositiveReals::new();
        let mean = positive.average(&[1.0, 4.0], &[3.0, 3.0]).unwrap();
        assert_relative_eq!(mean, 2.0, epsilon = 1e-12);

        // The iterative solver lands on the same point
        let karcher = crate::algorithms::KarcherMean::default()
            .solve(&positive, &[1.0, 4.0], &[3.0, 3.0])
            .unwrap();
        assert_relative_eq!(karcher.point, 2.0, epsilon = 1e-8);
    }

    #[test]
    fn test_positive_reals_rejects_non_positive() {
        let positive = PositiveReals::new();
        assert!(positive.validate_point(&0.0).is_err());
        assert!(positive.log(&1.0, &-2.0).is_err());
    }

    #[test]
    fn test_generated_points_are_valid() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            assert!(Reals.is_in_manifold(&Reals.gen_point(&mut rng)));
            assert!(PositiveReals.is_in_manifold(&PositiveReals.gen_point(&mut rng)));
        }
    }
}
