use std::fmt::Debug;

use nalgebra::DVector;
use rand::Rng;

use crate::algorithms::karcher::KarcherMean;
use crate::core::error::{Error, Result};

/// Core trait for a Riemannian manifold carrying interpolated values
///
/// Points and tangent vectors keep their natural representation (a scalar or a
/// matrix). Tangent vectors can additionally be expressed in coordinates
/// (`to_coords` / `from_coords`), which is how weighted sums of tangent
/// vectors are formed by the mean solver and the RBF weight solver.
pub trait Manifold {
    /// Point on the manifold
    type Point: Clone + Debug;

    /// Tangent vector at a point
    type Vector: Clone + Debug;

    /// Name under which the manifold is registered
    fn name(&self) -> &'static str;

    /// Dimension of the tangent space, i.e. the number of tangent coordinates
    fn dim(&self) -> usize;

    /// Exponential map: TpM → M (unchecked, assumes valid input)
    fn exp_unchecked(&self, p: &Self::Point, x: &Self::Vector) -> Self::Point;

    /// Exponential map with validation
    fn exp(&self, p: &Self::Point, x: &Self::Vector) -> Result<Self::Point> {
        self.validate_point(p)?;
        self.validate_vector(p, x)?;
        Ok(self.exp_unchecked(p, x))
    }

    /// Logarithmic map: M → TpM (unchecked, assumes valid input)
    ///
    /// Still fallible: `q` may sit on the cut locus of `p`, where the
    /// principal logarithm is not defined.
    fn log_unchecked(&self, p: &Self::Point, q: &Self::Point) -> Result<Self::Vector>;

    /// Logarithmic map with validation
    fn log(&self, p: &Self::Point, q: &Self::Point) -> Result<Self::Vector> {
        self.validate_point(p)?;
        self.validate_point(q)?;
        self.log_unchecked(p, q)
    }

    /// Riemannian norm of a tangent vector at p
    fn norm(&self, p: &Self::Point, x: &Self::Vector) -> f64;

    /// Geodesic distance between two points
    fn distance(&self, p: &Self::Point, q: &Self::Point) -> Result<f64> {
        let x = self.log(p, q)?;
        Ok(self.norm(p, &x))
    }

    /// Coordinates of a tangent vector at p
    fn to_coords(&self, p: &Self::Point, x: &Self::Vector) -> DVector<f64>;

    /// Tangent vector at p from its coordinates
    fn from_coords(&self, p: &Self::Point, coords: &DVector<f64>) -> Result<Self::Vector>;

    /// Weighted Fréchet (Karcher) mean with the default solver settings
    ///
    /// Non-convergence is not an error here; the best estimate is returned.
    /// Use [`KarcherMean`] directly to inspect the convergence status.
    fn average(&self, values: &[Self::Point], weights: &[f64]) -> Result<Self::Point>
    where
        Self: Sized,
    {
        Ok(KarcherMean::default().solve(self, values, weights)?.point)
    }

    /// Canonical reference point, independent of the location
    fn zero_func(&self, x0: f64, x1: f64) -> Self::Point;

    /// Membership predicate
    fn is_in_manifold(&self, p: &Self::Point) -> bool;

    /// Validate that a point lies on the manifold
    fn validate_point(&self, p: &Self::Point) -> Result<()> {
        if self.is_in_manifold(p) {
            Ok(())
        } else {
            Err(Error::NotOnManifold(format!("{} rejects {:?}", self.name(), p)))
        }
    }

    /// Validate that a vector is in the tangent space at p
    ///
    /// Default implementation is optimistic (always returns Ok).
    fn validate_vector(&self, _p: &Self::Point, _x: &Self::Vector) -> Result<()> {
        Ok(())
    }

    /// Draw a random valid point
    fn gen_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Point
    where
        Self: Sized;

    /// Scalar summary of a point, used for reports and error maps
    fn to_number(&self, p: &Self::Point) -> f64;

    /// Point at parameter t on the geodesic from x (t = 0) to y (t = 1)
    fn geodesic(&self, x: &Self::Point, y: &Self::Point, t: f64) -> Result<Self::Point> {
        let v = self.log(x, y)?;
        let scaled = self.to_coords(x, &v) * t;
        let step = self.from_coords(x, &scaled)?;
        Ok(self.exp_unchecked(x, &step))
    }
}
