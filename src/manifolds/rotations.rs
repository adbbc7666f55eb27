use std::f64::consts::PI;

use nalgebra::{DVector, Matrix3, Quaternion, Rotation3, UnitQuaternion};
use ndarray::{arr2, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use crate::core::linalg::{determinant, frobenius_norm, skew_part, symmetrize, trace};
use crate::core::{Error, Manifold, ManifoldSettings, Result};

const ORTHOGONAL_TOLERANCE: f64 = 1e-3;
const SPECIAL_TOLERANCE: f64 = 1e-3;

/// Below this angle the Rodrigues coefficients switch to their Taylor expansions
const SMALL_ANGLE: f64 = 1e-6;

/// Skew-symmetric matrix with coordinates (v01, v02, v12)
fn skew(a: f64, b: f64, c: f64) -> Array2<f64> {
    arr2(&[[0.0, a, b], [-a, 0.0, c], [-b, -c, 0.0]])
}

fn to_matrix3(p: &Array2<f64>) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| p[[i, j]])
}

fn from_matrix3(m: &Matrix3<f64>) -> Array2<f64> {
    Array2::from_shape_fn((3, 3), |(i, j)| m[(i, j)])
}

/// Nearest rotation in the Frobenius norm, U diag(1, 1, ±1) V^T
fn project(r: &Array2<f64>) -> Array2<f64> {
    let svd = to_matrix3(r).svd(true, true);
    match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => {
            let mut flip = Matrix3::identity();
            if (u * v_t).determinant() < 0.0 {
                flip[(2, 2)] = -1.0;
            }
            from_matrix3(&(u * flip * v_t))
        }
        _ => r.clone(),
    }
}

/// The rotation group SO(3) with the bi-invariant metric
///
/// Tangent vectors are skew-symmetric 3×3 matrices in the body frame:
/// log_p(q) = logm(p^T q) and exp_p(v) = p expm(v), both through the
/// Rodrigues formulas. The distance is the Frobenius norm of the
/// logarithm, i.e. √2 times the rotation angle between p and q.
#[derive(Debug, Clone, Copy)]
pub struct Rotations {
    branch_cut_tolerance: f64,
}

impl Default for Rotations {
    fn default() -> Self {
        Rotations {
            branch_cut_tolerance: ManifoldSettings::default().branch_cut_tolerance,
        }
    }
}

impl Rotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &ManifoldSettings) -> Result<Self> {
        if settings.dim != 3 {
            return Err(Error::InvalidParameter(format!(
                "rotations are implemented for SO(3) only, got dim = {}",
                settings.dim
            )));
        }
        Ok(Self::new().with_branch_cut_tolerance(settings.branch_cut_tolerance))
    }

    /// How far cos θ may leave [-1, 1] before the logarithm is rejected
    pub fn with_branch_cut_tolerance(mut self, tolerance: f64) -> Self {
        self.branch_cut_tolerance = tolerance;
        self
    }

    pub fn branch_cut_tolerance(&self) -> f64 {
        self.branch_cut_tolerance
    }

    /// Rotation matrix of a unit quaternion
    pub fn from_quaternion(q: &UnitQuaternion<f64>) -> Array2<f64> {
        from_matrix3(q.to_rotation_matrix().matrix())
    }

    /// Unit quaternion of a rotation matrix
    pub fn to_quaternion(&self, p: &Array2<f64>) -> Result<UnitQuaternion<f64>> {
        self.validate_point(p)?;
        let rotation = Rotation3::from_matrix_unchecked(to_matrix3(p));
        Ok(UnitQuaternion::from_rotation_matrix(&rotation))
    }

    /// Extrinsic x-y-z Euler angles: R = Rz(z) Ry(y) Rx(x)
    pub fn from_euler(x: f64, y: f64, z: f64) -> Array2<f64> {
        from_matrix3(Rotation3::from_euler_angles(x, y, z).matrix())
    }

    /// expm of a skew-symmetric matrix
    fn expm(&self, v: &Array2<f64>) -> Array2<f64> {
        let v = skew_part(v);
        let theta = frobenius_norm(&v) / 2f64.sqrt();
        let (a, b) = if theta < SMALL_ANGLE {
            (1.0 - theta * theta / 6.0, 0.5 - theta * theta / 24.0)
        } else {
            (theta.sin() / theta, (1.0 - theta.cos()) / (theta * theta))
        };
        let v2 = v.dot(&v);
        Array2::<f64>::eye(3) + a * &v + b * &v2
    }

    /// Principal logarithm of a rotation matrix
    fn logm(&self, r: &Array2<f64>) -> Result<Array2<f64>> {
        let cos_theta = (trace(r) - 1.0) / 2.0;
        let residue = cos_theta.abs() - 1.0;
        if residue > self.branch_cut_tolerance {
            return Err(Error::BranchCut {
                residue,
                tolerance: self.branch_cut_tolerance,
            });
        }
        if residue > 0.0 {
            debug!(residue, "trimmed rotation-angle noise");
        }
        let theta = cos_theta.clamp(-1.0, 1.0).acos();

        if theta < SMALL_ANGLE {
            return Ok(skew_part(r) * (1.0 + theta * theta / 6.0));
        }
        if PI - theta > SMALL_ANGLE {
            return Ok(skew_part(r) * (theta / theta.sin()));
        }

        // Near the cut locus: recover the axis from n n^T = (sym(R) - cos θ I) / (1 - cos θ)
        let outer = (symmetrize(r) - Array2::<f64>::eye(3) * cos_theta) / (1.0 - cos_theta);
        let k = (0..3)
            .max_by(|&i, &j| outer[[i, i]].total_cmp(&outer[[j, j]]))
            .unwrap_or(0);
        let scale = outer[[k, k]].max(f64::MIN_POSITIVE).sqrt();
        let mut axis = [outer[[0, k]] / scale, outer[[1, k]] / scale, outer[[2, k]] / scale];

        // Orient the axis along the (tiny) antisymmetric part when it is informative
        let w = skew_part(r);
        let signed = -w[[1, 2]] * axis[0] + w[[0, 2]] * axis[1] - w[[0, 1]] * axis[2];
        if signed < 0.0 {
            axis.iter_mut().for_each(|n| *n = -*n);
        }
        debug!(theta, "logarithm evaluated next to the cut locus");
        Ok(skew(-axis[2] * theta, axis[1] * theta, -axis[0] * theta))
    }
}

impl Manifold for Rotations {
    type Point = Array2<f64>;
    type Vector = Array2<f64>;

    fn name(&self) -> &'static str {
        "rotations"
    }

    fn dim(&self) -> usize {
        3
    }

    /// exp_p(v) = p expm(v)
    fn exp_unchecked(&self, p: &Self::Point, x: &Self::Vector) -> Self::Point {
        p.dot(&self.expm(x))
    }

    /// log_p(q) = logm(p^T q), with p^T q projected back onto SO(3)
    fn log_unchecked(&self, p: &Self::Point, q: &Self::Point) -> Result<Self::Vector> {
        self.logm(&project(&p.t().dot(q)))
    }

    /// Frobenius norm of the tangent vector
    fn norm(&self, _p: &Self::Point, x: &Self::Vector) -> f64 {
        frobenius_norm(x)
    }

    /// Body-frame coordinates (v01, v02, v12)
    fn to_coords(&self, _p: &Self::Point, x: &Self::Vector) -> DVector<f64> {
        let w = skew_part(x);
        DVector::from_vec(vec![w[[0, 1]], w[[0, 2]], w[[1, 2]]])
    }

    fn from_coords(&self, _p: &Self::Point, coords: &DVector<f64>) -> Result<Self::Vector> {
        if coords.len() != 3 {
            return Err(Error::DimensionMismatch {
                expected: 3,
                got: coords.len(),
            });
        }
        Ok(skew(coords[0], coords[1], coords[2]))
    }

    fn zero_func(&self, _x0: f64, _x1: f64) -> Self::Point {
        Array2::eye(3)
    }

    /// Orthogonal with determinant 1
    fn is_in_manifold(&self, p: &Self::Point) -> bool {
        if p.dim() != (3, 3) || p.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let is_orthogonal =
            frobenius_norm(&(p.dot(&p.t()) - Array2::<f64>::eye(3))) < ORTHOGONAL_TOLERANCE;
        let is_special = (determinant(p) - 1.0).abs() < SPECIAL_TOLERANCE;
        is_orthogonal && is_special
    }

    fn validate_vector(&self, _p: &Self::Point, x: &Self::Vector) -> Result<()> {
        if x.dim() != (3, 3) {
            return Err(Error::DimensionMismatch {
                expected: 9,
                got: x.len(),
            });
        }
        let asymmetry = frobenius_norm(&symmetrize(x));
        if asymmetry > 1e-8 * frobenius_norm(x).max(1.0) {
            return Err(Error::InvalidParameter(format!(
                "tangent vector of SO(3) must be skew-symmetric, symmetric part has norm {:e}",
                asymmetry
            )));
        }
        Ok(())
    }

    /// Uniform (Haar) rotation from a random unit quaternion
    fn gen_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Point {
        let mut draw = || -> f64 { StandardNormal.sample(&mut *rng) };
        let q = Quaternion::new(draw(), draw(), draw(), draw());
        Self::from_quaternion(&UnitQuaternion::from_quaternion(q))
    }

    /// Distance to the identity
    fn to_number(&self, p: &Self::Point) -> f64 {
        self.distance(p, &Array2::eye(3)).unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_matrix_eq(a: &Array2<f64>, b: &Array2<f64>, epsilon: f64) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(*x, *y, epsilon = epsilon);
        }
    }

    #[test]
    fn test_rotations_exp_log_inverse() {
        let rotations = Rotations::new();
        let p = Rotations::from_euler(0.3, -0.2, 1.1);
        let x = skew(0.2, -0.4, 0.1);

        let q = rotations.exp(&p, &x).unwrap();
        assert!(rotations.is_in_manifold(&q));

        let x_recovered = rotations.log(&p, &q).unwrap();
        assert_matrix_eq(&x, &x_recovered, 1e-10);
    }

    #[test]
    fn test_distance_is_sqrt2_times_angle() {
        let rotations = Rotations::new();
        let angle = 0.7;
        let r = Rotations::from_euler(0.0, 0.0, angle);
        let d = rotations.distance(&Array2::eye(3), &r).unwrap();
        assert_relative_eq!(d, 2f64.sqrt() * angle, epsilon = 1e-10);
    }

    #[test]
    fn test_log_at_self_is_zero() {
        let rotations = Rotations::new();
        let p = Rotations::from_euler(1.0, 0.5, -2.0);
        let v = rotations.log(&p, &p).unwrap();
        assert!(frobenius_norm(&v) < 1e-7);
    }

    #[test]
    fn test_log_at_cut_locus_is_best_effort() {
        let rotations = Rotations::new();
        let half_turn = Rotations::from_euler(PI, 0.0, 0.0);
        let v = rotations.log(&Array2::eye(3), &half_turn).unwrap();

        assert_relative_eq!(frobenius_norm(&v), 2f64.sqrt() * PI, epsilon = 1e-8);
        let back = rotations.exp(&Array2::eye(3), &v).unwrap();
        assert_matrix_eq(&back, &half_turn, 1e-8);
    }

    #[test]
    fn test_branch_cut_tolerance_is_tunable() {
        let slightly_scaled: Array2<f64> = Array2::eye(3) * 1.001;
        let identity: Array2<f64> = Array2::eye(3);

        let strict = Rotations::new();
        let err = strict.logm(&slightly_scaled).unwrap_err();
        assert!(matches!(err, Error::BranchCut { .. }));

        let lenient = Rotations::new().with_branch_cut_tolerance(1e-2);
        let v = lenient.logm(&slightly_scaled).unwrap();
        assert!(frobenius_norm(&v) < 1e-12);

        // The product is projected before the logarithm
        let v = strict.log_unchecked(&identity, &slightly_scaled).unwrap();
        assert!(frobenius_norm(&v) < 1e-12);
    }

    #[test]
    fn test_log_at_self_within_membership_tolerance() {
        let rotations = Rotations::new();
        let scaled: Array2<f64> = Array2::eye(3) * 1.0002;
        assert!(rotations.is_in_manifold(&scaled));
        assert!(frobenius_norm(&rotations.log(&scaled, &scaled).unwrap()) < 1e-12);
        assert!(rotations.distance(&scaled, &scaled).unwrap() < 1e-12);
    }

    #[test]
    fn test_projection_keeps_rotations() {
        let r = Rotations::from_euler(0.7, -1.2, 2.9);
        assert_matrix_eq(&project(&r), &r, 1e-12);

        let noisy = &r + &(arr2(&[[1.0, -2.0, 0.5], [0.0, 1.5, -1.0], [2.0, 0.3, -0.7]]) * 1e-4);
        let projected = project(&noisy);
        let orthogonality = projected.dot(&projected.t()) - Array2::<f64>::eye(3);
        assert!(frobenius_norm(&orthogonality) < 1e-12);
        assert_relative_eq!(determinant(&projected), 1.0, epsilon = 1e-12);
        assert!(frobenius_norm(&(&projected - &r)) < 1e-3);
    }

    #[test]
    fn test_membership() {
        let rotations = Rotations::new();
        assert!(rotations.is_in_manifold(&Array2::eye(3)));
        assert!(!rotations.is_in_manifold(&(Array2::<f64>::eye(3) * 2.0)));

        let reflection = arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]]);
        assert!(!rotations.is_in_manifold(&reflection));
        assert!(!rotations.is_in_manifold(&Array2::eye(2)));
    }

    #[test]
    fn test_quaternion_roundtrip() {
        let rotations = Rotations::new();
        let p = Rotations::from_euler(0.4, 0.1, -0.9);
        let q = rotations.to_quaternion(&p).unwrap();
        assert_matrix_eq(&Rotations::from_quaternion(&q), &p, 1e-12);
    }

    #[test]
    fn test_euler_about_z() {
        let t: f64 = 0.3;
        let r = Rotations::from_euler(0.0, 0.0, t);
        let expected = arr2(&[[t.cos(), -t.sin(), 0.0], [t.sin(), t.cos(), 0.0], [0.0, 0.0, 1.0]]);
        assert_matrix_eq(&r, &expected, 1e-12);
    }

    #[test]
    fn test_generated_points_are_rotations() {
        let rotations = Rotations::new();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert!(rotations.is_in_manifold(&rotations.gen_point(&mut rng)));
        }
    }

    #[test]
    fn test_coordinates_roundtrip() {
        let rotations = Rotations::new();
        let p: Array2<f64> = Array2::eye(3);
        let x = skew(0.1, 0.2, 0.3);
        let coords = rotations.to_coords(&p, &x);
        assert_eq!(coords.as_slice(), &[0.1, 0.2, 0.3]);
        assert_matrix_eq(&rotations.from_coords(&p, &coords).unwrap(), &x, 0.0);
    }

    #[test]
    fn test_settings_reject_other_dimensions() {
        let settings = ManifoldSettings::default().with_dim(4);
        assert!(Rotations::from_settings(&settings).is_err());
    }
}
