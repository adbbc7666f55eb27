use nalgebra::DVector;
use ndarray::{Array1, Array2};
use rand::Rng;
use tracing::debug;

use crate::core::linalg::{
    eigh, from_eigen, frobenius_norm, random_orthogonal, sqrt_and_inv_sqrt, symmetrize,
};
use crate::core::{Error, Manifold, ManifoldSettings, Result};

const SYMMETRIC_ERROR: f64 = 1e-5;

/// Manifold of Symmetric Positive Definite (SPD) matrices
/// with the affine-invariant Riemannian metric
///
/// SPD(n) = {P ∈ R^{n×n} : P = P^T, P ≻ 0}
///
/// exp_P(X) = P^{1/2} exp(P^{-1/2} X P^{-1/2}) P^{1/2}
/// log_P(Q) = P^{1/2} log(P^{-1/2} Q P^{-1/2}) P^{1/2}
///
/// Tangent coordinates are taken on the whitened matrix P^{-1/2} X P^{-1/2},
/// so they are invariant under congruence and their Euclidean norm is the
/// affine-invariant norm of X.
#[derive(Debug, Clone, Copy)]
pub struct Spd {
    /// Dimension of the matrices (n x n)
    dim: usize,
    branch_cut_tolerance: f64,
}

impl Spd {
    pub fn new(dim: usize) -> Self {
        Spd {
            dim,
            branch_cut_tolerance: ManifoldSettings::default().branch_cut_tolerance,
        }
    }

    pub fn from_settings(settings: &ManifoldSettings) -> Result<Self> {
        if settings.dim == 0 {
            return Err(Error::InvalidParameter(
                "SPD matrices need a positive dimension".to_string(),
            ));
        }
        Ok(Self::new(settings.dim).with_branch_cut_tolerance(settings.branch_cut_tolerance))
    }

    /// How far below zero an eigenvalue of P^{-1/2} Q P^{-1/2} may fall and still
    /// be treated as rounding noise by the logarithm
    pub fn with_branch_cut_tolerance(mut self, tolerance: f64) -> Self {
        self.branch_cut_tolerance = tolerance;
        self
    }

    /// Size n of the matrices
    pub fn matrix_size(&self) -> usize {
        self.dim
    }

    /// Check if matrix is symmetric positive definite
    fn is_spd(&self, p: &Array2<f64>, tolerance: f64) -> bool {
        if p.dim() != (self.dim, self.dim) || p.iter().any(|v| !v.is_finite()) {
            return false;
        }
        if frobenius_norm(&(p - &p.t())) >= tolerance {
            return false;
        }
        let (eigenvalues, _) = eigh(p);
        eigenvalues.iter().all(|&lambda| lambda > 0.0)
    }

    /// Matrix logarithm of a (numerically) SPD matrix, trimming rounding noise
    fn logm(&self, y: &Array2<f64>) -> Result<Array2<f64>> {
        let (eigenvalues, eigenvectors) = eigh(y);
        let smallest = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
        if smallest <= 0.0 {
            if -smallest > self.branch_cut_tolerance {
                return Err(Error::BranchCut {
                    residue: -smallest,
                    tolerance: self.branch_cut_tolerance,
                });
            }
            debug!(smallest, "trimmed non-positive eigenvalue noise");
        }
        let clamped: Array1<f64> = eigenvalues.mapv(|lambda| lambda.max(f64::EPSILON));
        Ok(from_eigen(&clamped, &eigenvectors, f64::ln))
    }

    /// Whitened matrix P^{-1/2} X P^{-1/2}
    fn whiten(&self, p: &Array2<f64>, x: &Array2<f64>) -> Array2<f64> {
        let (_, p_inv_sqrt) = sqrt_and_inv_sqrt(p);
        symmetrize(&p_inv_sqrt.dot(x).dot(&p_inv_sqrt))
    }

    fn coords_len(&self) -> usize {
        self.dim * (self.dim + 1) / 2
    }
}

impl Manifold for Spd {
    type Point = Array2<f64>;
    type Vector = Array2<f64>;

    fn name(&self) -> &'static str {
        "spd"
    }

    /// Intrinsic dimension n(n+1)/2
    fn dim(&self) -> usize {
        self.coords_len()
    }

    fn exp_unchecked(&self, p: &Self::Point, x: &Self::Vector) -> Self::Point {
        let (p_sqrt, p_inv_sqrt) = sqrt_and_inv_sqrt(p);

        // Y = P^{-1/2} X P^{-1/2}
        let y = symmetrize(&p_inv_sqrt.dot(&symmetrize(x)).dot(&p_inv_sqrt));
        let (y_eigenvalues, y_eigenvectors) = eigh(&y);
        let exp_y = from_eigen(&y_eigenvalues, &y_eigenvectors, f64::exp);

        symmetrize(&p_sqrt.dot(&exp_y).dot(&p_sqrt))
    }

    fn log_unchecked(&self, p: &Self::Point, q: &Self::Point) -> Result<Self::Vector> {
        let (p_sqrt, p_inv_sqrt) = sqrt_and_inv_sqrt(p);

        // Y = P^{-1/2} Q P^{-1/2}
        let y = symmetrize(&p_inv_sqrt.dot(q).dot(&p_inv_sqrt));
        let log_y = self.logm(&y)?;

        Ok(symmetrize(&p_sqrt.dot(&log_y).dot(&p_sqrt)))
    }

    /// Affine-invariant norm |P^{-1/2} X P^{-1/2}|_F
    fn norm(&self, p: &Self::Point, x: &Self::Vector) -> f64 {
        frobenius_norm(&self.whiten(p, x))
    }

    /// d(P, Q) = |log(P^{-1/2} Q P^{-1/2})|_F
    fn distance(&self, p: &Self::Point, q: &Self::Point) -> Result<f64> {
        self.validate_point(p)?;
        self.validate_point(q)?;
        Ok(frobenius_norm(&self.logm(&self.whiten(p, q))?))
    }

    /// Upper triangle of the whitened matrix, off-diagonal entries scaled by √2
    fn to_coords(&self, p: &Self::Point, x: &Self::Vector) -> DVector<f64> {
        let w = self.whiten(p, x);
        let mut coords = Vec::with_capacity(self.coords_len());
        for i in 0..self.dim {
            for j in i..self.dim {
                let scale = if i == j { 1.0 } else { std::f64::consts::SQRT_2 };
                coords.push(w[[i, j]] * scale);
            }
        }
        DVector::from_vec(coords)
    }

    fn from_coords(&self, p: &Self::Point, coords: &DVector<f64>) -> Result<Self::Vector> {
        if coords.len() != self.coords_len() {
            return Err(Error::DimensionMismatch {
                expected: self.coords_len(),
                got: coords.len(),
            });
        }

        let mut w = Array2::zeros((self.dim, self.dim));
        let mut idx = 0;
        for i in 0..self.dim {
            for j in i..self.dim {
                if i == j {
                    w[[i, i]] = coords[idx];
                } else {
                    let value = coords[idx] / std::f64::consts::SQRT_2;
                    w[[i, j]] = value;
                    w[[j, i]] = value;
                }
                idx += 1;
            }
        }

        let (p_sqrt, _) = sqrt_and_inv_sqrt(p);
        Ok(symmetrize(&p_sqrt.dot(&w).dot(&p_sqrt)))
    }

    fn zero_func(&self, _x0: f64, _x1: f64) -> Self::Point {
        Array2::eye(self.dim)
    }

    fn is_in_manifold(&self, p: &Self::Point) -> bool {
        self.is_spd(p, SYMMETRIC_ERROR)
    }

    fn validate_vector(&self, _p: &Self::Point, x: &Self::Vector) -> Result<()> {
        if x.dim() != (self.dim, self.dim) {
            return Err(Error::DimensionMismatch {
                expected: self.dim * self.dim,
                got: x.len(),
            });
        }
        // Tangent space of SPD is the symmetric matrices
        let asymmetry = frobenius_norm(&(x - &x.t()));
        if asymmetry > 1e-8 * frobenius_norm(x).max(1.0) {
            return Err(Error::InvalidParameter(
                "Tangent vector must be symmetric".to_string(),
            ));
        }
        Ok(())
    }

    /// Random orthogonal eigenbasis with eigenvalues drawn from (1, 2)
    fn gen_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Point {
        let basis = random_orthogonal(self.dim, rng);
        let eigenvalues = Array1::from_shape_fn(self.dim, |_| 1.0 + rng.gen::<f64>());
        from_eigen(&eigenvalues, &basis, |lambda| lambda)
    }

    /// Spectral norm
    fn to_number(&self, p: &Self::Point) -> f64 {
        let (eigenvalues, _) = eigh(p);
        eigenvalues.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
    }
}
