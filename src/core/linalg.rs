//! Dense linear algebra helpers bridging `ndarray` points and `nalgebra` decompositions.
//!
//! Manifold points are stored as `Array2<f64>`; the spectral calculus needed by
//! the matrix manifolds (square roots, logarithms, exponentials of symmetric
//! matrices) is carried out through `nalgebra::SymmetricEigen`.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Copy an `ndarray` matrix into a `nalgebra` matrix
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

/// Copy a `nalgebra` matrix back into an `ndarray` matrix
pub fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Symmetric part (A + A^T) / 2
pub fn symmetrize(a: &Array2<f64>) -> Array2<f64> {
    0.5 * (a + &a.t())
}

/// Antisymmetric part (A - A^T) / 2
pub fn skew_part(a: &Array2<f64>) -> Array2<f64> {
    0.5 * (a - &a.t())
}

/// Frobenius norm
pub fn frobenius_norm(a: &Array2<f64>) -> f64 {
    a.iter().map(|v| v * v).sum::<f64>().sqrt()
}

pub fn trace(a: &Array2<f64>) -> f64 {
    a.diag().sum()
}

pub fn determinant(a: &Array2<f64>) -> f64 {
    to_dmatrix(a).determinant()
}

/// Eigendecomposition of the symmetric part of `a`: A = Q D Q^T
///
/// Returns the eigenvalues and the matrix whose columns are the eigenvectors.
pub fn eigh(a: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let eigen = SymmetricEigen::new(to_dmatrix(&symmetrize(a)));
    let values = Array1::from_iter(eigen.eigenvalues.iter().copied());
    (values, from_dmatrix(&eigen.eigenvectors))
}

/// Rebuild Q f(D) Q^T from an eigendecomposition
pub fn from_eigen(
    values: &Array1<f64>,
    vectors: &Array2<f64>,
    f: impl Fn(f64) -> f64,
) -> Array2<f64> {
    let mapped = values.mapv(f);
    let result = vectors.dot(&Array2::from_diag(&mapped)).dot(&vectors.t());
    symmetrize(&result)
}

/// Apply a scalar function to a symmetric matrix through its spectrum
pub fn spectral_apply(a: &Array2<f64>, f: impl Fn(f64) -> f64) -> Array2<f64> {
    let (values, vectors) = eigh(a);
    from_eigen(&values, &vectors, f)
}

/// Square root and inverse square root of an SPD matrix in one decomposition
pub fn sqrt_and_inv_sqrt(a: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    let (values, vectors) = eigh(a);
    let sqrt = from_eigen(&values, &vectors, f64::sqrt);
    let inv_sqrt = from_eigen(&values, &vectors, |lambda| 1.0 / lambda.sqrt());
    (sqrt, inv_sqrt)
}

/// Haar-distributed random orthogonal matrix (QR of a Gaussian matrix with sign correction)
pub fn random_orthogonal<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Array2<f64> {
    let gaussian = DMatrix::from_fn(n, n, |_, _| {
        let v: f64 = StandardNormal.sample(&mut *rng);
        v
    });
    let qr = gaussian.qr();
    let mut q = qr.q();
    let r = qr.r();
    for j in 0..n {
        if r[(j, j)] < 0.0 {
            for v in q.column_mut(j).iter_mut() {
                *v = -*v;
            }
        }
    }
    from_dmatrix(&q)
}
