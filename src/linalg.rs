//! # Regularized inversion of small symmetric matrices
//!
//! Covariance and weight matrices handled by the vertex fit are tiny (2×2 or 3×3)
//! but frequently ill-conditioned: the positional covariance of a track sampled
//! close to its reference point is almost degenerate along the track direction,
//! and nearly parallel tracks give an almost singular normal matrix.
//!
//! ## Strategy
//!
//! When every diagonal element is strictly positive, the matrix `S` is first
//! preconditioned by `D = diag(1/√Sᵢᵢ)` so that `R = D·S·D` has a unit diagonal.
//! The leading block of `R` is inverted in closed form and the full inverse is
//! recovered with Schur-complement algebra, then `S⁻¹ = D·R⁻¹·D`.
//!
//! Otherwise the matrix is inverted directly, with a `tracing` warning since a
//! non-positive variance means the input is already broken upstream.
//!
//! When either route meets a matrix that is singular to working precision, or
//! produces a non-finite inverse, the Moore–Penrose pseudo-inverse is returned
//! instead. For a rank-deficient normal matrix this yields the minimum-norm
//! least-squares solution. Ill-conditioned but regular matrices always take the
//! closed-form route, however large their inverse.
//!
//! ## See also
//!
//! * [`reg_inv2`], [`reg_inv3`] – fixed-size entry points used by the fitters.
//! * [`regularized_inverse`] – dynamic-size entry point with a size check.

use nalgebra::{DMatrix, Matrix2, Matrix3, SMatrix, SVector, Vector2};
use tracing::warn;

use crate::constants::{PINV_MAX_SWEEPS, PINV_RCOND, SINGULAR_DET_TOL};
use crate::vtxfit_errors::VtxFitError;

/// Similarity transform `A·M·Aᵀ`.
#[inline]
pub fn similarity<const R: usize, const C: usize>(
    a: &SMatrix<f64, R, C>,
    m: &SMatrix<f64, C, C>,
) -> SMatrix<f64, R, R> {
    a * m * a.transpose()
}

/// Quadratic form `vᵀ·M·v`.
#[inline]
pub fn quadratic_form<const N: usize>(m: &SMatrix<f64, N, N>, v: &SVector<f64, N>) -> f64 {
    v.dot(&(m * v))
}

/// Return `(M + Mᵀ)/2`, removing the rounding asymmetry of chained products.
#[inline]
pub fn symmetrize<const N: usize>(m: &SMatrix<f64, N, N>) -> SMatrix<f64, N, N> {
    (m + m.transpose()) * 0.5
}

/// `det` of a unit-diagonal matrix that is zero to working precision, or not finite.
fn is_singular(det: f64) -> bool {
    !det.is_finite() || det.abs() <= SINGULAR_DET_TOL
}

fn is_finite<const N: usize>(m: &SMatrix<f64, N, N>) -> bool {
    m.iter().all(|v| v.is_finite())
}

fn has_positive_diagonal<const N: usize>(m: &SMatrix<f64, N, N>) -> bool {
    (0..N).all(|i| m[(i, i)] > 0.0)
}

/// Diagonal preconditioner `dᵢ = 1/√Sᵢᵢ` and the unit-diagonal matrix `R = D·S·D`.
///
/// The upper triangle is computed once and mirrored so that `R` is exactly symmetric.
fn precondition<const N: usize>(
    s: &SMatrix<f64, N, N>,
) -> (SVector<f64, N>, SMatrix<f64, N, N>) {
    let d = SVector::<f64, N>::from_fn(|i, _| 1.0 / s[(i, i)].sqrt());
    let mut r = SMatrix::<f64, N, N>::identity();
    for i in 0..N {
        for j in (i + 1)..N {
            let v = s[(i, j)] * d[i] * d[j];
            r[(i, j)] = v;
            r[(j, i)] = v;
        }
    }
    (d, r)
}

/// Undo the preconditioning: `D·M·D`.
fn unprecondition<const N: usize>(
    d: &SVector<f64, N>,
    m: &SMatrix<f64, N, N>,
) -> SMatrix<f64, N, N> {
    SMatrix::<f64, N, N>::from_fn(|i, j| m[(i, j)] * (d[i] * d[j]))
}

/// Moore–Penrose pseudo-inverse with a cutoff relative to the largest singular value.
///
/// Non-finite input has no pseudo-inverse: it propagates as NaN.
fn pseudo_inverse_dyn(m: &DMatrix<f64>) -> DMatrix<f64> {
    let (rows, cols) = m.shape();
    if !m.iter().all(|v| v.is_finite()) {
        return DMatrix::from_element(cols, rows, f64::NAN);
    }
    let Some(svd) = m.clone().try_svd(true, true, f64::EPSILON, PINV_MAX_SWEEPS) else {
        warn!(rows, cols, "SVD did not converge");
        return DMatrix::from_element(cols, rows, f64::NAN);
    };
    let cutoff = PINV_RCOND * svd.singular_values.max();
    svd.pseudo_inverse(cutoff)
        .unwrap_or_else(|_| DMatrix::zeros(cols, rows))
}

/// Pseudo-inverse of a fixed-size square matrix.
pub fn pseudo_inverse<const N: usize>(m: &SMatrix<f64, N, N>) -> SMatrix<f64, N, N> {
    let pinv = pseudo_inverse_dyn(&DMatrix::from_column_slice(N, N, m.as_slice()));
    SMatrix::<f64, N, N>::from_column_slice(pinv.as_slice())
}

/// Direct inverse of a square matrix of any size, or its pseudo-inverse when singular.
pub fn direct_inverse(m: &DMatrix<f64>) -> DMatrix<f64> {
    m.clone().try_inverse().unwrap_or_else(|| {
        warn!(size = m.nrows(), "singular matrix, using pseudo-inverse");
        pseudo_inverse_dyn(m)
    })
}

/// Direct inverse of a 2×2 matrix, or its pseudo-inverse when singular.
pub fn direct_inverse2(m: &Matrix2<f64>) -> Matrix2<f64> {
    m.try_inverse().unwrap_or_else(|| {
        warn!("singular 2x2 matrix, using pseudo-inverse");
        pseudo_inverse(m)
    })
}

/// Direct inverse of a 3×3 matrix, or its pseudo-inverse when singular.
pub fn direct_inverse3(m: &Matrix3<f64>) -> Matrix3<f64> {
    m.try_inverse().unwrap_or_else(|| {
        warn!("singular 3x3 matrix, using pseudo-inverse");
        pseudo_inverse(m)
    })
}

/// Regularized inverse of a symmetric 2×2 matrix.
///
/// Arguments
/// -----------------
/// * `s` – symmetric matrix, positive definite or close to it.
///
/// Return
/// ----------
/// * `S⁻¹`, computed through the unit-diagonal preconditioned form when both
///   variances are positive, by direct inversion otherwise.
///
/// Remarks
/// ------------
/// * A preconditioned determinant that is zero to working precision (fully
///   correlated rows) returns the pseudo-inverse of `s`.
pub fn reg_inv2(s: &Matrix2<f64>) -> Matrix2<f64> {
    if !has_positive_diagonal(s) {
        warn!(
            s00 = s[(0, 0)],
            s11 = s[(1, 1)],
            "non-positive diagonal in 2x2 inversion, falling back to direct inverse"
        );
        return direct_inverse2(s);
    }

    let (d, r) = precondition(s);
    let q = r[(0, 1)];
    let det = 1.0 - q * q;
    if is_singular(det) {
        warn!(det, "singular 2x2 matrix, using pseudo-inverse");
        return pseudo_inverse(s);
    }

    let inv = unprecondition(&d, &(Matrix2::new(1.0, -q, -q, 1.0) / det));
    if !is_finite(&inv) {
        warn!(det, "non-finite 2x2 inverse, using pseudo-inverse");
        return pseudo_inverse(s);
    }
    inv
}

/// Regularized inverse of a symmetric 3×3 matrix.
///
/// After preconditioning, `R` is split as
///
/// ```text
///     | Q   p |        Q : leading 2×2 block (unit diagonal)
/// R = |       |        p : coupling of the last row with the block
///     | pᵀ  1 |
/// ```
///
/// With `H = adj(Q)`, `Det = det(Q)` and `h = pᵀ·H·p − Det` (so `det(R) = −h`):
///
/// ```text
///        1 | (h·H − H·p·pᵀ·H)/Det   H·p  |
/// R⁻¹ = ---|                             |
///        h | (H·p)ᵀ                −Det  |
/// ```
///
/// Arguments
/// -----------------
/// * `s` – symmetric matrix, positive definite or close to it.
///
/// Return
/// ----------
/// * `S⁻¹`. Non-positive diagonals fall back to a direct inverse. `Det` or `h` zero
///   to working precision, or a non-finite result, fall back to the pseudo-inverse.
pub fn reg_inv3(s: &Matrix3<f64>) -> Matrix3<f64> {
    if !has_positive_diagonal(s) {
        warn!(
            s00 = s[(0, 0)],
            s11 = s[(1, 1)],
            s22 = s[(2, 2)],
            "non-positive diagonal in 3x3 inversion, falling back to direct inverse"
        );
        return direct_inverse3(s);
    }

    let (d, r) = precondition(s);
    let q = r[(0, 1)];
    let det = 1.0 - q * q;
    let adj = Matrix2::new(1.0, -q, -q, 1.0);
    let p = Vector2::new(r[(0, 2)], r[(1, 2)]);
    let b = adj * p;
    let h = p.dot(&b) - det;
    if is_singular(det) || is_singular(h) {
        warn!(det, h, "singular 3x3 matrix, using pseudo-inverse");
        return pseudo_inverse(s);
    }

    let f = (adj * h - b * b.transpose()) / det;
    let mut inv_r = Matrix3::zeros();
    for i in 0..2 {
        inv_r[(i, 2)] = b[i];
        inv_r[(2, i)] = b[i];
        for j in 0..2 {
            inv_r[(i, j)] = f[(i, j)];
        }
    }
    inv_r[(2, 2)] = -det;
    inv_r /= h;

    let inv = unprecondition(&d, &inv_r);
    if !is_finite(&inv) {
        warn!(det, h, "non-finite 3x3 inverse, using pseudo-inverse");
        return pseudo_inverse(s);
    }
    inv
}

/// Regularized inverse of a dynamically sized symmetric matrix.
///
/// Dispatches to [`reg_inv2`] or [`reg_inv3`]. Any other square size is a misuse:
/// it is reported as [`VtxFitError::WrongMatrixSize`] through `tracing` and the
/// matrix is inverted directly.
///
/// Errors
/// ----------
/// * [`VtxFitError::NonSquareMatrix`] if `s` is not square.
pub fn regularized_inverse(s: &DMatrix<f64>) -> Result<DMatrix<f64>, VtxFitError> {
    let (rows, cols) = s.shape();
    if rows != cols {
        return Err(VtxFitError::NonSquareMatrix { rows, cols });
    }

    match rows {
        2 => {
            let inv = reg_inv2(&s.fixed_view::<2, 2>(0, 0).into_owned());
            Ok(DMatrix::from_column_slice(2, 2, inv.as_slice()))
        }
        3 => {
            let inv = reg_inv3(&s.fixed_view::<3, 3>(0, 0).into_owned());
            Ok(DMatrix::from_column_slice(3, 3, inv.as_slice()))
        }
        n => {
            let err = VtxFitError::WrongMatrixSize { found: n };
            warn!(%err, "falling back to direct inversion");
            Ok(direct_inverse(s))
        }
    }
}
