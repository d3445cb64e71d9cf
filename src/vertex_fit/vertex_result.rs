//! # Vertex fit result
//!
//! [`VertexResult`] is the record handed to downstream event-summary writers: the
//! fitted position and covariance in detector units, the normalized chi-square, the
//! caller's primary flag and the algorithm tag, plus the [`FitDiagnostics`] needed to
//! tell a converged fit from one stopped by the iteration cap.
use std::fmt;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::constants::{Millimeter, ALGORITHM_TYPE, M_TO_MM};

use super::fitter::FitOutcome;
use super::to_millimeter;

/// Convergence report of the least-squares loop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// Number of iterations performed.
    pub iterations: usize,
    /// Last value of the stability metric `Δxᵀ·Cov(x)⁻¹·Δx`.
    pub stability: f64,
    /// `true` when the stability threshold was met before the iteration cap.
    pub converged: bool,
}

/// Fitted vertex.
///
/// The covariance is packed as the upper triangle `[xx, xy, xz, yy, yz, zz]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexResult {
    /// Position `[mm]`.
    pub position: Vector3<Millimeter>,
    /// Packed position covariance `[mm²]`.
    pub covariance: [f64; 6],
    /// Chi-square divided by the degrees of freedom.
    pub chi2: f64,
    /// Caller-supplied primary-vertex flag.
    pub primary: bool,
    /// `0` for an unfitted (default) result, [`ALGORITHM_TYPE`] after a fit.
    pub algorithm_type: u32,
    pub n_tracks: usize,
    /// `2·n_tracks − 3`
    pub ndof: usize,
    pub diagnostics: FitDiagnostics,
}

impl Default for VertexResult {
    fn default() -> Self {
        VertexResult {
            position: Vector3::zeros(),
            covariance: [0.0; 6],
            chi2: 0.0,
            primary: false,
            algorithm_type: 0,
            n_tracks: 0,
            ndof: 0,
            diagnostics: FitDiagnostics::default(),
        }
    }
}

fn pack_symmetric(m: &Matrix3<f64>) -> [f64; 6] {
    [
        m[(0, 0)],
        m[(0, 1)],
        m[(0, 2)],
        m[(1, 1)],
        m[(1, 2)],
        m[(2, 2)],
    ]
}

impl VertexResult {
    /// Build the detector-unit record from a fitting-frame outcome.
    pub(crate) fn from_fit(
        outcome: &FitOutcome,
        primary: bool,
        n_tracks: usize,
        ndof: usize,
    ) -> Self {
        let estimate = &outcome.estimate;
        VertexResult {
            position: to_millimeter(&estimate.position),
            covariance: pack_symmetric(&(estimate.covariance * (M_TO_MM * M_TO_MM))),
            chi2: estimate.chi2 / ndof as f64,
            primary,
            algorithm_type: ALGORITHM_TYPE,
            n_tracks,
            ndof,
            diagnostics: outcome.diagnostics,
        }
    }

    /// Unpacked, symmetric position covariance `[mm²]`.
    pub fn covariance_matrix(&self) -> Matrix3<f64> {
        let [xx, xy, xz, yy, yz, zz] = self.covariance;
        Matrix3::new(xx, xy, xz, xy, yy, yz, xz, yz, zz)
    }

    /// Positional uncertainties `(σx, σy, σz)` `[mm]`.
    pub fn position_errors(&self) -> Vector3<Millimeter> {
        let [xx, _, _, yy, _, zz] = self.covariance;
        Vector3::new(xx.sqrt(), yy.sqrt(), zz.sqrt())
    }

    /// `true` for a fitted vertex with finite position, covariance and chi-square.
    pub fn is_valid(&self) -> bool {
        self.algorithm_type != 0
            && self.position.iter().all(|v| v.is_finite())
            && self.covariance.iter().all(|v| v.is_finite())
            && self.chi2.is_finite()
    }
}

impl fmt::Display for VertexResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sigma = self.position_errors();
        writeln!(
            f,
            "Vertex ({}, algorithm {}, {} tracks)",
            if self.primary { "primary" } else { "secondary" },
            self.algorithm_type,
            self.n_tracks
        )?;
        writeln!(f, "  x = {:.6} ± {:.6} mm", self.position.x, sigma.x)?;
        writeln!(f, "  y = {:.6} ± {:.6} mm", self.position.y, sigma.y)?;
        writeln!(f, "  z = {:.6} ± {:.6} mm", self.position.z, sigma.z)?;
        writeln!(f, "  chi2/ndof = {:.4} (ndof = {})", self.chi2, self.ndof)?;
        write!(
            f,
            "  iterations = {}, stability = {:.3e}, converged = {}",
            self.diagnostics.iterations, self.diagnostics.stability, self.diagnostics.converged
        )
    }
}
