//! # Preliminary vertex estimate
//!
//! Cheap geometric seed for the least-squares fitter. Helix parameters are taken as
//! given (no steering) and no covariance is produced.
//!
//! ## Transverse loop
//!
//! At a vertex radius `Rᵥ`, the transverse point of a track closest to the vertex is
//! approximated by the line of normal `nᵢ = (−sin φ0, cos φ0)` at signed distance
//!
//! ```text
//! Dᵢ = (D·(1 + C·D) + Rᵥ²·C) / (1 + 2·C·D)
//! ```
//!
//! The lines are intersected by weighted least squares (weights `1/σ²_D`),
//! `Rᵥ` is updated with the radius of the solution and the loop repeats until the
//! step `Δx` satisfies `Δxᵀ·H·Δx ≤ prelim_eps` or `prelim_max_iter` is reached.
//! Hitting the cap is not an error; the last solution is kept.
//!
//! ## Longitudinal pass
//!
//! With the final `Rᵥ`, each track contributes `z0 + tanλ·√((Rᵥ² − D²)/(1 + 2·C·D))`,
//! the chord from its reference point to the vertex circle scaled by the slope, and
//! the contributions are averaged with weights `1/σ²_z0`.
use nalgebra::{Matrix2, Vector2, Vector3};
use smallvec::SmallVec;
use tracing::debug;

use crate::constants::{Meter, Millimeter, INITIAL_STABILITY};
use crate::linalg::{quadratic_form, reg_inv2};
use crate::track::fit_frame::FitFrameParameters;
use crate::track::TrackHelix;
use crate::vtxfit_errors::VtxFitError;

use super::{to_millimeter, VertexFitParams};

/// Fitting-frame output of the preliminary estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PrelimEstimate {
    pub position: Vector3<Meter>,
    pub iterations: usize,
    pub stability: f64,
}

/// Signed distance of the transverse line standing in for a track at vertex radius `rv`.
#[inline]
fn line_distance(par: &FitFrameParameters, rv: Meter) -> Meter {
    let (d, c) = (par.d(), par.c());
    (d * (1.0 + c * d) + rv * rv * c) / (1.0 + 2.0 * c * d)
}

/// Unit normal of the transverse line of a track.
#[inline]
fn line_normal(par: &FitFrameParameters) -> Vector2<f64> {
    let (s, c) = par.phi0().sin_cos();
    Vector2::new(-s, c)
}

/// Preliminary vertex position, in millimeters.
///
/// Arguments
/// -----------------
/// * `tracks` – the tracks of the vertex candidate, in detector units.
/// * `params` – uses `prelim_max_iter` and `prelim_eps`.
///
/// Return
/// ----------
/// * The seed position `[mm]`.
///
/// Errors
/// ----------
/// * [`VtxFitError::EmptyTrackList`] when `tracks` is empty.
pub fn prelim_vertex(
    tracks: &[TrackHelix],
    params: &VertexFitParams,
) -> Result<Vector3<Millimeter>, VtxFitError> {
    let pars: SmallVec<[FitFrameParameters; 8]> =
        tracks.iter().map(FitFrameParameters::from).collect();
    let estimate = prelim_vertex_fit_frame(&pars, params)?;
    Ok(to_millimeter(&estimate.position))
}

/// Chord term `√((R² − D²)/(1 + 2·C·D))` of the longitudinal pass at radius `rv`.
fn longitudinal_chord(par: &FitFrameParameters, rv: Meter) -> f64 {
    let (d, c) = (par.d(), par.c());
    // Floored after the division: the denominator can change sign.
    ((rv * rv - d * d) / (1.0 + 2.0 * c * d)).max(0.0).sqrt()
}

/// Same as [`prelim_vertex`] on tracks already mapped to the fitting frame, in meters.
pub(crate) fn prelim_vertex_fit_frame(
    pars: &[FitFrameParameters],
    params: &VertexFitParams,
) -> Result<PrelimEstimate, VtxFitError> {
    if pars.is_empty() {
        return Err(VtxFitError::EmptyTrackList);
    }

    let mut xt = Vector2::<f64>::zeros();
    let mut rv: Meter = 0.0;
    let mut stability = INITIAL_STABILITY;
    let mut iterations = 0;

    while stability > params.prelim_eps && iterations < params.prelim_max_iter {
        let mut h = Matrix2::<f64>::zeros();
        let mut cxy = Vector2::<f64>::zeros();

        for par in pars {
            let w = 1.0 / par.covariance[(0, 0)];
            let n = line_normal(par);
            h += n * n.transpose() * w;
            cxy += n * (line_distance(par, rv) * w);
        }

        let next = reg_inv2(&h) * cxy;
        rv = next.norm();
        stability = quadratic_form(&h, &(next - xt));
        xt = next;
        iterations += 1;

        debug!(
            iteration = iterations,
            stability,
            x = xt.x,
            y = xt.y,
            "preliminary transverse step"
        );
    }

    let (mut hz, mut cz) = (0.0, 0.0);
    for par in pars {
        let w = 1.0 / par.covariance[(3, 3)];
        hz += w;
        cz += (par.tan_lambda() * longitudinal_chord(par, rv) + par.z0()) * w;
    }

    Ok(PrelimEstimate {
        position: Vector3::new(xt.x, xt.y, cz / hz),
        iterations,
        stability,
    })
}
