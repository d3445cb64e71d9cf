//! # Helix linearization kernel
//!
//! Closed-form position and derivatives of a fitting-frame helix as a function of its
//! trajectory phase `φ`. With `(D, φ0, C, z0, tanλ)` the [`FitFrameParameters`]:
//!
//! ```text
//! x(φ) = −D·sin φ0 + (sin(φ + φ0) − sin φ0) / 2C
//! y(φ) =  D·cos φ0 − (cos(φ + φ0) − cos φ0) / 2C
//! z(φ) =  z0 + tanλ·φ / 2C
//! ```
//!
//! The transverse projection is a circle of radius `1/2|C|` centred on
//! `(−(D + 1/2C)·sin φ0, (D + 1/2C)·cos φ0)`, and `φ/2C` is the signed transverse arc
//! length from the reference point `x(0)`.
//!
//! Both the preliminary estimator and the full fitter linearize tracks with
//! [`linearize`]; the standalone functions exist for callers that only need one piece.

use nalgebra::{SMatrix, Vector3};

use crate::constants::Phase;
use crate::track::fit_frame::FitFrameParameters;

/// Jacobian `∂x/∂(D, φ0, C, z0, tanλ)` of a helix point, 3×5.
pub type HelixJacobian = SMatrix<f64, 3, 5>;

/// Everything the least-squares fit needs from a helix at a given phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelixLinearization {
    /// Point on the helix at the linearization phase.
    pub position: Vector3<f64>,
    /// `∂x/∂α` with respect to the five helix parameters.
    pub jacobian: HelixJacobian,
    /// `∂x/∂φ`.
    pub dx_dphase: Vector3<f64>,
}

/// Reference point `x(0)`, the point of closest approach to the z axis.
pub fn reference_point(par: &FitFrameParameters) -> Vector3<f64> {
    let (sp0, cp0) = par.phi0().sin_cos();
    Vector3::new(-par.d() * sp0, par.d() * cp0, par.z0())
}

/// Point on the helix at phase `phase`.
pub fn position(par: &FitFrameParameters, phase: Phase) -> Vector3<f64> {
    linearize(par, phase).position
}

/// Jacobian of the helix point with respect to the helix parameters at phase `phase`.
pub fn derivative_matrix(par: &FitFrameParameters, phase: Phase) -> HelixJacobian {
    linearize(par, phase).jacobian
}

/// Derivative of the helix point with respect to the phase.
pub fn phase_derivative(par: &FitFrameParameters, phase: Phase) -> Vector3<f64> {
    let two_c = 2.0 * par.c();
    let (s, c) = (phase + par.phi0()).sin_cos();
    Vector3::new(c / two_c, s / two_c, par.tan_lambda() / two_c)
}

/// Position, parameter Jacobian and phase derivative of a helix at `phase`.
pub fn linearize(par: &FitFrameParameters, phase: Phase) -> HelixLinearization {
    let d = par.d();
    let p0 = par.phi0();
    let curv = par.c();
    let ct = par.tan_lambda();

    let (sp0, cp0) = p0.sin_cos();
    let (sp, cp) = (phase + p0).sin_cos();
    let two_c = 2.0 * curv;
    let two_c2 = 2.0 * curv * curv;

    let reference = reference_point(par);
    let position = Vector3::new(
        reference.x + (sp - sp0) / two_c,
        reference.y - (cp - cp0) / two_c,
        reference.z + ct * phase / two_c,
    );

    #[rustfmt::skip]
    let jacobian = HelixJacobian::new(
        // D     φ0                              C                          z0   tanλ
        -sp0,    -d * cp0 + (cp - cp0) / two_c,  -(sp - sp0) / two_c2,      0.0, 0.0,
         cp0,    -d * sp0 + (sp - sp0) / two_c,   (cp - cp0) / two_c2,      0.0, 0.0,
         0.0,     0.0,                           -ct * phase / two_c2,      1.0, phase / two_c,
    );

    HelixLinearization {
        position,
        jacobian,
        dx_dphase: Vector3::new(cp / two_c, sp / two_c, ct / two_c),
    }
}
