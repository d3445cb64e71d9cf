//! # Fitting-frame helix parameters
//!
//! The vertex fitters work in meters, with the curvature expressed as the signed
//! **half curvature** `C = −ω/2` (in m⁻¹). [`FitFrameParameters::from_track`] applies the
//! per-parameter scale factors of [`HELIX_SCALES`] and propagates the covariance with
//! the bilinear rule `Cov'ᵢⱼ = Covᵢⱼ · sᵢ · sⱼ`; [`FitFrameParameters::to_track_helix`]
//! undoes both.

use nalgebra::{Matrix5, Vector5};

use crate::constants::{Meter, Radian, HELIX_SCALES};
use crate::track::TrackHelix;

/// Helix parameters and covariance of one track in fitting-frame units.
///
/// Parameter order is `(D, φ0, C, z0, tanλ)` with `D`, `z0` in meters and `C` the
/// signed half curvature in m⁻¹.
#[derive(Debug, Clone, PartialEq)]
pub struct FitFrameParameters {
    pub params: Vector5<f64>,
    pub covariance: Matrix5<f64>,
}

/// Scale a symmetric 5×5 matrix by `sᵢ·sⱼ`, computing the upper triangle and mirroring it.
fn scale_covariance(cov: &Matrix5<f64>, scale: impl Fn(usize) -> f64) -> Matrix5<f64> {
    let mut out = Matrix5::zeros();
    for i in 0..5 {
        for j in i..5 {
            let v = cov[(i, j)] * scale(i) * scale(j);
            out[(i, j)] = v;
            out[(j, i)] = v;
        }
    }
    out
}

impl FitFrameParameters {
    /// Map a detector-unit track into the fitting frame.
    pub fn from_track(track: &TrackHelix) -> Self {
        let params = track
            .parameters()
            .zip_map(&Vector5::from(HELIX_SCALES), |p, s| p * s);
        let covariance = scale_covariance(&track.covariance, |i| HELIX_SCALES[i]);
        FitFrameParameters { params, covariance }
    }

    /// Map back to detector units; exact inverse of [`FitFrameParameters::from_track`]
    /// up to floating-point rounding.
    pub fn to_track_helix(&self) -> TrackHelix {
        let p = self
            .params
            .zip_map(&Vector5::from(HELIX_SCALES), |p, s| p / s);
        let covariance = scale_covariance(&self.covariance, |i| 1.0 / HELIX_SCALES[i]);
        TrackHelix::new(p[0], p[1], p[2], p[3], p[4], covariance)
    }

    /// Signed transverse impact parameter `[m]`.
    #[inline]
    pub fn d(&self) -> Meter {
        self.params[0]
    }

    #[inline]
    pub fn phi0(&self) -> Radian {
        self.params[1]
    }

    /// Signed half curvature `[m⁻¹]`.
    #[inline]
    pub fn c(&self) -> f64 {
        self.params[2]
    }

    #[inline]
    pub fn z0(&self) -> Meter {
        self.params[3]
    }

    #[inline]
    pub fn tan_lambda(&self) -> f64 {
        self.params[4]
    }
}

impl From<&TrackHelix> for FitFrameParameters {
    fn from(track: &TrackHelix) -> Self {
        FitFrameParameters::from_track(track)
    }
}
