//! # Vertex fitting
//!
//! This module estimates the common origin of a group of helix tracks in two stages:
//!
//! 1. **Preliminary estimate** ([`prelim`]) – a cheap geometric seed. Each track is
//!    replaced by a straight line in the transverse plane, the lines are intersected in
//!    a weighted least-squares sense (iterating on the vertex radius), and `z` is
//!    obtained from a single weighted average.
//!
//! 2. **Full fit** ([`fitter`]) – an iterative linearized least-squares fit that jointly
//!    estimates the vertex position, its covariance, one trajectory phase per track and
//!    the chi-square.
//!
//! Both stages are tuned by [`VertexFitParams`] and exposed on track collections by the
//! [`VertexFit`] extension trait.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vtxfit::track::TrackHelix;
//! use vtxfit::vertex_fit::{VertexFit, VertexFitParams};
//!
//! # fn demo(tracks: Vec<TrackHelix>) -> Result<(), vtxfit::vtxfit_errors::VtxFitError> {
//! let params = VertexFitParams::builder().max_iter(50).eps(1e-8).build()?;
//! let vertex = tracks.fit_vertex(true, &params)?;
//! if !vertex.diagnostics.converged {
//!     eprintln!("vertex fit stopped at the iteration cap:\n{vertex}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Every call owns its scratch state and the parameters are read-only, so independent
//! track groups can be fitted in parallel without synchronization.
use std::cmp::Ordering::Greater;
use std::fmt;

use nalgebra::Vector3;
use smallvec::SmallVec;
use tracing::debug;

use crate::constants::{
    Meter, Millimeter, FIT_EPS, FIT_MAX_ITER, MAX_SEED_RADIUS, MM_TO_M, M_TO_MM,
    PHASE_ARG_FLOOR, PRELIM_EPS, PRELIM_MAX_ITER,
};
use crate::track::fit_frame::FitFrameParameters;
use crate::track::TrackHelix;
use crate::vtxfit_errors::VtxFitError;

pub mod fitter;
pub mod prelim;
pub mod vertex_result;

use vertex_result::VertexResult;

/// Numerical controls of the preliminary estimator and the full fit.
///
/// Fields
/// -----------------
/// **Preliminary estimate**
/// * `prelim_max_iter` – iteration cap of the transverse loop.
/// * `prelim_eps` – the transverse loop stops once `Δxᵀ·H·Δx` falls below this value.
///
/// **Full fit**
/// * `max_iter` – iteration cap of the least-squares loop.
/// * `eps` – the loop stops once `Δxᵀ·Cov(x)⁻¹·Δx` falls below this value.
/// * `max_seed_radius` – transverse radius (m) beyond which the running vertex is reset
///   to the origin at the start of an iteration.
/// * `phase_arg_floor` – floor (m²) of the squared-radius argument of the initial
///   arcsine phase estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexFitParams {
    pub prelim_max_iter: usize,
    pub prelim_eps: f64,

    pub max_iter: usize,
    pub eps: f64,
    pub max_seed_radius: Meter,
    pub phase_arg_floor: f64,
}

impl VertexFitParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> VertexFitParamsBuilder {
        VertexFitParamsBuilder::new()
    }
}

impl Default for VertexFitParams {
    fn default() -> Self {
        VertexFitParams {
            prelim_max_iter: PRELIM_MAX_ITER,
            prelim_eps: PRELIM_EPS,
            max_iter: FIT_MAX_ITER,
            eps: FIT_EPS,
            max_seed_radius: MAX_SEED_RADIUS,
            phase_arg_floor: PHASE_ARG_FLOOR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VertexFitParamsBuilder {
    params: VertexFitParams,
}

impl Default for VertexFitParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VertexFitParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: VertexFitParams::default(),
        }
    }

    pub fn prelim_max_iter(mut self, v: usize) -> Self {
        self.params.prelim_max_iter = v;
        self
    }
    pub fn prelim_eps(mut self, v: f64) -> Self {
        self.params.prelim_eps = v;
        self
    }
    pub fn max_iter(mut self, v: usize) -> Self {
        self.params.max_iter = v;
        self
    }
    pub fn eps(mut self, v: f64) -> Self {
        self.params.eps = v;
        self
    }
    pub fn max_seed_radius(mut self, v: Meter) -> Self {
        self.params.max_seed_radius = v;
        self
    }
    pub fn phase_arg_floor(mut self, v: f64) -> Self {
        self.params.phase_arg_floor = v;
        self
    }

    // NaN compares as not greater, so it is rejected with the non-positive values.
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    pub fn build(self) -> Result<VertexFitParams, VtxFitError> {
        let p = &self.params;

        if p.prelim_max_iter == 0 || p.max_iter == 0 {
            return Err(VtxFitError::InvalidFitParameter(
                "iteration caps must be >= 1".into(),
            ));
        }
        if !Self::gt0(p.prelim_eps) || !Self::gt0(p.eps) {
            return Err(VtxFitError::InvalidFitParameter(
                "stability thresholds must be > 0".into(),
            ));
        }
        if !Self::gt0(p.max_seed_radius) {
            return Err(VtxFitError::InvalidFitParameter(
                "max_seed_radius must be > 0".into(),
            ));
        }
        if !Self::gt0(p.phase_arg_floor) {
            return Err(VtxFitError::InvalidFitParameter(
                "phase_arg_floor must be > 0".into(),
            ));
        }

        Ok(self.params)
    }
}

impl fmt::Display for VertexFitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 40;
            writeln!(f, "Vertex Fit Parameters")?;
            writeln!(f, "---------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Preliminary estimate]")?;
            line!(
                "prelim_max_iter = {}",
                self.prelim_max_iter,
                "Transverse loop iteration cap"
            )?;
            line!(
                "prelim_eps      = {:.1e}",
                self.prelim_eps,
                "Transverse loop stability"
            )?;

            writeln!(f, "\n[Least-squares fit]")?;
            line!("max_iter        = {}", self.max_iter, "Iteration cap")?;
            line!("eps             = {:.1e}", self.eps, "Vertex stability")?;
            line!(
                "max_seed_radius = {:.3} m",
                self.max_seed_radius,
                "Reset to origin beyond this radius"
            )?;
            line!(
                "phase_arg_floor = {:.1e} m²",
                self.phase_arg_floor,
                "Floor of the initial phase argument"
            )
        } else {
            write!(
                f,
                "VertexFitParams(prelim: {} it / {:.1e}, fit: {} it / {:.1e}, r_max={} m)",
                self.prelim_max_iter, self.prelim_eps, self.max_iter, self.eps, self.max_seed_radius
            )
        }
    }
}

/// Vertex fitting on a group of tracks believed to share one origin.
///
/// Implemented for `[TrackHelix]`, hence usable on slices, `Vec<TrackHelix>` and
/// [`Tracks`](crate::constants::Tracks).
pub trait VertexFit {
    /// Fast geometric vertex estimate `[mm]`.
    ///
    /// Errors
    /// ----------
    /// * [`VtxFitError::EmptyTrackList`] if there is no track.
    ///
    /// See also
    /// ------------
    /// * [`prelim::prelim_vertex`]
    fn prelim_vertex(&self, params: &VertexFitParams) -> Result<Vector3<Millimeter>, VtxFitError>;

    /// Full least-squares vertex fit, seeded by [`VertexFit::prelim_vertex`].
    ///
    /// Arguments
    /// -----------------
    /// * `primary` – caller-provided primary-vertex flag, stored verbatim in the result.
    /// * `params` – numerical controls.
    ///
    /// Return
    /// ----------
    /// * [`VertexResult::default`] (algorithm type 0) when the group is empty,
    /// * the fitted vertex otherwise.
    ///
    /// Errors
    /// ----------
    /// * [`VtxFitError::InsufficientDegreesOfFreedom`] for a single track.
    /// * [`VtxFitError::NonFiniteVertex`] if the solution is not finite.
    fn fit_vertex(&self, primary: bool, params: &VertexFitParams)
        -> Result<VertexResult, VtxFitError>;

    /// Same as [`VertexFit::fit_vertex`] with an explicit seed `[mm]` instead of the
    /// preliminary estimate.
    fn fit_vertex_from_seed(
        &self,
        primary: bool,
        seed: &Vector3<Millimeter>,
        params: &VertexFitParams,
    ) -> Result<VertexResult, VtxFitError>;
}

impl VertexFit for [TrackHelix] {
    fn prelim_vertex(&self, params: &VertexFitParams) -> Result<Vector3<Millimeter>, VtxFitError> {
        prelim::prelim_vertex(self, params)
    }

    fn fit_vertex(
        &self,
        primary: bool,
        params: &VertexFitParams,
    ) -> Result<VertexResult, VtxFitError> {
        fit_group(self, primary, None, params)
    }

    fn fit_vertex_from_seed(
        &self,
        primary: bool,
        seed: &Vector3<Millimeter>,
        params: &VertexFitParams,
    ) -> Result<VertexResult, VtxFitError> {
        fit_group(self, primary, Some(seed * MM_TO_M), params)
    }
}

/// Shared driver of [`VertexFit::fit_vertex`] and [`VertexFit::fit_vertex_from_seed`].
fn fit_group(
    tracks: &[TrackHelix],
    primary: bool,
    seed: Option<Vector3<Meter>>,
    params: &VertexFitParams,
) -> Result<VertexResult, VtxFitError> {
    let n_tracks = tracks.len();
    if n_tracks == 0 {
        return Ok(VertexResult::default());
    }

    let ndof = 2 * n_tracks as i64 - 3;
    if ndof <= 0 {
        return Err(VtxFitError::InsufficientDegreesOfFreedom { n_tracks, ndof });
    }

    let pars: SmallVec<[FitFrameParameters; 8]> =
        tracks.iter().map(FitFrameParameters::from).collect();
    let seed = match seed {
        Some(seed) => seed,
        None => {
            let prelim = prelim::prelim_vertex_fit_frame(&pars, params)?;
            debug!(
                iterations = prelim.iterations,
                stability = prelim.stability,
                "preliminary vertex seed"
            );
            prelim.position
        }
    };

    let outcome = fitter::fit_from_seed(&pars, seed, params);
    if !outcome.estimate.position.iter().all(|v| v.is_finite()) {
        return Err(VtxFitError::NonFiniteVertex);
    }

    Ok(VertexResult::from_fit(&outcome, primary, n_tracks, ndof as usize))
}

/// Convert a fitting-frame position to detector units.
#[inline]
pub(crate) fn to_millimeter(x: &Vector3<Meter>) -> Vector3<Millimeter> {
    x * M_TO_MM
}
