//! # Iterative least-squares vertex fit
//!
//! Each track is linearized around its current phase `φᵢ`: the vertex is assumed to
//! lie at `x0ᵢ + aᵢ·δφ` where `x0ᵢ` is the helix point at `φᵢ` and `aᵢ = ∂x/∂φ`.
//! Eliminating `δφ` from the weighted residual leaves, per track, the weight with
//! the along-track direction projected out:
//!
//! ```text
//! W⁻¹ᵢ = Aᵢ·Cᵢ·Aᵢᵀ            positional covariance of the helix point
//! Dᵢ   = Wᵢ − (Wᵢ·aᵢ)(Wᵢ·aᵢ)ᵀ / (aᵢᵀ·Wᵢ·aᵢ)
//!      = Nᵢ·(Nᵢᵀ·W⁻¹ᵢ·Nᵢ)⁻¹·Nᵢᵀ
//! ```
//!
//! where the columns of `Nᵢ` span the plane orthogonal to `aᵢ`. The second form is
//! the one evaluated: it never inverts `W⁻¹ᵢ`, which becomes singular along `aᵢ`
//! when the linearization point reaches the reference point of a prompt track.
//!
//! The vertex solves `(Σ Dᵢ)·x = Σ Dᵢ·x0ᵢ`. Its covariance is the sandwich
//! `H⁻¹·(Σ Dᵢ·W⁻¹ᵢ·Dᵢ)·H⁻¹`. Phases are then moved to the points of closest approach
//! with a first-order correction and the whole linearization is repeated until the
//! vertex step is small compared with its own uncertainty.
use nalgebra::{Matrix3, SMatrix, Vector3};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::constants::{Meter, Phase, INITIAL_STABILITY};
use crate::helix::linearize;
use crate::linalg::{quadratic_form, reg_inv2, reg_inv3, similarity, symmetrize};
use crate::track::fit_frame::FitFrameParameters;

use super::vertex_result::FitDiagnostics;
use super::VertexFitParams;

/// Orthonormal basis of the plane orthogonal to `a`, as the columns of a 3×2 matrix.
fn orthogonal_basis(a: &Vector3<f64>) -> SMatrix<f64, 3, 2> {
    let u = a.normalize();
    let helper = Vector3::ith(u.iamin(), 1.0);
    let n1 = u.cross(&helper).normalize();
    let n2 = u.cross(&n1);
    SMatrix::<f64, 3, 2>::from_columns(&[n1, n2])
}

/// Per-track scratch state of one fit call, overwritten at every iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFitState {
    /// Current linearization phase.
    pub phase: Phase,
    /// Helix point at `phase`.
    pub expansion_point: Vector3<Meter>,
    /// `∂x/∂φ` at `phase`.
    pub dx_dphase: Vector3<f64>,
    /// `W⁻¹ = A·C·Aᵀ`
    pub weight_inv: Matrix3<f64>,
    /// Weight with the along-track direction projected out.
    pub d_matrix: Matrix3<f64>,
    /// `g` such that the phase correction for a vertex `x` is `gᵀ·(x − x0)`.
    pub phase_gain: Vector3<f64>,
}

impl TrackFitState {
    pub fn new(phase: Phase) -> Self {
        TrackFitState {
            phase,
            expansion_point: Vector3::zeros(),
            dx_dphase: Vector3::zeros(),
            weight_inv: Matrix3::zeros(),
            d_matrix: Matrix3::zeros(),
            phase_gain: Vector3::zeros(),
        }
    }

    /// Linearize `par` at the current phase and refresh every derived quantity.
    ///
    /// `g = (I − D·W⁻¹)·a / |a|²` equals `W·a / (aᵀ·W·a)` whenever `W⁻¹` is regular
    /// and stays finite when it is not.
    pub fn relinearize(&mut self, par: &FitFrameParameters) {
        let lin = linearize(par, self.phase);
        let weight_inv = symmetrize(&similarity(&lin.jacobian, &par.covariance));
        let basis = orthogonal_basis(&lin.dx_dphase);
        let transverse_cov = symmetrize(&similarity(&basis.transpose(), &weight_inv));
        let d_matrix = symmetrize(&similarity(&basis, &reg_inv2(&transverse_cov)));
        let a = lin.dx_dphase;

        self.expansion_point = lin.position;
        self.dx_dphase = a;
        self.weight_inv = weight_inv;
        self.d_matrix = d_matrix;
        self.phase_gain = (a - d_matrix * (weight_inv * a)) / a.norm_squared();
    }

    /// Contribution `λᵀ·W⁻¹·λ` of this track to the chi-square at vertex `x`,
    /// with `λ = D·(x0 − x)`.
    pub fn chi2(&self, x: &Vector3<Meter>) -> f64 {
        let lambda = self.d_matrix * (self.expansion_point - x);
        quadratic_form(&self.weight_inv, &lambda)
    }

    /// First-order phase correction towards the point of closest approach to `x`.
    pub fn phase_step(&self, x: &Vector3<Meter>) -> Phase {
        self.phase_gain.dot(&(x - self.expansion_point))
    }
}

/// Vertex estimate in fitting-frame units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexEstimate {
    pub position: Vector3<Meter>,
    /// Position covariance `[m²]`.
    pub covariance: Matrix3<f64>,
    /// Chi-square, not normalized.
    pub chi2: f64,
}

/// Outcome of [`fit_from_seed`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub estimate: VertexEstimate,
    pub phases: SmallVec<[Phase; 8]>,
    pub diagnostics: FitDiagnostics,
}

/// Initial phase of a track for a vertex at transverse radius `radius`.
///
/// `2·asin(C·√((R² − D²)/(1 + 2·C·D)))`, where the square-root argument is floored at
/// `floor` and the arcsine argument clamped to `[−1, 1]`.
pub fn initial_phase(par: &FitFrameParameters, radius: Meter, floor: f64) -> Phase {
    let (d, c) = (par.d(), par.c());
    let arg = ((radius * radius - d * d) / (1.0 + 2.0 * c * d)).max(floor);
    2.0 * (c * arg.sqrt()).clamp(-1.0, 1.0).asin()
}

/// A step is converged when its stability is a finite, non-negative value below
/// `eps` and the covariance it was measured with is finite. A negative stability
/// comes from a covariance that is not positive definite.
fn is_converged(stability: f64, covariance: &Matrix3<f64>, eps: f64) -> bool {
    (0.0..=eps).contains(&stability) && covariance.iter().all(|v| v.is_finite())
}

/// Run the least-squares fit from `seed` (meters).
///
/// Arguments
/// -----------------
/// * `pars` – the tracks in fitting-frame units.
/// * `seed` – starting vertex position `[m]`.
/// * `params` – uses `max_iter`, `eps`, `max_seed_radius` and `phase_arg_floor`.
///
/// Return
/// ----------
/// * The last estimate reached, with the final phases and the convergence diagnostics.
///   Reaching `max_iter` is reported through [`FitDiagnostics::converged`], not as an error.
pub fn fit_from_seed(
    pars: &[FitFrameParameters],
    seed: Vector3<Meter>,
    params: &VertexFitParams,
) -> FitOutcome {
    let mut states: SmallVec<[TrackFitState; 8]> =
        pars.iter().map(|_| TrackFitState::new(0.0)).collect();

    let mut x0 = seed;
    let mut x = seed;
    let mut cov_x = Matrix3::<f64>::zeros();
    let mut chi2 = 0.0;
    let mut stability = INITIAL_STABILITY;
    let mut iterations = 0;

    while stability > params.eps && iterations < params.max_iter {
        if x0.xy().norm() > params.max_seed_radius {
            warn!(
                iteration = iterations,
                radius = x0.xy().norm(),
                "vertex estimate beyond the seed radius bound, restarting from the origin"
            );
            x0 = Vector3::zeros();
        }
        let radius = x0.xy().norm();

        let mut h = Matrix3::<f64>::zeros();
        let mut cterm = Vector3::<f64>::zeros();
        let mut dw1d = Matrix3::<f64>::zeros();

        for (par, state) in pars.iter().zip(states.iter_mut()) {
            if iterations == 0 {
                state.phase = initial_phase(par, radius, params.phase_arg_floor);
            }
            state.relinearize(par);

            h += state.d_matrix;
            cterm += state.d_matrix * state.expansion_point;
            dw1d += similarity(&state.d_matrix, &state.weight_inv);
        }

        let h_inv = reg_inv3(&h);
        x = h_inv * cterm;
        cov_x = symmetrize(&similarity(&h_inv, &dw1d));

        chi2 = 0.0;
        for (i, state) in states.iter_mut().enumerate() {
            chi2 += state.chi2(&x);
            let step = state.phase_step(&x);
            state.phase += step;
            trace!(track = i, phase = state.phase, step, "phase update");
        }

        let dx = x - x0;
        x0 = x;
        stability = quadratic_form(&reg_inv3(&cov_x), &dx);
        iterations += 1;

        debug!(
            iteration = iterations,
            stability,
            chi2,
            x = x.x,
            y = x.y,
            z = x.z,
            "vertex fit step"
        );
    }

    let converged = is_converged(stability, &cov_x, params.eps);
    if !converged {
        if stability > params.eps {
            warn!(
                iterations,
                stability,
                eps = params.eps,
                "vertex fit stopped at the iteration cap"
            );
        } else {
            warn!(
                iterations,
                stability,
                "vertex covariance is not finite and positive definite, fit reported as not converged"
            );
        }
    }

    FitOutcome {
        estimate: VertexEstimate {
            position: x,
            covariance: cov_x,
            chi2,
        },
        phases: states.iter().map(|s| s.phase).collect(),
        diagnostics: FitDiagnostics {
            iterations,
            stability,
            converged,
        },
    }
}
