//! # Constants and type definitions for vtxfit
//!
//! This module centralizes the **unit conversion factors**, the **numerical controls**
//! of the vertex fit, and the **common type aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Conversion between detector units (millimeters) and the fitting frame (meters)
//! - Scale factors mapping detector helix parameters onto fitting-frame parameters
//! - Default iteration caps and stability thresholds of both fit stages
//! - Core type aliases and the [`Tracks`] container
//!
//! The numerical defaults below are the values exposed through
//! [`VertexFitParams::default`](crate::vertex_fit::VertexFitParams).

use crate::track::TrackHelix;
use smallvec::SmallVec;

// -------------------------------------------------------------------------------------------------
// Unit conversions
// -------------------------------------------------------------------------------------------------

/// Millimeters → meters
pub const MM_TO_M: f64 = 1e-3;

/// Meters → millimeters
pub const M_TO_MM: f64 = 1e3;

/// Scale applied to `d0` when entering the fitting frame (mm → m)
pub const D0_SCALE: f64 = MM_TO_M;

/// Scale applied to `phi0` (angles are unscaled)
pub const PHI0_SCALE: f64 = 1.0;

/// Scale applied to `omega`: half curvature in m⁻¹, with the fitting-frame sign flip
pub const OMEGA_SCALE: f64 = -0.5 * M_TO_MM;

/// Scale applied to `z0` (mm → m)
pub const Z0_SCALE: f64 = MM_TO_M;

/// Scale applied to `tan(lambda)` (slopes are unscaled)
pub const TAN_LAMBDA_SCALE: f64 = 1.0;

/// Per-parameter scale factors in helix parameter order `(d0, phi0, omega, z0, tanλ)`.
pub const HELIX_SCALES: [f64; 5] = [D0_SCALE, PHI0_SCALE, OMEGA_SCALE, Z0_SCALE, TAN_LAMBDA_SCALE];

// -------------------------------------------------------------------------------------------------
// Fit controls
// -------------------------------------------------------------------------------------------------

/// Iteration cap of the preliminary transverse loop
pub const PRELIM_MAX_ITER: usize = 10;

/// Stability required by the preliminary transverse loop
pub const PRELIM_EPS: f64 = 1e-4;

/// Iteration cap of the full least-squares fit
pub const FIT_MAX_ITER: usize = 100;

/// Stability required by the full least-squares fit
pub const FIT_EPS: f64 = 1e-9;

/// Transverse radius (m) above which the running vertex is reset to the origin
pub const MAX_SEED_RADIUS: Meter = 2.0;

/// Floor of the squared-radius argument of the initial phase estimate (m²)
pub const PHASE_ARG_FLOOR: f64 = 1e-6;

/// Stability value used before the first iteration of both loops
pub const INITIAL_STABILITY: f64 = 1000.0;

/// A preconditioned reduced determinant within a few ulps of zero marks a matrix
/// that is singular to working precision
pub const SINGULAR_DET_TOL: f64 = 16.0 * f64::EPSILON;

/// Singular values below this fraction of the largest one are dropped by the
/// pseudo-inverse fallback
pub const PINV_RCOND: f64 = 1e-12;

/// Iteration cap of the SVD behind the pseudo-inverse
pub const PINV_MAX_SWEEPS: usize = 1000;

/// Tag stored in [`VertexResult::algorithm_type`](crate::vertex_fit::vertex_result::VertexResult)
/// by the least-squares fitter
pub const ALGORITHM_TYPE: u32 = 1;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in radians
pub type Radian = f64;
/// Distance in millimeters (detector units)
pub type Millimeter = f64;
/// Distance in meters (fitting-frame units)
pub type Meter = f64;
/// Trajectory phase along a helix, in radians
pub type Phase = f64;

/// A small, inline-optimized container for the tracks of one vertex candidate.
pub type Tracks = SmallVec<[TrackHelix; 8]>;
