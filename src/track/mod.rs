//! # Helix tracks
//!
//! A [`TrackHelix`] is a reconstructed charged-particle trajectory described by the five
//! perigee helix parameters and their covariance, in **detector units**:
//!
//! | parameter    | unit  | meaning                                            |
//! |--------------|-------|----------------------------------------------------|
//! | `d0`         | mm    | signed transverse impact parameter                 |
//! | `phi0`       | rad   | azimuth of the momentum at closest approach        |
//! | `omega`      | mm⁻¹  | signed curvature                                   |
//! | `z0`         | mm    | longitudinal impact parameter                      |
//! | `tan_lambda` | –     | slope of the helix in the longitudinal direction   |
//!
//! Tracks are owned by the caller and only read by the fitters. The conversion into
//! the fitting frame lives in [`fit_frame`].
//!
//! ## Covariance layout
//!
//! Event data models usually store the 5×5 covariance as 15 packed values, row-major
//! over the upper triangle: `(0,0) (0,1) … (0,4) (1,1) … (4,4)`.
//! [`TrackHelix::from_packed_covariance`] and [`TrackHelix::packed_covariance`] convert
//! between that layout and the full symmetric [`Matrix5`].

use nalgebra::{Matrix5, Vector5};
use serde::{Deserialize, Serialize};

use crate::constants::{Millimeter, Radian};

pub mod fit_frame;

/// Number of values in a packed symmetric 5×5 covariance.
pub const PACKED_COV_LEN: usize = 15;

/// Position of `(row, col)` in the packed upper-triangular layout.
#[inline]
pub fn packed_index(row: usize, col: usize) -> usize {
    let (i, j) = if row <= col { (row, col) } else { (col, row) };
    i * 5 - i * (i.saturating_sub(1)) / 2 + (j - i)
}

/// Reconstructed helix track in detector units.
///
/// Fields
/// -----------------
/// * `d0` – signed transverse impact parameter `[mm]`.
/// * `phi0` – azimuthal direction at closest approach `[rad]`.
/// * `omega` – signed curvature `[mm⁻¹]`.
/// * `z0` – longitudinal impact parameter `[mm]`.
/// * `tan_lambda` – longitudinal slope.
/// * `covariance` – full symmetric 5×5 covariance of `(d0, phi0, omega, z0, tan_lambda)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackHelix {
    pub d0: Millimeter,
    pub phi0: Radian,
    pub omega: f64,
    pub z0: Millimeter,
    pub tan_lambda: f64,
    pub covariance: Matrix5<f64>,
}

impl TrackHelix {
    pub fn new(
        d0: Millimeter,
        phi0: Radian,
        omega: f64,
        z0: Millimeter,
        tan_lambda: f64,
        covariance: Matrix5<f64>,
    ) -> Self {
        TrackHelix {
            d0,
            phi0,
            omega,
            z0,
            tan_lambda,
            covariance,
        }
    }

    /// Build a track from helix parameters and a packed upper-triangular covariance.
    ///
    /// Arguments
    /// -----------------
    /// * `params` – `[d0, phi0, omega, z0, tan_lambda]` in detector units.
    /// * `packed` – the 15 upper-triangular covariance terms, row-major.
    ///
    /// Return
    /// ----------
    /// * A [`TrackHelix`] whose covariance is the symmetric expansion of `packed`.
    pub fn from_packed_covariance(params: [f64; 5], packed: [f64; PACKED_COV_LEN]) -> Self {
        let covariance = Matrix5::from_fn(|i, j| packed[packed_index(i, j)]);
        TrackHelix::new(
            params[0], params[1], params[2], params[3], params[4], covariance,
        )
    }

    /// Helix parameters as a vector `(d0, phi0, omega, z0, tan_lambda)`.
    pub fn parameters(&self) -> Vector5<f64> {
        Vector5::new(self.d0, self.phi0, self.omega, self.z0, self.tan_lambda)
    }

    /// Upper triangle of the covariance in the packed row-major layout.
    pub fn packed_covariance(&self) -> [f64; PACKED_COV_LEN] {
        let mut packed = [0.0; PACKED_COV_LEN];
        for i in 0..5 {
            for j in i..5 {
                packed[packed_index(i, j)] = self.covariance[(i, j)];
            }
        }
        packed
    }

    /// Transverse impact-parameter significance `|d0| / σ(d0)`.
    pub fn d0_significance(&self) -> f64 {
        (self.d0 / self.covariance[(0, 0)].sqrt()).abs()
    }

    /// Longitudinal impact-parameter significance `|z0| / σ(z0)`.
    pub fn z0_significance(&self) -> f64 {
        (self.z0 / self.covariance[(3, 3)].sqrt()).abs()
    }
}

/// Number of tracks in a group.
pub fn count_tracks(tracks: &[TrackHelix]) -> usize {
    tracks.len()
}
