#![allow(dead_code)]

use std::f64::consts::PI;

use approx::assert_relative_eq;
use nalgebra::{Matrix5, Vector3, Vector5};
use vtxfit::track::fit_frame::FitFrameParameters;
use vtxfit::{TrackHelix, VertexResult};

/// Wrap an angle into `(-π, π]`.
fn wrap(angle: f64) -> f64 {
    let a = angle.rem_euclid(2.0 * PI);
    if a > PI {
        a - 2.0 * PI
    } else {
        a
    }
}

/// Helix passing exactly through `point` (mm), moving along azimuth `psi` there.
///
/// `omega` is the signed detector curvature (mm⁻¹) and `covariance` the native
/// 5×5 covariance attached to the track.
pub fn helix_through(
    point: Vector3<f64>,
    psi: f64,
    omega: f64,
    tan_lambda: f64,
    covariance: Matrix5<f64>,
) -> TrackHelix {
    // Geometry in the fitting frame: meters and half curvature C.
    let p = point * 1e-3;
    let c = -0.5e3 * omega;
    let inv_2c = 1.0 / (2.0 * c);

    let centre = p.xy() - nalgebra::Vector2::new(psi.sin(), -psi.cos()) * inv_2c;
    let s = c.signum();
    let u = centre.normalize() * s;

    let phi0 = (-u.x).atan2(u.y);
    let d = s * centre.norm() - inv_2c;
    let phase = wrap(psi - phi0);
    assert!(
        phase * s > 0.0,
        "test geometry must put the point downstream of the reference point"
    );
    let z0 = p.z - tan_lambda * phase * inv_2c;

    let mut track = FitFrameParameters {
        params: Vector5::new(d, phi0, c, z0, tan_lambda),
        covariance: Matrix5::zeros(),
    }
    .to_track_helix();
    track.covariance = covariance;
    track
}

/// Diagonal native covariance with the same variance on every parameter.
pub fn diagonal_covariance(variance: f64) -> Matrix5<f64> {
    Matrix5::identity() * variance
}

/// Tracks through `point` fanning out around its azimuth with alternating charges.
pub fn fan_through(point: Vector3<f64>, n: usize, omega: f64, variance: f64) -> Vec<TrackHelix> {
    let base = point.y.atan2(point.x);
    (0..n)
        .map(|i| {
            let spread = 0.25 * (i as f64 - 0.5 * (n as f64 - 1.0)) + 0.1;
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            let tan_lambda = 0.4 + 0.3 * i as f64;
            helix_through(
                point,
                base + spread,
                sign * omega,
                tan_lambda,
                diagonal_covariance(variance),
            )
        })
        .collect()
}

pub fn assert_position_close(res: &VertexResult, expected: &Vector3<f64>, epsilon: f64) {
    assert_relative_eq!(res.position.x, expected.x, epsilon = epsilon);
    assert_relative_eq!(res.position.y, expected.y, epsilon = epsilon);
    assert_relative_eq!(res.position.z, expected.z, epsilon = epsilon);
}

/// Compare packed covariances entry by entry, relative to `√(σᵢᵢ·σⱼⱼ)` of `expected`.
pub fn assert_covariance_close(actual: &[f64; 6], expected: &[f64; 6], tol: f64) {
    const INDEX: [(usize, usize); 6] = [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)];
    let diag = [expected[0], expected[3], expected[5]];
    for (k, (i, j)) in INDEX.iter().enumerate() {
        let scale = (diag[*i] * diag[*j]).sqrt();
        assert!(
            (actual[k] - expected[k]).abs() <= tol * scale,
            "covariance ({i},{j}): {} vs {}",
            actual[k],
            expected[k]
        );
    }
}
