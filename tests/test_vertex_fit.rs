mod common;

use approx::assert_relative_eq;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vtxfit::constants::Tracks;
use vtxfit::track::count_tracks;
use vtxfit::{TrackHelix, VertexFit, VertexFitParams, VertexResult, VtxFitError};

use crate::common::{
    assert_covariance_close, assert_position_close, diagonal_covariance, fan_through,
    helix_through,
};

/// |C| = 0.001 mm⁻¹ in the fitting frame.
const OMEGA: f64 = 2e-3;
const VARIANCE: f64 = 1e-6;

fn vertex_point() -> Vector3<f64> {
    Vector3::new(3.0, -2.0, 1.0)
}

#[test]
fn test_two_intersecting_tracks() {
    let p = vertex_point();
    let base = p.y.atan2(p.x);
    let tracks = vec![
        helix_through(p, base + 0.3, OMEGA, 1.0, diagonal_covariance(VARIANCE)),
        helix_through(p, base - 0.2, -OMEGA, 1.0, diagonal_covariance(VARIANCE)),
    ];

    let res = tracks
        .fit_vertex(true, &VertexFitParams::default())
        .unwrap();

    assert_position_close(&res, &p, 1e-6);
    assert!(res.chi2.abs() < 1e-6, "chi2 = {}", res.chi2);
    assert_eq!(res.n_tracks, 2);
    assert_eq!(res.ndof, 1);
    assert_eq!(res.algorithm_type, 1);
    assert!(res.primary);
    assert!(res.diagnostics.converged);
    assert!(res.diagnostics.iterations <= 100);
    assert!(res.is_valid());

    let cov = res.covariance_matrix();
    assert!(cov.symmetric_eigenvalues().iter().all(|&l| l > 0.0));
}

/// Tracks from the origin: d0 = z0 = 0, so the fitted phases converge to 0 where
/// `A·C·Aᵀ` is singular along each track.
fn prompt_tracks() -> Vec<TrackHelix> {
    [(0.0, OMEGA, 1.0), (1.0, -OMEGA, 0.5), (2.5, 0.5 * OMEGA, -0.3)]
        .iter()
        .map(|&(phi0, omega, tan_lambda)| {
            TrackHelix::new(0.0, phi0, omega, 0.0, tan_lambda, diagonal_covariance(VARIANCE))
        })
        .collect()
}

#[test]
fn test_prompt_tracks() {
    let params = VertexFitParams::default();
    let tracks = prompt_tracks();

    let res = tracks.fit_vertex(true, &params).unwrap();
    assert_position_close(&res, &Vector3::zeros(), 1e-6);
    assert!(res.chi2.abs() < 1e-6, "chi2 = {}", res.chi2);
    assert!(res.diagnostics.converged);
    assert!(res.is_valid());

    let [xx, _, _, yy, _, zz] = res.covariance;
    assert_relative_eq!(xx, 6.963e-7, max_relative = 1e-3);
    assert_relative_eq!(yy, 4.710e-7, max_relative = 1e-3);
    assert_relative_eq!(zz, 5.136e-7, max_relative = 1e-3);

    // One more measurement can only shrink the errors
    let pair = tracks[..2].fit_vertex(true, &params).unwrap();
    assert_position_close(&pair, &Vector3::zeros(), 1e-6);
    for k in [0, 3, 5] {
        assert!(
            res.covariance[k] < pair.covariance[k],
            "covariance[{k}]: {} with three tracks, {} with two",
            res.covariance[k],
            pair.covariance[k]
        );
    }
}

#[test]
fn test_identical_prompt_pair() {
    // C = 0.001 mm⁻¹, tanλ = 1, both tracks identical
    let track = TrackHelix::new(0.0, 0.0, -OMEGA, 0.0, 1.0, diagonal_covariance(VARIANCE));
    let tracks = vec![track.clone(), track];

    let res = tracks
        .fit_vertex(true, &VertexFitParams::default())
        .unwrap();

    assert_position_close(&res, &Vector3::zeros(), 1e-9);
    assert!(res.chi2.abs() < 1e-9, "chi2 = {}", res.chi2);
    assert!(res.is_valid());
    assert_eq!(res.ndof, 1);

    // Half the single-track variance along y and x − z; nothing along the shared
    // direction (1, 0, 1), which two identical tracks cannot constrain.
    let cov = res.covariance_matrix();
    assert_relative_eq!(cov[(1, 1)], 5e-7, max_relative = 1e-6);
    let x_minus_z = Vector3::new(1.0, 0.0, -1.0);
    assert_relative_eq!(x_minus_z.dot(&(cov * x_minus_z)), 5e-7, max_relative = 1e-6);
    assert_covariance_close(
        &res.covariance,
        &[1.25e-7, 0.0, -1.25e-7, 5e-7, 0.0, 1.25e-7],
        1e-6,
    );
}

#[test]
fn test_fan_of_tracks_converges_to_common_point() {
    let p = Vector3::new(-1.5, 4.0, -7.0);
    let tracks = fan_through(p, 6, OMEGA, VARIANCE);

    let res = tracks
        .fit_vertex(false, &VertexFitParams::default())
        .unwrap();

    assert_position_close(&res, &p, 1e-6);
    assert!(res.chi2.abs() < 1e-6);
    assert_eq!(res.ndof, 9);
    assert!(res.diagnostics.converged);
}

#[test]
fn test_group_larger_than_inline_capacity() {
    let p = Vector3::new(0.5, -1.0, 2.0);
    let tracks = fan_through(p, 12, OMEGA, VARIANCE);

    let res = tracks
        .fit_vertex(false, &VertexFitParams::default())
        .unwrap();

    assert_position_close(&res, &p, 1e-6);
    assert!(res.chi2.abs() < 1e-6);
    assert_eq!(res.n_tracks, 12);
    assert_eq!(res.ndof, 21);
    assert!(res.diagnostics.converged);
}

#[test]
fn test_prelim_vertex_is_close_to_common_point() {
    let p = vertex_point();
    let tracks = fan_through(p, 4, OMEGA, VARIANCE);

    let seed = tracks.prelim_vertex(&VertexFitParams::default()).unwrap();
    assert_relative_eq!(seed, p, epsilon = 0.1);
}

#[test]
fn test_duplicated_tracks_halve_covariance() {
    let p = vertex_point();
    let tracks = fan_through(p, 3, OMEGA, VARIANCE);
    let doubled: Vec<TrackHelix> = tracks.iter().chain(tracks.iter()).cloned().collect();
    let params = VertexFitParams::default();

    let single = tracks.fit_vertex(false, &params).unwrap();
    let double = doubled.fit_vertex(false, &params).unwrap();

    assert_position_close(&double, &single.position, 1e-6);

    let halved = single.covariance.map(|c| 0.5 * c);
    assert_covariance_close(&double.covariance, &halved, 1e-6);
    assert_eq!(double.ndof, 2 * 6 - 3);
}

#[test]
fn test_refit_from_converged_vertex_is_stable() {
    let p = vertex_point();
    let tracks = fan_through(p, 4, OMEGA, VARIANCE);
    let params = VertexFitParams::default();

    let first = tracks.fit_vertex(false, &params).unwrap();
    let second = tracks
        .fit_vertex_from_seed(false, &first.position, &params)
        .unwrap();

    assert_position_close(&second, &first.position, 1e-6);
    assert_covariance_close(&second.covariance, &first.covariance, 1e-6);
}

#[test]
fn test_far_seed_restarts_from_origin() {
    let p = vertex_point();
    let tracks = fan_through(p, 3, OMEGA, VARIANCE);

    let res = tracks
        .fit_vertex_from_seed(
            false,
            &Vector3::new(5000.0, 0.0, 0.0),
            &VertexFitParams::default(),
        )
        .unwrap();

    assert_position_close(&res, &p, 1e-6);
    assert!(res.diagnostics.converged);
}

#[test]
fn test_smeared_tracks() {
    let p = Vector3::new(0.5, 0.8, 3.0);
    let mut rng = StdRng::seed_from_u64(42_u64);

    let sigma = VARIANCE.sqrt();
    let tracks: Tracks = fan_through(p, 5, OMEGA, VARIANCE)
        .into_iter()
        .map(|mut t| {
            t.d0 += sigma * rng.random_range(-2.0..2.0);
            t.z0 += sigma * rng.random_range(-2.0..2.0);
            t
        })
        .collect();

    let res = tracks
        .fit_vertex(false, &VertexFitParams::default())
        .unwrap();

    assert!(res.diagnostics.converged);
    assert!(res.is_valid());
    assert!(res.chi2 > 0.0 && res.chi2 < 20.0, "chi2 = {}", res.chi2);
    assert_position_close(&res, &p, 0.05);
    assert!(res.position_errors().iter().all(|&s| s > 0.0 && s < 0.05));
}

#[test]
fn test_iteration_cap_reported() {
    let tracks = fan_through(vertex_point(), 3, OMEGA, VARIANCE);
    let params = VertexFitParams::builder()
        .max_iter(1)
        .eps(1e-300)
        .build()
        .unwrap();

    let res = tracks.fit_vertex(false, &params).unwrap();
    assert_eq!(res.diagnostics.iterations, 1);
    assert!(!res.diagnostics.converged);
    assert!(res.is_valid());
}

#[test]
fn test_degenerate_groups() {
    let params = VertexFitParams::default();

    let empty: Tracks = Tracks::new();
    assert_eq!(count_tracks(&empty), 0);
    assert_eq!(empty.fit_vertex(true, &params).unwrap(), VertexResult::default());
    assert_eq!(empty.prelim_vertex(&params), Err(VtxFitError::EmptyTrackList));

    let one = fan_through(vertex_point(), 1, OMEGA, VARIANCE);
    assert_eq!(count_tracks(&one), 1);
    assert_eq!(
        one.fit_vertex(true, &params),
        Err(VtxFitError::InsufficientDegreesOfFreedom {
            n_tracks: 1,
            ndof: -1
        })
    );
    // the seed estimate still works for a single track
    assert!(one.prelim_vertex(&params).is_ok());
}

#[test]
fn test_result_serialization() {
    let tracks = fan_through(vertex_point(), 3, OMEGA, VARIANCE);
    let res = tracks
        .fit_vertex(true, &VertexFitParams::default())
        .unwrap();

    let json = serde_json::to_string(&res).unwrap();
    let back: VertexResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, res);
}
