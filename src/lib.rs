//! # vtxfit
//!
//! Fit the common origin of charged-particle tracks described as helices.
//!
//! Tracks enter as [`TrackHelix`] values in detector units (millimeters), are mapped to
//! the fitting frame (meters, half curvature) by [`track::fit_frame`], seeded by a
//! geometric estimate and refined by an iterative linearized least-squares fit. The
//! [`VertexFit`] extension trait is the usual entry point:
//!
//! ```rust,no_run
//! use vtxfit::{TrackHelix, VertexFit, VertexFitParams};
//!
//! # fn demo(tracks: &[TrackHelix]) -> Result<(), vtxfit::VtxFitError> {
//! let vertex = tracks.fit_vertex(false, &VertexFitParams::default())?;
//! println!("{vertex}");
//! # Ok(())
//! # }
//! ```
pub mod constants;
pub mod helix;
pub mod linalg;
pub mod track;
pub mod vertex_fit;
pub mod vtxfit_errors;

pub use track::TrackHelix;
pub use vertex_fit::vertex_result::VertexResult;
pub use vertex_fit::{VertexFit, VertexFitParams};
pub use vtxfit_errors::VtxFitError;
