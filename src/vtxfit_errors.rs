use thiserror::Error;

#[derive(Error, Debug)]
pub enum VtxFitError {
    #[error("No track supplied to the vertex estimator")]
    EmptyTrackList,

    #[error("Vertex fit needs 2·Ntr − 3 > 0 degrees of freedom, got {ndof} for {n_tracks} track(s)")]
    InsufficientDegreesOfFreedom { n_tracks: usize, ndof: i64 },

    #[error("Regularized inverse expects a 2x2 or 3x3 matrix, found {found}x{found}")]
    WrongMatrixSize { found: usize },

    #[error("Cannot invert a non-square {rows}x{cols} matrix")]
    NonSquareMatrix { rows: usize, cols: usize },

    #[error("Invalid vertex fit parameter: {0}")]
    InvalidFitParameter(String),

    #[error("Fitted vertex position is not finite")]
    NonFiniteVertex,
}

impl PartialEq for VtxFitError {
    fn eq(&self, other: &Self) -> bool {
        use VtxFitError::*;
        match (self, other) {
            (
                InsufficientDegreesOfFreedom {
                    n_tracks: a,
                    ndof: b,
                },
                InsufficientDegreesOfFreedom {
                    n_tracks: c,
                    ndof: d,
                },
            ) => a == c && b == d,
            (WrongMatrixSize { found: a }, WrongMatrixSize { found: b }) => a == b,
            (NonSquareMatrix { rows: a, cols: b }, NonSquareMatrix { rows: c, cols: d }) => {
                a == c && b == d
            }
            (InvalidFitParameter(a), InvalidFitParameter(b)) => a == b,

            // Unit variants
            (EmptyTrackList, EmptyTrackList) => true,
            (NonFiniteVertex, NonFiniteVertex) => true,

            _ => false,
        }
    }
}
