use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VecError {
    #[error("vecstore: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("vecstore: empty vector")]
    Empty,

    #[error("vecstore: vector has zero norm")]
    ZeroNorm,

    #[error("vecstore: vector contains non-finite values")]
    NonFinite,
}
