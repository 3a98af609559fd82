use serde::{Deserialize, Serialize};
use thiserror::Error;

use rollcall_roster::StoreError;
use rollcall_vecstore::VecError;

/// Error kinds visible at the API boundary.
///
/// Serialized by name, e.g. `"NoRosterForSession"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ImageDecodeError,
    NoRosterForSession,
    DimensionMismatch,
    FaceDetectionError,
    PersistenceError,
    TimeoutError,
    BrokerError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ImageDecodeError => "ImageDecodeError",
            ErrorKind::NoRosterForSession => "NoRosterForSession",
            ErrorKind::DimensionMismatch => "DimensionMismatch",
            ErrorKind::FaceDetectionError => "FaceDetectionError",
            ErrorKind::PersistenceError => "PersistenceError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::BrokerError => "BrokerError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("attendance: failed to decode image: {0}")]
    ImageDecode(String),

    #[error("attendance: no roster for session {namespace}")]
    NoRoster { namespace: String },

    #[error("attendance: dimension mismatch: face has {got}, roster has {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("attendance: face model: {0}")]
    FaceModel(String),

    #[error("attendance: unusable face embedding: {0}")]
    DegenerateFace(VecError),

    #[error("attendance: failed to record {identity}: {source}")]
    Persistence {
        identity: String,
        #[source]
        source: StoreError,
    },

    #[error("attendance: invalid threshold {0}: must be finite and non-negative")]
    InvalidThreshold(f32),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ImageDecode(_) => ErrorKind::ImageDecodeError,
            PipelineError::NoRoster { .. } => ErrorKind::NoRosterForSession,
            PipelineError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            PipelineError::FaceModel(_) | PipelineError::DegenerateFace(_) => {
                ErrorKind::FaceDetectionError
            }
            PipelineError::Persistence { .. } => ErrorKind::PersistenceError,
            PipelineError::InvalidThreshold(_) => ErrorKind::InternalError,
        }
    }
}

impl From<VecError> for PipelineError {
    fn from(e: VecError) -> Self {
        match e {
            VecError::DimensionMismatch { got, want } => {
                PipelineError::DimensionMismatch { got, want }
            }
            other => PipelineError::DegenerateFace(other),
        }
    }
}
