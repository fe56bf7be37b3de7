use thiserror::Error;

use crate::store::StoreError;

/// Input rejected before any mutation took place.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("faceid: {field} has {got} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("faceid: descriptor {index} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("faceid: descriptor {index} contains a non-finite value")]
    NonFinite { index: usize },

    #[error("faceid: observation {index} has an empty photo id")]
    EmptyPhotoId { index: usize },

    #[error("faceid: identity {id} holds {expected}-dim samples, got {got}")]
    SampleDimension {
        id: String,
        expected: usize,
        got: usize,
    },

    #[error("faceid: cannot merge identity {id} into itself")]
    SelfMerge { id: String },

    #[error("faceid: invalid config: {0}")]
    InvalidConfig(String),
}

/// Errors returned by [`Resolver`](crate::Resolver) operations.
#[derive(Debug, Error)]
pub enum FaceIdError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("faceid: identity not found: {id}")]
    NotFound { id: String },

    #[error("faceid: persistence error: {0}")]
    Persistence(String),

    #[error("faceid: internal error: {0}")]
    Internal(String),

    #[error("faceid: timed out after {waited_ms}ms waiting for the resolver lock")]
    LockTimeout { waited_ms: u64 },
}

impl FaceIdError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for FaceIdError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound { id },
            StoreError::Validation(v) => Self::Validation(v),
            other => Self::Internal(other.to_string()),
        }
    }
}
