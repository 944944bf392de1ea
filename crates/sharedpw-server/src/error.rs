use thiserror::Error;

use crate::store::StoreError;

/// Errors produced by the record manager and the reveal protocol.
#[derive(Debug, Error)]
pub enum ShareError {
    /// Requested lifetime is outside (0, 72] hours.
    #[error("invalid expiration: {0} hours (must be 1-72)")]
    InvalidDuration(i64),

    #[error("could not generate identifier: {0}")]
    IdentifierGenerationFailed(#[from] rand::Error),

    /// Malformed lookup key. Raised before the store is touched.
    #[error("bad id")]
    InvalidIdentifier,

    /// No record, origin mismatch, or lost reveal race. Callers cannot tell
    /// these apart.
    #[error("not found")]
    NotFound,

    #[error("could not decode secret: {0}")]
    Decode(String),

    /// Passed through from the store gateway unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ShareError>;
