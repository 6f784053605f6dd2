//! Error types for the Jacobi SVD pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JacobiError {
    /// Rejected before any kernel runs (bad shape, P < 2 for the scheduler, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dimension mismatch: expected {expected} elements, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Fatal backend failure (allocation, launch, transfer). The sweep state is
    /// discarded; there is no mid-round restart point.
    #[error("compute error: {0}")]
    Compute(String),
}

pub type Result<T> = std::result::Result<T, JacobiError>;
