//! Error types for CUDA backend

use parallel_jacobi_core::JacobiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CudaError {
    #[error("CUDA driver error: {0}")]
    Driver(#[from] cudarc::driver::DriverError),

    #[error("CUDA not available on this system")]
    NotAvailable,

    #[error("Failed to load PTX kernel: {0}")]
    PtxLoad(String),

    #[error("Failed to get kernel function: {0}")]
    KernelNotFound(String),

    #[error("Kernel launch failed: {0}")]
    LaunchFailed(String),

    #[error("Launch geometry too large: {what} = {value}")]
    LaunchTooLarge { what: &'static str, value: usize },

    #[error("Buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, CudaError>;

impl From<CudaError> for JacobiError {
    fn from(err: CudaError) -> Self {
        match err {
            CudaError::BufferSizeMismatch { expected, actual } => {
                JacobiError::DimensionMismatch { expected, actual }
            }
            other => JacobiError::Compute(other.to_string()),
        }
    }
}
