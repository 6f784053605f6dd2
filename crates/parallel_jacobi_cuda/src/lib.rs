//! CUDA GPU Backend for Parallel Jacobi
//!
//! Implements the core [`Backend`](parallel_jacobi_core::Backend) trait with
//! CUDA kernels compiled to PTX at build time.
//!
//! # Kernels
//! - Tiled transpose (32×32 shared tiles)
//! - Tiled matrix multiply (16×16 shared tiles)
//! - Rotation parameters, one thread per pair
//! - Row and column rotation phases, one block per pair
//!
//! With the `stub` feature the crate builds without nvcc; `CudaBackend` keeps
//! the same API but is never available.
//!
//! # Requirements
//! - NVIDIA GPU with double-precision support
//! - CUDA toolkit installed (nvcc)

#[cfg(not(feature = "stub"))]
mod cuda_backend;
mod error;
#[cfg(feature = "stub")]
mod stub;

#[cfg(not(feature = "stub"))]
pub use cuda_backend::CudaBackend;
#[cfg(feature = "stub")]
pub use stub::CudaBackend;
pub use error::{CudaError, Result};
