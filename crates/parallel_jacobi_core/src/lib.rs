//! Parallel Jacobi Core Library
//!
//! One-sided SVD through the symmetric eigenproblem of DᵀD, solved with the
//! parallel cyclic Jacobi method.
//!
//! # Overview
//!
//! A sweep visits every unordered index pair exactly once. Pairs are grouped
//! into rounds of disjoint pairs (the chess tournament ordering), so every
//! rotation in a round can run concurrently. Each round runs three kernels:
//! rotation parameters, the row phase into a scratch matrix, and the column
//! phase that also accumulates eigenvectors.
//!
//! # Key Components
//!
//! - [`schedule`] - Round-robin pair schedule
//! - [`rotation`] - Jacobi rotation parameters
//! - [`backend`] - Backend trait for CPU/GPU dispatch
//! - [`sweep`] - Sweep controller and convergence stats
//! - [`svd`] - Σ, U and Vᵀ assembly
//! - [`reference`] - Serial eigensolver used as an oracle

pub mod backend;
mod cpu;
pub mod error;
pub mod matrix;
pub mod reference;
pub mod rotation;
pub mod schedule;
pub mod svd;
pub mod sweep;

pub use backend::{
    Backend, CpuBackend, DeviceSchedule, RoundDims, MAX_BLOCK_SIZE, MULTIPLY_TILE, TRANSPOSE_TILE,
};
pub use error::{JacobiError, Result};
pub use matrix::{random_matrix, Matrix};
pub use reference::serial_jacobi_eigenvalues;
pub use rotation::{RotationParams, EPSILON};
pub use schedule::{PairSchedule, NO_BYE};
pub use svd::{argsort_desc, decompose, decompose_with_config, JacobiSvd, SvdAssembler, SvdResult};
pub use sweep::{SweepConfig, SweepController, SweepState, SweepStats, MAX_SWEEPS};

/// Timing breakdown for one decomposition, in seconds
#[derive(Debug, Clone, Default)]
pub struct Timings {
    pub total_time: f64,
    /// Upload, transpose and the DᵀD product
    pub setup_time: f64,
    pub sweep_time: f64,
    pub assemble_time: f64,
}
