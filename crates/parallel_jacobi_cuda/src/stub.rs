//! Stand-in backend for builds without nvcc or a CUDA driver
//!
//! Mirrors the public surface of the real backend so dependents compile
//! unchanged; construction always fails with [`CudaError::NotAvailable`].

use parallel_jacobi_core::{Backend, DeviceSchedule, RoundDims};

use crate::error::{CudaError, Result};

pub struct CudaBackend {
    _private: (),
}

impl CudaBackend {
    pub fn new() -> Option<Self> {
        None
    }

    pub fn try_new() -> Result<Self> {
        Err(CudaError::NotAvailable)
    }

    pub fn device_name(&self) -> String {
        "CUDA stub".to_string()
    }
}

fn unavailable<T>() -> parallel_jacobi_core::Result<T> {
    Err(CudaError::NotAvailable.into())
}

impl Backend for CudaBackend {
    type Buffer = Vec<f64>;
    type IndexBuffer = Vec<u32>;

    fn name(&self) -> &'static str {
        "CUDA (stub)"
    }

    fn upload(&self, _data: &[f64]) -> parallel_jacobi_core::Result<Vec<f64>> {
        unavailable()
    }

    fn upload_indices(&self, _data: &[u32]) -> parallel_jacobi_core::Result<Vec<u32>> {
        unavailable()
    }

    fn alloc_zeros(&self, _len: usize) -> parallel_jacobi_core::Result<Vec<f64>> {
        unavailable()
    }

    fn download(&self, _buffer: &Vec<f64>) -> parallel_jacobi_core::Result<Vec<f64>> {
        unavailable()
    }

    fn buffer_len(&self, buffer: &Vec<f64>) -> usize {
        buffer.len()
    }

    fn transpose(
        &self,
        _input: &Vec<f64>,
        _rows: usize,
        _cols: usize,
        _output: &mut Vec<f64>,
    ) -> parallel_jacobi_core::Result<()> {
        unavailable()
    }

    fn matmul(
        &self,
        _a: &Vec<f64>,
        _b: &Vec<f64>,
        _c: &mut Vec<f64>,
        _m: usize,
        _k: usize,
        _n: usize,
    ) -> parallel_jacobi_core::Result<()> {
        unavailable()
    }

    fn compute_params(
        &self,
        _a: &Vec<f64>,
        _schedule: &DeviceSchedule<Self>,
        _dims: RoundDims,
        _sine: &mut Vec<f64>,
        _cosine: &mut Vec<f64>,
    ) -> parallel_jacobi_core::Result<()> {
        unavailable()
    }

    fn row_update(
        &self,
        _a: &Vec<f64>,
        _x: &mut Vec<f64>,
        _schedule: &DeviceSchedule<Self>,
        _dims: RoundDims,
        _sine: &Vec<f64>,
        _cosine: &Vec<f64>,
    ) -> parallel_jacobi_core::Result<()> {
        unavailable()
    }

    fn col_update(
        &self,
        _a: &mut Vec<f64>,
        _x: &Vec<f64>,
        _e: &mut Vec<f64>,
        _schedule: &DeviceSchedule<Self>,
        _dims: RoundDims,
        _sine: &Vec<f64>,
        _cosine: &Vec<f64>,
    ) -> parallel_jacobi_core::Result<()> {
        unavailable()
    }
}
