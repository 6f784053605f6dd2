//! Scaling benchmarks
//!
//! Runs the full decomposition across a range of sizes.

use crate::{dispatch, BackendChoice, BackendTask};
use log::info;
use parallel_jacobi_core::{
    decompose_with_config, random_matrix, Backend, JacobiError, Result, SweepConfig,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Run scaling benchmark
pub fn run_scaling_benchmark(
    max_size: usize,
    backend: BackendChoice,
    sweeps: usize,
    export: Option<PathBuf>,
) -> Result<()> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║            Parallel Jacobi - Scaling Benchmark                ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // Size progression; inputs are 2P x P
    let sizes: Vec<usize> = [8, 16, 32, 64, 128, 256, 512, 1024]
        .into_iter()
        .filter(|&s| s <= max_size)
        .collect();

    let results = dispatch(backend, ScalingTask { sizes, sweeps })?;

    if let Some(path) = export {
        export_benchmark_results(&path, &results)
            .map_err(|e| JacobiError::Compute(format!("export to {}: {}", path.display(), e)))?;
        println!("\nResults exported to: {}", path.display());
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct BenchResult {
    rows: usize,
    cols: usize,
    setup_ms: f64,
    sweep_ms: f64,
    assemble_ms: f64,
    total_ms: f64,
    /// Max |U·diag(σ)·Vᵀ − Dᵀ| over ‖D‖
    error: f64,
}

struct ScalingTask {
    sizes: Vec<usize>,
    sweeps: usize,
}

impl BackendTask for ScalingTask {
    type Output = Vec<BenchResult>;

    fn run<B: Backend>(self, backend: &B) -> Result<Vec<BenchResult>> {
        println!("Backend: {}", backend.name());
        println!("Sweeps:  {}", self.sweeps);
        println!();

        println!("┌─────────────┬────────────┬────────────┬────────────┬────────────┬──────────┐");
        println!("│    Shape    │  Setup(ms) │ Sweeps(ms) │  Assem(ms) │  Total(ms) │   Error  │");
        println!("├─────────────┼────────────┼────────────┼────────────┼────────────┼──────────┤");

        let config = SweepConfig::default().with_max_sweeps(self.sweeps);
        let mut results = Vec::with_capacity(self.sizes.len());

        for &p in &self.sizes {
            let result = run_single_benchmark(backend, 2 * p, p, &config)?;
            println!(
                "│ {:>5}x{:<5} │ {:>10.3} │ {:>10.3} │ {:>10.3} │ {:>10.3} │ {:>8.1e} │",
                result.rows,
                result.cols,
                result.setup_ms,
                result.sweep_ms,
                result.assemble_ms,
                result.total_ms,
                result.error
            );
            results.push(result);
        }

        println!("└─────────────┴────────────┴────────────┴────────────┴────────────┴──────────┘");
        Ok(results)
    }
}

fn run_single_benchmark<B: Backend>(
    backend: &B,
    rows: usize,
    cols: usize,
    config: &SweepConfig,
) -> Result<BenchResult> {
    let d = random_matrix(rows, cols, (rows * 31 + cols) as u64);
    let result = decompose_with_config(backend, &d, config)?;
    let error = result.reconstruct()?.max_abs_diff(&d.transpose()) / d.frobenius_norm().max(1.0);
    info!("{}x{} done in {:.3}s", rows, cols, result.timings.total_time);

    Ok(BenchResult {
        rows,
        cols,
        setup_ms: result.timings.setup_time * 1000.0,
        sweep_ms: result.timings.sweep_time * 1000.0,
        assemble_ms: result.timings.assemble_time * 1000.0,
        total_ms: result.timings.total_time * 1000.0,
        error,
    })
}

fn export_benchmark_results(path: &Path, results: &[BenchResult]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "rows,cols,setup_ms,sweep_ms,assemble_ms,total_ms,error")?;
    for r in results {
        writeln!(
            file,
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.3e}",
            r.rows, r.cols, r.setup_ms, r.sweep_ms, r.assemble_ms, r.total_ms, r.error
        )?;
    }
    Ok(())
}
