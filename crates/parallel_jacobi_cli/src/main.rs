//! Parallel Jacobi CLI
//!
//! SVD of dense matrices through the parallel cyclic Jacobi eigensolver.
//!
//! # Usage
//! ```bash
//! # Decompose a random 512x256 matrix on the CPU backend
//! parallel-jacobi decompose --rows 512 --cols 256 --seed 7
//!
//! # Check a decomposition against the serial reference solver
//! parallel-jacobi verify --rows 64 --cols 33 --backend cuda
//!
//! # Scaling table, exported as CSV
//! parallel-jacobi bench --max-size 512 --export results/bench.csv
//! ```

mod benchmark;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use parallel_jacobi_core::{
    decompose_with_config, random_matrix, serial_jacobi_eigenvalues, Backend, CpuBackend,
    JacobiError, Matrix, PairSchedule, Result, SweepConfig, MAX_SWEEPS,
};
use rand::Rng;
use std::path::PathBuf;
use std::process::ExitCode;

#[cfg(feature = "cuda")]
use parallel_jacobi_cuda::CudaBackend;

#[derive(Parser)]
#[command(name = "parallel-jacobi")]
#[command(about = "Parallel cyclic Jacobi SVD on CPU and GPU")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that runs a decomposition
#[derive(clap::Args, Clone)]
struct RunArgs {
    /// Rows of the input matrix (N)
    #[arg(long, default_value = "64")]
    rows: usize,

    /// Columns of the input matrix (P)
    #[arg(long, default_value = "32")]
    cols: usize,

    /// Seed for the random input; drawn at random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Backend to use
    #[arg(long, value_enum, default_value = "cpu")]
    backend: BackendChoice,

    /// Number of sweeps
    #[arg(long, default_value_t = MAX_SWEEPS)]
    sweeps: usize,

    /// Stop once the off-diagonal norm drops to this value
    #[arg(long)]
    tolerance: Option<f64>,
}

impl RunArgs {
    fn config(&self) -> SweepConfig {
        let config = SweepConfig::default().with_max_sweeps(self.sweeps);
        match self.tolerance {
            Some(t) => config.with_tolerance(t),
            None => config,
        }
    }

    fn input(&self) -> Matrix<f64> {
        let seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        info!("input {}x{} seed {}", self.rows, self.cols, seed);
        random_matrix(self.rows, self.cols, seed)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a random integer matrix and print σ
    Decompose {
        #[command(flatten)]
        run: RunArgs,

        /// Also print U and Vᵀ
        #[arg(long)]
        print: bool,
    },

    /// Decompose and check the result against a serial reference
    Verify {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Print the round-robin pairing table
    Schedule {
        /// Matrix dimension P
        #[arg(long)]
        size: usize,
    },

    /// Run scaling benchmarks over square-ish sizes
    Bench {
        /// Maximum column count
        #[arg(long, default_value = "256")]
        max_size: usize,

        /// Backend to use
        #[arg(long, value_enum, default_value = "cpu")]
        backend: BackendChoice,

        /// Number of sweeps
        #[arg(long, default_value_t = MAX_SWEEPS)]
        sweeps: usize,

        /// Export results to CSV
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Display GPU device information
    GpuInfo,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendChoice {
    Cpu,
    #[cfg(feature = "cuda")]
    Cuda,
}

/// Work that can run on any backend
pub trait BackendTask {
    type Output;

    fn run<B: Backend>(self, backend: &B) -> Result<Self::Output>;
}

/// Construct the chosen backend and hand it to `task`
pub fn dispatch<T: BackendTask>(choice: BackendChoice, task: T) -> Result<T::Output> {
    match choice {
        BackendChoice::Cpu => task.run(&CpuBackend::new()),
        #[cfg(feature = "cuda")]
        BackendChoice::Cuda => match CudaBackend::new() {
            Some(backend) => task.run(&backend),
            None => Err(JacobiError::Compute("CUDA backend not available".to_string())),
        },
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Decompose { run, print } => {
            let backend = run.backend;
            dispatch(backend, DecomposeTask { args: run, print })
        }
        Commands::Verify { run } => {
            let backend = run.backend;
            dispatch(backend, VerifyTask { args: run }).and_then(|passed| {
                if passed {
                    Ok(())
                } else {
                    Err(JacobiError::Compute("verification failed".to_string()))
                }
            })
        }
        Commands::Schedule { size } => run_schedule(size),
        Commands::Bench {
            max_size,
            backend,
            sweeps,
            export,
        } => benchmark::run_scaling_benchmark(max_size, backend, sweeps, export),
        Commands::GpuInfo => {
            run_gpu_info();
            Ok(())
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

struct DecomposeTask {
    args: RunArgs,
    print: bool,
}

impl BackendTask for DecomposeTask {
    type Output = ();

    fn run<B: Backend>(self, backend: &B) -> Result<()> {
        let d = self.args.input();
        let result = decompose_with_config(backend, &d, &self.args.config())?;

        println!("Backend:  {}", backend.name());
        println!("Shape:    {}x{}", d.rows(), d.cols());
        println!(
            "Sweeps:   {} ({} rounds, {} rotations)",
            result.stats.sweeps, result.stats.rounds, result.stats.rotations
        );
        if let Some(off) = result.stats.off_diagonal_norm {
            println!("Off-diag: {:.3e} (converged: {})", off, result.stats.converged);
        }
        println!();
        println!("Singular values:");
        for (i, s) in result.sigma.iter().enumerate() {
            println!("  σ[{:>3}] = {:.10}", i, s);
        }

        if self.print {
            println!();
            print_matrix("U", &result.u);
            println!();
            print_matrix("Vᵀ", &result.vt);
        }

        println!();
        println!("Setup:    {:>10.3} ms", result.timings.setup_time * 1000.0);
        println!("Sweeps:   {:>10.3} ms", result.timings.sweep_time * 1000.0);
        println!("Assemble: {:>10.3} ms", result.timings.assemble_time * 1000.0);
        println!("Total:    {:>10.3} ms", result.timings.total_time * 1000.0);
        Ok(())
    }
}

struct VerifyTask {
    args: RunArgs,
}

impl BackendTask for VerifyTask {
    type Output = bool;

    fn run<B: Backend>(self, backend: &B) -> Result<bool> {
        let d = self.args.input();
        let result = decompose_with_config(backend, &d, &self.args.config())?;

        let scale = d.frobenius_norm().max(1.0);
        let rebuilt = result.reconstruct()?;
        let recon_err = rebuilt.max_abs_diff(&d.transpose()) / scale;
        let ortho_err = result.u.orthogonality_error();

        let ata = d.transpose().matmul(&d)?;
        let reference = serial_jacobi_eigenvalues(&ata, 100)?;
        let ev_scale = reference.first().copied().unwrap_or(0.0).abs().max(1.0);
        let ev_err = result
            .eigenvalues()
            .iter()
            .zip(&reference)
            .map(|(got, want)| (got - want).abs() / ev_scale)
            .fold(0.0, f64::max);

        let passed = recon_err < 1e-6 && ortho_err < 1e-6 && ev_err < 1e-6;

        println!("Backend:                 {}", backend.name());
        println!("Shape:                   {}x{}", d.rows(), d.cols());
        println!("Reconstruction error:    {:.3e}", recon_err);
        println!("Orthogonality ‖UᵀU−I‖:   {:.3e}", ortho_err);
        println!("σ² vs reference:         {:.3e}", ev_err);
        println!("Result:                  {}", if passed { "PASS" } else { "FAIL" });
        Ok(passed)
    }
}

fn print_matrix(label: &str, m: &Matrix<f64>) {
    println!("{} ({}x{}):", label, m.rows(), m.cols());
    for i in 0..m.rows() {
        let row: Vec<String> = m.row(i).iter().map(|v| format!("{:>10.5}", v)).collect();
        println!("  {}", row.join(" "));
    }
}

fn run_schedule(size: usize) -> Result<()> {
    let schedule = PairSchedule::new(size)?;

    println!(
        "Size {}: {} rounds of {} pairs",
        schedule.size(),
        schedule.num_rounds(),
        schedule.pairs_per_round()
    );
    for r in 0..schedule.num_rounds() {
        let pairs: Vec<String> = schedule
            .round(r)
            .iter()
            .map(|(k, l)| format!("({},{})", k, l))
            .collect();
        match schedule.bye(r) {
            Some(b) => println!("  round {:>3}: {}  bye {}", r, pairs.join(" "), b),
            None => println!("  round {:>3}: {}", r, pairs.join(" ")),
        }
    }
    Ok(())
}

fn run_gpu_info() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                     GPU Device Information                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    #[cfg(feature = "cuda")]
    {
        match CudaBackend::try_new() {
            Ok(cuda) => {
                println!("CUDA Backend: Available");
                println!("  Device: {}", cuda.device_name());
            }
            Err(err) => {
                println!("CUDA Backend: Not available ({})", err);
            }
        }
    }

    #[cfg(not(feature = "cuda"))]
    {
        println!("CUDA Backend: Not compiled (use --features cuda)");
    }

    println!();
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    println!("CPU Backend: Available ({} hardware threads)", threads);
}
