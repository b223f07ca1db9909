//! Benchmark driver: reciprocal comparison, operator timings, product
//! precision per level pair and the CKKS parameter table.

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ckks_inverse::harness::{
    bounds_table, build_context, inversion_report, parameter_table, precision_sweep, sweep_operations, write_csv,
    InversionConfig, ParamSweep, SweepConfig,
};
use ckks_inverse::params::DEFAULT_HAMMING_WEIGHT;
use ckks_inverse::{CkksContext, CkksParams, HeError, KeyPair, SecurityLevel};

#[derive(Parser)]
#[command(name = "ckks-inverse")]
#[command(about = "Encrypted reciprocal approximation and CKKS operator benchmarks")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    context: ContextArgs,

    /// Seed for noise and sampling (entropy when omitted)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log per-iteration approximations
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ContextArgs {
    /// Security level λ (128, 192 or 256; anything else disables the check)
    #[arg(long, default_value_t = 128, global = true)]
    lambda: u32,

    /// log2 of the ring dimension N
    #[arg(long, default_value_t = 16, global = true)]
    log2_ring_dim: u32,

    /// Scaling modulus size Δ in bits
    #[arg(long, default_value_t = 58, global = true)]
    scale_mod_size: u32,

    /// First modulus size q0 in bits
    #[arg(long, default_value_t = 60, global = true)]
    first_mod_size: u32,

    /// Multiplicative depth L
    #[arg(long, default_value_t = 7, global = true)]
    depth: usize,

    /// Slots per ciphertext (N/2 when omitted)
    #[arg(long, global = true)]
    batch_size: Option<usize>,
}

impl ContextArgs {
    fn params(&self) -> CkksParams {
        CkksParams {
            security_level: SecurityLevel::from_bits(self.lambda),
            log2_ring_dim: self.log2_ring_dim,
            scale_mod_size: self.scale_mod_size,
            first_mod_size: self.first_mod_size,
            mult_depth: self.depth,
            batch_size: self
                .batch_size
                .unwrap_or_else(|| 1usize.checked_shl(self.log2_ring_dim.saturating_sub(1)).unwrap_or(0)),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Compare Newton, Goldschmidt and Chebyshev on one value
    Inverse {
        #[arg(long, default_value_t = 1.5, allow_hyphen_values = true)]
        value: f64,
        /// Newton initial guess x0
        #[arg(long, default_value_t = 0.4)]
        x0: f64,
        #[arg(long, default_value_t = 5)]
        iterations: usize,
        #[arg(long, default_value_t = 1.0)]
        cheb_lower: f64,
        #[arg(long, default_value_t = 2.0)]
        cheb_upper: f64,
        #[arg(long, default_value_t = 5)]
        degree: usize,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Time every operator at each level pair, for every context in the sweep
    Ops {
        #[command(flatten)]
        sweep: SweepArgs,
        /// log2(N) values to sweep (the context's when omitted)
        #[arg(long, value_delimiter = ',')]
        ring_dims: Vec<u32>,
        /// Scaling modulus sizes to sweep (the context's when omitted)
        #[arg(long, value_delimiter = ',')]
        scale_mod_sizes: Vec<u32>,
        /// First modulus sizes to sweep (the context's when omitted)
        #[arg(long, value_delimiter = ',')]
        first_mod_sizes: Vec<u32>,
        #[arg(long, default_value = "benchmark_results.csv")]
        output: PathBuf,
    },
    /// Measure product precision at each level pair
    Precision {
        #[command(flatten)]
        sweep: SweepArgs,
        #[arg(long, default_value = "precision_results.csv")]
        output: PathBuf,
    },
    /// Secure (Δ, q0, L) choices and modulus bounds per security level and ring dimension
    Params {
        #[arg(long, value_delimiter = ',', default_values_t = [128, 192, 256])]
        lambdas: Vec<u32>,
        #[arg(long, value_delimiter = ',', default_values_t = [14, 15, 16, 17])]
        log2_ring_dims: Vec<u32>,
        #[arg(long, default_value_t = DEFAULT_HAMMING_WEIGHT)]
        hamming_weight: u64,
        #[arg(long, default_value = "big_table.csv")]
        output: PathBuf,
        #[arg(long, default_value = "bounds.csv")]
        bounds_output: PathBuf,
    },
}

#[derive(Args)]
struct SweepArgs {
    /// Lower bound for random plaintexts
    #[arg(long, default_value_t = 0.5)]
    lower: f64,
    /// Upper bound for random plaintexts
    #[arg(long, default_value_t = 1.0)]
    upper: f64,
    /// Values per ciphertext
    #[arg(long, default_value_t = 16)]
    slots: usize,
}

impl From<&SweepArgs> for SweepConfig {
    fn from(args: &SweepArgs) -> Self {
        SweepConfig {
            lower: args.lower,
            upper: args.upper,
            slots: args.slots,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Command::Params {
            lambdas,
            log2_ring_dims,
            hamming_weight,
            output,
            bounds_output,
        } => {
            write_csv(bounds_output, &bounds_table(lambdas, log2_ring_dims, *hamming_weight))?;
            write_csv(output, &parameter_table(lambdas, log2_ring_dims, *hamming_weight))?;
        }
        Command::Inverse {
            value,
            x0,
            iterations,
            cheb_lower,
            cheb_upper,
            degree,
            output,
        } => {
            let (ctx, keys) = setup(&cli)?;
            let config = InversionConfig {
                value: *value,
                initial_guess: *x0,
                iterations: *iterations,
                chebyshev_lower: *cheb_lower,
                chebyshev_upper: *cheb_upper,
                chebyshev_degree: *degree,
            };
            let records = inversion_report(&ctx, &keys, &config)?;
            for r in &records {
                println!(
                    "{:<12} 1/{} ≈ {:.10} (error {:.3e}, {} iterations{}, level {})",
                    r.method,
                    r.input,
                    r.computed,
                    r.abs_error,
                    r.iterations,
                    if r.truncated { ", stopped early" } else { "" },
                    r.final_level
                );
            }
            if let Some(path) = output {
                write_csv(path, &records)?;
            }
        }
        Command::Ops {
            sweep,
            ring_dims,
            scale_mod_sizes,
            first_mod_sizes,
            output,
        } => {
            let mut contexts = ParamSweep::single(cli.context.params());
            if !ring_dims.is_empty() {
                contexts.log2_ring_dims.clone_from(ring_dims);
            }
            if !scale_mod_sizes.is_empty() {
                contexts.scale_mod_sizes.clone_from(scale_mod_sizes);
            }
            if !first_mod_sizes.is_empty() {
                contexts.first_mod_sizes.clone_from(first_mod_sizes);
            }
            info!(contexts = contexts.contexts().len(), "timing operators");
            let records = sweep_operations(&contexts, &SweepConfig::from(sweep), cli.seed, &mut rng(cli.seed))?;
            write_csv(output, &records)?;
        }
        Command::Precision { sweep, output } => {
            let (ctx, keys) = setup(&cli)?;
            let records = precision_sweep(&ctx, &keys, &SweepConfig::from(sweep), &mut rng(cli.seed));
            write_csv(output, &records)?;
        }
    }

    Ok(())
}

fn setup(cli: &Cli) -> Result<(CkksContext, KeyPair), HeError> {
    let params = cli.context.params();
    info!(
        lambda = cli.context.lambda,
        ring_dim = params.ring_dim(),
        scale_mod_size = params.scale_mod_size,
        first_mod_size = params.first_mod_size,
        depth = params.mult_depth,
        "building CKKS context"
    );
    let ctx = build_context(params, cli.seed)?;
    let keys = ctx.keygen();
    Ok((ctx, keys))
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
