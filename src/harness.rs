//! Benchmark drivers: operator timings, multiplication precision per level
//! pair, reciprocal comparisons and the parameter tables, all as CSV records.

use std::path::Path;
use std::time::Instant;

use csv::Writer;
use itertools::{iproduct, Itertools, MinMaxResult};
use rand::Rng;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    algebra::{CiphertextAlgebra, Encryption},
    chebyshev::chebyshev_inverse,
    cipher::Ciphertext,
    error::Result,
    inversion::{goldschmidt_inverse, newton_inverse, DecryptingObserver},
    normalize::normalize,
    params::{b_clean, log2_delta_lower_bound, log2_precision, upper_bound_log_q, CkksParams, FIRST_MOD_BITS},
    random_ct::random_ciphertext_with_values,
    scheme::{CkksContext, KeyPair},
};

/// Largest scaling modulus size enumerated by [`parameter_table`].
pub const MAX_TABLE_SCALE_BITS: u32 = 58;

/// Largest depth enumerated by [`parameter_table`].
pub const MAX_TABLE_DEPTH: usize = 32;

/// One timed operator call.
#[derive(Debug, Clone, Serialize)]
pub struct OpTimingRecord {
    /// Operator name, e.g. `mult_no_relin`.
    pub operation: &'static str,
    /// `log2(N)` of the context.
    pub log2_ring_dim: u32,
    /// Scaling modulus size in bits.
    pub log2_delta: u32,
    /// First modulus size in bits.
    pub q0: u32,
    /// Depth ceiling of the context.
    pub mult_depth: usize,
    /// Level of the first (or only) ciphertext operand.
    pub level1: usize,
    /// Level of the second ciphertext operand; empty for plaintext operands.
    pub level2: Option<usize>,
    /// Wall time of the call in microseconds.
    pub time_us: f64,
}

/// Precision of one ciphertext product.
#[derive(Debug, Clone, Serialize)]
pub struct PrecisionRecord {
    /// 0 when no security level is set
    pub lambda: u32,
    /// `log2(N)` of the context.
    pub log2_ring_dim: u32,
    /// Scaling modulus size in bits.
    pub log2_delta: u32,
    /// First modulus size in bits.
    pub q0: u32,
    /// Depth ceiling of the context.
    pub mult_depth: usize,
    /// Precision predicted from the parameters.
    pub estimated_precision: i64,
    /// Level of the first factor.
    pub level1: usize,
    /// Level of the second factor.
    pub level2: usize,
    /// Measured `-log2` of the largest slot error.
    pub log2_precision: f64,
}

/// Outcome of one reciprocal method.
#[derive(Debug, Clone, Serialize)]
pub struct InversionRecord {
    /// `newton`, `goldschmidt` or `chebyshev`.
    pub method: &'static str,
    /// Value that was inverted.
    pub input: f64,
    /// Exact reciprocal.
    pub expected: f64,
    /// Decrypted approximation.
    pub computed: f64,
    /// `|computed - expected|`
    pub abs_error: f64,
    /// Iterations completed (series degree for Chebyshev).
    pub iterations: usize,
    /// True when the method stopped before the requested iterations.
    pub truncated: bool,
    /// Level of the returned ciphertext.
    pub final_level: usize,
}

/// Feasible `(Δ, q0, L)` choice for a security level and ring dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamRow {
    /// Security level λ.
    pub lambda: u32,
    /// `log2(N)`.
    pub log2_ring_dim: u32,
    /// Scaling modulus size in bits.
    pub log2_delta: u32,
    /// First modulus size in bits.
    pub q0: u32,
    /// Multiplicative depth L.
    pub mult_depth: usize,
    /// Expected precision in bits.
    pub log2_precision: i64,
}

/// Modulus and scale bounds for a security level and ring dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundsRow {
    /// Security level λ.
    pub lambda: u32,
    /// `log2(N)`.
    pub log2_ring_dim: u32,
    /// Secret key Hamming weight used for the noise bound.
    pub hamming_weight: u64,
    /// Largest secure `log2(Q)`.
    pub max_log2_q: u64,
    /// Smallest usable `log2(Δ)`.
    pub min_log2_delta: u32,
}

/// Options shared by the sweeps.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Lower bound for random plaintexts.
    pub lower: f64,
    /// Upper bound for random plaintexts.
    pub upper: f64,
    /// Values per ciphertext.
    pub slots: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            lower: 0.5,
            upper: 1.0,
            slots: 16,
        }
    }
}

/// Context shapes visited by [`sweep_operations`]: every combination of ring
/// dimension, scaling modulus and first modulus on top of `base`.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    /// Security level, depth and batch size shared by every context.
    pub base: CkksParams,
    /// `log2(N)` values.
    pub log2_ring_dims: Vec<u32>,
    /// Scaling modulus sizes in bits.
    pub scale_mod_sizes: Vec<u32>,
    /// First modulus sizes in bits.
    pub first_mod_sizes: Vec<u32>,
}

impl ParamSweep {
    /// A sweep over the single context `base`.
    pub fn single(base: CkksParams) -> Self {
        Self {
            log2_ring_dims: vec![base.log2_ring_dim],
            scale_mod_sizes: vec![base.scale_mod_size],
            first_mod_sizes: vec![base.first_mod_size],
            base,
        }
    }

    /// Parameters of every combination, batch size capped at `N/2`.
    pub fn contexts(&self) -> Vec<CkksParams> {
        iproduct!(&self.log2_ring_dims, &self.scale_mod_sizes, &self.first_mod_sizes)
            .map(|(&log2_ring_dim, &scale_mod_size, &first_mod_size)| {
                let half = 1usize.checked_shl(log2_ring_dim.saturating_sub(1)).unwrap_or(usize::MAX);
                CkksParams {
                    log2_ring_dim,
                    scale_mod_size,
                    first_mod_size,
                    batch_size: self.base.batch_size.min(half),
                    ..self.base.clone()
                }
            })
            .collect()
    }
}

/// Options for [`inversion_report`].
#[derive(Debug, Clone)]
pub struct InversionConfig {
    /// Value to invert.
    pub value: f64,
    /// Newton initial guess x0.
    pub initial_guess: f64,
    /// Newton and Goldschmidt iterations.
    pub iterations: usize,
    /// Lower end of the Chebyshev interval.
    pub chebyshev_lower: f64,
    /// Upper end of the Chebyshev interval.
    pub chebyshev_upper: f64,
    /// Chebyshev series degree.
    pub chebyshev_degree: usize,
}

impl Default for InversionConfig {
    fn default() -> Self {
        Self {
            value: 1.5,
            initial_guess: 0.4,
            iterations: 5,
            chebyshev_lower: 1.0,
            chebyshev_upper: 2.0,
            chebyshev_degree: 5,
        }
    }
}

/// All level pairs `(l1, l2)` with `l2 <= l1 < levels`.
fn level_pairs(levels: usize) -> impl Iterator<Item = (usize, usize)> {
    iproduct!(0..levels, 0..levels).filter(|(l1, l2)| l2 <= l1)
}

fn time_us<T>(f: impl FnOnce() -> Result<T>) -> Result<f64> {
    let start = Instant::now();
    f()?;
    Ok(start.elapsed().as_secs_f64() * 1e6)
}

/// Time every operator on random ciphertexts.
///
/// Additive operators run at every level up to the depth ceiling, operators
/// that consume a level only below it.
pub fn time_operations<R: Rng>(
    ctx: &CkksContext,
    keys: &KeyPair,
    config: &SweepConfig,
    rng: &mut R,
) -> Result<Vec<OpTimingRecord>> {
    let params = ctx.params();
    let depth = params.mult_depth;
    let pk = &keys.public_key;
    let mut records = Vec::new();
    let mut push = |operation, level1, level2, elapsed| {
        records.push(OpTimingRecord {
            operation,
            log2_ring_dim: params.log2_ring_dim,
            log2_delta: params.scale_mod_size,
            q0: params.first_mod_size,
            mult_depth: depth,
            level1,
            level2,
            time_us: elapsed,
        });
    };

    for level1 in 0..=depth {
        let (ct1, _) = random_ciphertext_with_values(ctx, pk, config.lower, config.upper, config.slots, level1, rng)?;
        let constant: f64 = rng.gen_range(config.lower..config.upper);

        push("add_const", level1, None, time_us(|| ctx.add_const(constant, &ct1))?);
        push("sub_from_const", level1, None, time_us(|| ctx.sub_from_const(constant, &ct1))?);
        if level1 < depth {
            push("mult_const", level1, None, time_us(|| ctx.mult_const(constant, &ct1))?);
        }

        for level2 in 0..=level1 {
            let (ct2, _) =
                random_ciphertext_with_values(ctx, pk, config.lower, config.upper, config.slots, level2, rng)?;
            push("add", level1, Some(level2), time_us(|| ctx.add(&ct1, &ct2))?);
            push("sub", level1, Some(level2), time_us(|| ctx.sub(&ct1, &ct2))?);
            if level1 < depth {
                let raw = ctx.mult_no_relin(&ct1, &ct2)?;
                push("mult", level1, Some(level2), time_us(|| ctx.mult(&ct1, &ct2))?);
                push("mult_no_relin", level1, Some(level2), time_us(|| ctx.mult_no_relin(&ct1, &ct2))?);
                push("relinearize", level1, Some(level2), time_us(|| ctx.relinearize(&raw))?);
            }
        }
    }
    info!(records = records.len(), depth, "operator timing sweep finished");
    Ok(records)
}

/// [`time_operations`] for every context in `sweep`. Contexts whose
/// parameters are rejected are logged and skipped.
pub fn sweep_operations<R: Rng>(
    sweep: &ParamSweep,
    config: &SweepConfig,
    seed: Option<u64>,
    rng: &mut R,
) -> Result<Vec<OpTimingRecord>> {
    let mut records = Vec::new();
    for params in sweep.contexts() {
        let (log2_ring_dim, scale, q0) = (params.log2_ring_dim, params.scale_mod_size, params.first_mod_size);
        let ctx = match build_context(params, seed) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(log2_ring_dim, scale, q0, error = %e, "skipping context");
                continue;
            }
        };
        let keys = ctx.keygen();
        records.extend(time_operations(&ctx, &keys, config, rng)?);
    }
    Ok(records)
}

/// `-log2` of the largest slot error.
fn measured_precision(decrypted: &[f64], expected: &[f64]) -> f64 {
    let errors = decrypted.iter().zip(expected).map(|(d, e)| (d - e).abs());
    let max_err = match errors.minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::NoElements => return f64::INFINITY,
        MinMaxResult::OneElement(e) => e,
        MinMaxResult::MinMax(_, e) => e,
    };
    -max_err.log2()
}

/// `v` squared `times` times, matching what the ciphertext factory does.
fn squared(v: f64, times: usize) -> f64 {
    (0..times).fold(v, |x, _| x * x)
}

/// Multiply random ciphertexts at each level pair below the depth ceiling
/// and measure precision.
///
/// A failing pair ends the sweep; the records gathered so far are returned.
pub fn precision_sweep<R: Rng>(
    ctx: &CkksContext,
    keys: &KeyPair,
    config: &SweepConfig,
    rng: &mut R,
) -> Vec<PrecisionRecord> {
    let params = ctx.params();
    let mut records = Vec::new();

    for (level1, level2) in level_pairs(params.mult_depth) {
        match multiply_pair(ctx, keys, config, level1, level2, rng) {
            Ok(log2_precision) => records.push(PrecisionRecord {
                lambda: params.security_level.bits().unwrap_or(0),
                log2_ring_dim: params.log2_ring_dim,
                log2_delta: params.scale_mod_size,
                q0: params.first_mod_size,
                mult_depth: params.mult_depth,
                estimated_precision: params.log2_precision(),
                level1,
                level2,
                log2_precision,
            }),
            Err(e) => {
                warn!(level1, level2, error = %e, "precision sweep stopped");
                break;
            }
        }
    }
    records
}

fn multiply_pair<R: Rng>(
    ctx: &CkksContext,
    keys: &KeyPair,
    config: &SweepConfig,
    level1: usize,
    level2: usize,
    rng: &mut R,
) -> Result<f64> {
    let pk = &keys.public_key;
    let (ct1, v1) = random_ciphertext_with_values(ctx, pk, config.lower, config.upper, config.slots, level1, rng)?;
    let (ct2, v2) = random_ciphertext_with_values(ctx, pk, config.lower, config.upper, config.slots, level2, rng)?;
    let product = ctx.mult(&ct1, &ct2)?;
    let decrypted = ctx.decrypt(&keys.secret_key, &product)?;

    let expected: Vec<f64> = v1
        .iter()
        .zip(&v2)
        .map(|(&a, &b)| squared(a, level1) * squared(b, level2))
        .collect();
    Ok(measured_precision(&decrypted, &expected))
}

/// Run Newton, Goldschmidt (normalizing when needed) and Chebyshev on one
/// encrypted value. A method that fails, including its final decryption, is
/// logged and left out.
pub fn inversion_report(ctx: &CkksContext, keys: &KeyPair, config: &InversionConfig) -> Result<Vec<InversionRecord>> {
    let expected = 1.0 / config.value;
    let ct = ctx.encrypt(&keys.public_key, &[config.value])?;
    let first_slot = |c: &Ciphertext| -> Result<f64> { Ok(ctx.decrypt(&keys.secret_key, c)?[0]) };
    let record = |method, computed: f64, iterations, truncated, final_level| InversionRecord {
        method,
        input: config.value,
        expected,
        computed,
        abs_error: (computed - expected).abs(),
        iterations,
        truncated,
        final_level,
    };

    let newton = || -> Result<InversionRecord> {
        let mut observer = DecryptingObserver::new(ctx, &keys.secret_key);
        let inv = newton_inverse(ctx, &ct, config.initial_guess, config.iterations, &mut observer)?;
        Ok(record(
            "newton",
            first_slot(&inv.value)?,
            inv.iterations,
            inv.truncated(),
            inv.value.level(),
        ))
    };
    let goldschmidt = || -> Result<InversionRecord> {
        let (computed, iterations, truncated, level) = goldschmidt_with_scaling(ctx, keys, config)?;
        Ok(record("goldschmidt", computed, iterations, truncated, level))
    };
    let chebyshev = || -> Result<InversionRecord> {
        let inv = chebyshev_inverse(
            ctx,
            &ct,
            config.chebyshev_lower,
            config.chebyshev_upper,
            config.chebyshev_degree,
        )?;
        Ok(record(
            "chebyshev",
            first_slot(&inv)?,
            config.chebyshev_degree,
            false,
            inv.level(),
        ))
    };

    let mut records = Vec::new();
    let mut keep = |method: &str, outcome: Result<InversionRecord>| match outcome {
        Ok(r) => records.push(r),
        Err(e) => error!(method, error = %e, "inversion failed"),
    };
    keep("newton", newton());
    keep("goldschmidt", goldschmidt());
    keep("chebyshev", chebyshev());
    Ok(records)
}

/// Goldschmidt on `value`, scaling it into `(0, 2)` before encryption when
/// needed. Returns `(reciprocal, iterations, truncated, level)`.
fn goldschmidt_with_scaling(
    ctx: &CkksContext,
    keys: &KeyPair,
    config: &InversionConfig,
) -> Result<(f64, usize, bool, usize)> {
    let scaled = normalize(config.value)?;
    if scaled.steps > 0 || scaled.negative {
        info!(
            input = config.value,
            scaled = scaled.value,
            factor = scaled.factor,
            "input outside (0, 2), scaling before encryption"
        );
    }
    let ct = ctx.encrypt(&keys.public_key, &[scaled.value])?;
    let mut observer = DecryptingObserver::new(ctx, &keys.secret_key);
    let inv = goldschmidt_inverse(ctx, &ct, config.iterations, &mut observer)?;
    let decrypted = ctx.decrypt(&keys.secret_key, &inv.value)?[0];
    Ok((
        scaled.restore_reciprocal(decrypted),
        inv.iterations,
        inv.truncated(),
        inv.value.level(),
    ))
}

/// Smallest usable `log2(Δ)` for a ring, or `None` when it exceeds
/// [`MAX_TABLE_SCALE_BITS`].
fn usable_delta(lambda: u32, log2_ring_dim: u32, hamming_weight: u64) -> Option<u32> {
    let n = 1u64 << log2_ring_dim;
    let min_delta = log2_delta_lower_bound(n, hamming_weight);
    if min_delta > MAX_TABLE_SCALE_BITS {
        warn!(
            lambda,
            log2_ring_dim,
            min_delta,
            max = MAX_TABLE_SCALE_BITS,
            "scale lower bound too large, no valid parameters"
        );
        return None;
    }
    Some(min_delta)
}

/// Largest secure `log2(Q)` and smallest usable `log2(Δ)` for every
/// security level and ring dimension.
pub fn bounds_table(lambdas: &[u32], log2_ring_dims: &[u32], hamming_weight: u64) -> Vec<BoundsRow> {
    iproduct!(lambdas, log2_ring_dims)
        .filter_map(|(&lambda, &log2_ring_dim)| {
            let min_log2_delta = usable_delta(lambda, log2_ring_dim, hamming_weight)?;
            Some(BoundsRow {
                lambda,
                log2_ring_dim,
                hamming_weight,
                max_log2_q: upper_bound_log_q(lambda, 1u64 << log2_ring_dim),
                min_log2_delta,
            })
        })
        .collect()
}

/// Every secure `(Δ, q0, L)` for each security level and ring dimension.
///
/// `Δ` runs from its lower bound to [`MAX_TABLE_SCALE_BITS`], `q0` over
/// `Δ+2 .. 2Δ` up to [`FIRST_MOD_BITS`], and `L` from 1 to
/// [`MAX_TABLE_DEPTH`] while `log2(qP)` stays below the security bound.
pub fn parameter_table(lambdas: &[u32], log2_ring_dims: &[u32], hamming_weight: u64) -> Vec<ParamRow> {
    let mut rows = Vec::new();
    for (&lambda, &log2_ring_dim) in iproduct!(lambdas, log2_ring_dims) {
        let Some(min_delta) = usable_delta(lambda, log2_ring_dim, hamming_weight) else {
            continue;
        };
        let n = 1u64 << log2_ring_dim;
        let max_log2_q = upper_bound_log_q(lambda, n) as f64;
        let bc = b_clean(n, hamming_weight);

        for log2_delta in min_delta..=MAX_TABLE_SCALE_BITS {
            let precision = log2_precision(log2_delta, bc);
            for q0 in (log2_delta + 2..2 * log2_delta).take_while(|&q0| q0 <= FIRST_MOD_BITS) {
                for mult_depth in 1..=MAX_TABLE_DEPTH {
                    let log2_q = f64::from(q0) + mult_depth as f64 * f64::from(log2_delta);
                    if log2_q + log2_q / 4.0 >= max_log2_q {
                        break;
                    }
                    rows.push(ParamRow {
                        lambda,
                        log2_ring_dim,
                        log2_delta,
                        q0,
                        mult_depth,
                        log2_precision: precision,
                    });
                }
            }
        }
    }
    rows
}

/// Serialize `records` to a CSV file with a header row.
pub fn write_csv<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<()> {
    let mut wtr = Writer::from_path(path.as_ref())?;
    for r in records {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    info!(path = %path.as_ref().display(), rows = records.len(), "wrote csv");
    Ok(())
}

/// Context built from `params`, seeded when `seed` is given.
pub fn build_context(params: CkksParams, seed: Option<u64>) -> Result<CkksContext> {
    match seed {
        Some(seed) => CkksContext::with_seed(params, seed),
        None => CkksContext::new(params),
    }
}
