//! Random ciphertexts at a chosen level, for depth-dependent benchmarks.
//!
//! The level is reached by squaring the ciphertext in place, so the packed
//! values become `v^(2^level)`. Use level 0 when the decrypted values
//! themselves matter.

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::{
    algebra::Encryption,
    error::{HeError, Result},
};

/// Encrypt `slot_count` values drawn uniformly from `[lower, upper)` and
/// square the result `target_level` times.
pub fn random_ciphertext<E, R>(
    engine: &E,
    public_key: &E::PublicKey,
    lower: f64,
    upper: f64,
    slot_count: usize,
    target_level: usize,
    rng: &mut R,
) -> Result<E::Ciphertext>
where
    E: Encryption + ?Sized,
    R: Rng + ?Sized,
{
    random_ciphertext_with_values(engine, public_key, lower, upper, slot_count, target_level, rng).map(|(ct, _)| ct)
}

/// Like [`random_ciphertext`], also returning the sampled values as they
/// were before squaring.
pub fn random_ciphertext_with_values<E, R>(
    engine: &E,
    public_key: &E::PublicKey,
    lower: f64,
    upper: f64,
    slot_count: usize,
    target_level: usize,
    rng: &mut R,
) -> Result<(E::Ciphertext, Vec<f64>)>
where
    E: Encryption + ?Sized,
    R: Rng + ?Sized,
{
    let values = sample_values(lower, upper, slot_count, rng)?;
    let mut ct = engine.encrypt(public_key, &values)?;
    for _ in 0..target_level {
        engine.square_in_place(&mut ct)?;
    }
    Ok((ct, values))
}

/// Uniform samples on `[lower, upper)`.
///
/// The width `upper - lower` must itself be finite, otherwise the range is
/// rejected rather than handed to the sampler.
pub fn sample_values<R: Rng + ?Sized>(lower: f64, upper: f64, count: usize, rng: &mut R) -> Result<Vec<f64>> {
    if !(lower.is_finite() && upper.is_finite() && lower < upper && (upper - lower).is_finite()) {
        return Err(HeError::InvalidRange { lower, upper });
    }
    if count == 0 {
        return Err(HeError::EmptyPlaintext);
    }
    let dist = Uniform::new(lower, upper);
    Ok((0..count).map(|_| dist.sample(rng)).collect())
}
