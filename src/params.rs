//! CKKS context parameters and the estimates used to pick them.
//!
//! The security bound follows the usual lattice-estimator fit
//! `log2(Q) < 7.2·N / (λ + 110) + log2(σ)`, with the special modulus `P`
//! taken as a quarter of the ciphertext modulus chain.

use serde::{Deserialize, Serialize};

use crate::error::{HeError, Result};

/// Standard deviation of the error distribution.
pub const SIGMA: f64 = 3.19;

/// Hamming weight assumed for the secret key in noise estimates.
pub const DEFAULT_HAMMING_WEIGHT: u64 = 256;

/// Bit size of the first modulus `q0` used by the depth search.
pub const FIRST_MOD_BITS: u32 = 60;

/// Largest supported native modulus size in bits.
const MAX_MOD_BITS: u32 = 60;

/// Largest supported `log2(N)`.
const MAX_LOG2_RING_DIM: u32 = 17;

/// Target classical security level λ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// λ = 128
    Classic128,
    /// λ = 192
    Classic192,
    /// λ = 256
    Classic256,
    /// No security check; useful for toy rings.
    NotSet,
}

impl SecurityLevel {
    /// Map a λ value to a level. Unknown values fall back to `NotSet`.
    pub fn from_bits(lambda: u32) -> Self {
        match lambda {
            128 => SecurityLevel::Classic128,
            192 => SecurityLevel::Classic192,
            256 => SecurityLevel::Classic256,
            other => {
                tracing::warn!(lambda = other, "invalid security level, defaulting to NotSet");
                SecurityLevel::NotSet
            }
        }
    }

    /// λ in bits, `None` for [`SecurityLevel::NotSet`].
    pub fn bits(&self) -> Option<u32> {
        match self {
            SecurityLevel::Classic128 => Some(128),
            SecurityLevel::Classic192 => Some(192),
            SecurityLevel::Classic256 => Some(256),
            SecurityLevel::NotSet => None,
        }
    }
}

/// Parameters for a [`crate::CkksContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CkksParams {
    /// Security level checked by [`CkksParams::validate`].
    pub security_level: SecurityLevel,
    /// `N = 2^log2_ring_dim`
    pub log2_ring_dim: u32,
    /// Scaling modulus size Δ in bits
    pub scale_mod_size: u32,
    /// First modulus size q0 in bits
    pub first_mod_size: u32,
    /// Multiplicative depth L
    pub mult_depth: usize,
    /// Number of usable slots, at most N/2
    pub batch_size: usize,
}

impl Default for CkksParams {
    /// λ = 128, N = 2^16, Δ = 2^58, q0 = 2^60, L = 7, full batch.
    fn default() -> Self {
        Self {
            security_level: SecurityLevel::Classic128,
            log2_ring_dim: 16,
            scale_mod_size: 58,
            first_mod_size: 60,
            mult_depth: 7,
            batch_size: 1 << 15,
        }
    }
}

impl CkksParams {
    /// Same as [`Default`] with a different depth ceiling.
    pub fn with_depth(mult_depth: usize) -> Self {
        Self {
            mult_depth,
            ..Self::default()
        }
    }

    /// Ring dimension `N`.
    pub fn ring_dim(&self) -> u64 {
        1u64 << self.log2_ring_dim
    }

    /// Total modulus size `log2(qP)` with `P = q/4`.
    pub fn log2_modulus(&self) -> f64 {
        let log2_q = self.first_mod_size as f64 + self.mult_depth as f64 * self.scale_mod_size as f64;
        log2_q + log2_q / 4.0
    }

    /// Expected decryption precision in bits.
    pub fn log2_precision(&self) -> i64 {
        let bc = b_clean(self.ring_dim(), DEFAULT_HAMMING_WEIGHT);
        log2_precision(self.scale_mod_size, bc)
    }

    /// Reject parameters no context can be built from, including chains too
    /// large for the security level.
    pub fn validate(&self) -> Result<()> {
        if self.log2_ring_dim == 0 || self.log2_ring_dim > MAX_LOG2_RING_DIM {
            return Err(HeError::ContextSetup(format!(
                "ring dimension 2^{} outside 2^1..2^{}",
                self.log2_ring_dim, MAX_LOG2_RING_DIM
            )));
        }
        for (name, bits) in [("scale_mod_size", self.scale_mod_size), ("first_mod_size", self.first_mod_size)] {
            if bits == 0 || bits > MAX_MOD_BITS {
                return Err(HeError::ContextSetup(format!("{name} = {bits} outside 1..={MAX_MOD_BITS}")));
            }
        }
        let max_slots = (self.ring_dim() / 2) as usize;
        if self.batch_size == 0 || self.batch_size > max_slots {
            return Err(HeError::ContextSetup(format!(
                "batch size {} outside 1..={}",
                self.batch_size, max_slots
            )));
        }
        if let Some(lambda) = self.security_level.bits() {
            let bound = upper_bound_log_q(lambda, self.ring_dim());
            if self.log2_modulus() > bound as f64 {
                return Err(HeError::ContextSetup(format!(
                    "modulus of {:.1} bits exceeds the {}-bit bound for λ = {} and N = {}",
                    self.log2_modulus(),
                    bound,
                    lambda,
                    self.ring_dim()
                )));
            }
        }
        Ok(())
    }
}

/// Upper bound on `log2(Q)` for security level `lambda` and ring dimension `n`.
pub fn upper_bound_log_q(lambda: u32, n: u64) -> u64 {
    ((7.2 * n as f64) / (lambda as f64 + 110.0) + SIGMA.log2()).floor() as u64
}

/// Split `log2(Q)` into `(log2 q, log2 P)` with `q = Q^(4/5)`.
pub fn split_log_q(log_q: u64) -> (u64, u64) {
    ((4 * log_q) / 5, log_q / 5)
}

/// Fresh-encryption noise bound `B_clean` for ring dimension `n`
/// and secret Hamming weight `h`.
pub fn b_clean(n: u64, h: u64) -> f64 {
    let n = n as f64;
    8.0 * SIGMA * n * 2f64.sqrt() + 6.0 * n.sqrt() + 16.0 * (h as f64 * n).sqrt()
}

/// Smallest `log2(Δ)` that keeps the fresh noise below the scale.
pub fn log2_delta_lower_bound(n: u64, h: u64) -> u32 {
    (n as f64 + 2.0 * b_clean(n, h)).log2().ceil() as u32
}

/// `⌊log2 Δ − log2 B_clean⌋`, the precision expected after encoding.
pub fn log2_precision(log2_delta: u32, b_clean: f64) -> i64 {
    (log2_delta as f64 - b_clean.log2()).floor() as i64
}

/// Largest depth supported by a given scale, security level and ring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthPlan {
    /// Largest depth `L`.
    pub depth: usize,
    /// `log2 q` of the chain `q0 + L·Δ`.
    pub log2_q: f64,
    /// `log2 P`, a quarter of `log2 q`.
    pub log2_p: f64,
    /// `log2(qP)`.
    pub log2_big_q: f64,
    /// Scaling modulus size the plan was made for.
    pub log2_delta: u32,
    /// Expected precision in bits.
    pub log2_precision: i64,
}

/// Grow `L` until the modulus chain `q0 + L·Δ` (plus `P = q/4`) breaks the
/// security bound, then step back one.
pub fn max_depth(log2_delta: u32, lambda: u32, n: u64, b_clean: f64) -> DepthPlan {
    let chain = |depth: usize| {
        let log2_q = FIRST_MOD_BITS as f64 + depth as f64 * log2_delta as f64;
        let log2_p = log2_q / 4.0;
        (log2_q, log2_p, log2_q + log2_p)
    };

    let mut depth = 1usize;
    loop {
        let (_, _, log2_big_q) = chain(depth);
        if (lambda as f64 + 110.0) * (log2_big_q - SIGMA.log2()) / 7.2 >= n as f64 {
            break;
        }
        depth += 1;
    }
    depth -= 1;
    let (log2_q, log2_p, log2_big_q) = chain(depth);
    DepthPlan {
        depth,
        log2_q,
        log2_p,
        log2_big_q,
        log2_delta,
        log2_precision: log2_precision(log2_delta, b_clean),
    }
}
