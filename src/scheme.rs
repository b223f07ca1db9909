//! Reference CKKS engine: key generation, encryption & decryption.
//!
//! The engine keeps packed reals in the clear and reproduces what the
//! reciprocal algorithms observe from a real leveled CKKS backend: per
//! ciphertext levels, a hard depth ceiling, a fixed scale after rescaling,
//! Gaussian encoding noise, and ciphertexts bound to one context and key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::{
    algebra::Encryption,
    cipher::Ciphertext,
    error::{HeError, Result},
    params::CkksParams,
};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Encryption key bound to one context.
#[derive(Clone, Debug)]
pub struct PublicKey {
    context_id: u64,
    key_id: u64,
}

/// Decryption key bound to one context.
#[derive(Clone, Debug)]
pub struct SecretKey {
    context_id: u64,
    key_id: u64,
}

/// Matching public and secret keys.
#[derive(Clone, Debug)]
pub struct KeyPair {
    /// Encrypts.
    pub public_key: PublicKey,
    /// Decrypts.
    pub secret_key: SecretKey,
}

/// Main state object (parameters, noise source, key counter).
pub struct CkksContext {
    params: CkksParams,
    id: u64,
    noise: Normal<f64>,
    rng: Mutex<StdRng>,
    next_key_id: AtomicU64,
}

impl CkksContext {
    /// Validate `params` and build a context with an entropy-seeded noise source.
    pub fn new(params: CkksParams) -> Result<Self> {
        Self::build(params, StdRng::from_entropy())
    }

    /// Deterministic noise, for tests and reproducible sweeps.
    pub fn with_seed(params: CkksParams, seed: u64) -> Result<Self> {
        Self::build(params, StdRng::seed_from_u64(seed))
    }

    fn build(params: CkksParams, rng: StdRng) -> Result<Self> {
        params.validate()?;
        let bits = params.log2_precision().max(1);
        let noise = Normal::new(0.0, 2f64.powi(-(bits as i32)))
            .map_err(|e| HeError::ContextSetup(format!("noise distribution: {e}")))?;
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            context = id,
            ring_dim = params.ring_dim(),
            depth = params.mult_depth,
            precision_bits = bits,
            "created CKKS context"
        );
        Ok(Self {
            params,
            id,
            noise,
            rng: Mutex::new(rng),
            next_key_id: AtomicU64::new(1),
        })
    }

    /// Parameters the context was built with.
    pub fn params(&self) -> &CkksParams {
        &self.params
    }

    /// Process-unique context identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Usable slots per ciphertext.
    pub fn slots(&self) -> usize {
        self.params.batch_size
    }

    /// Encoding scale Δ = 2^scale_mod_size.
    pub fn scale(&self) -> f64 {
        2f64.powi(self.params.scale_mod_size as i32)
    }

    /// Generate a fresh key pair; ciphertexts under different pairs do not mix.
    pub fn keygen(&self) -> KeyPair {
        let key_id = self.next_key_id.fetch_add(1, Ordering::Relaxed);
        KeyPair {
            public_key: PublicKey {
                context_id: self.id,
                key_id,
            },
            secret_key: SecretKey {
                context_id: self.id,
                key_id,
            },
        }
    }

    /// Add fresh encoding noise to every slot.
    pub(crate) fn perturb(&self, values: &mut [f64]) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for v in values.iter_mut() {
            *v += self.noise.sample(&mut *rng);
        }
    }

    pub(crate) fn check_context(&self, ct: &Ciphertext) -> Result<()> {
        if ct.context_id != self.id {
            return Err(HeError::ContextMismatch {
                left: self.id,
                right: ct.context_id,
            });
        }
        Ok(())
    }

    fn check_key(&self, context_id: u64, key_id: u64, ct: Option<&Ciphertext>) -> Result<()> {
        if context_id != self.id {
            return Err(HeError::ContextMismatch {
                left: self.id,
                right: context_id,
            });
        }
        if let Some(ct) = ct {
            self.check_context(ct)?;
            if ct.key_id != key_id {
                return Err(HeError::KeyMismatch {
                    key: key_id,
                    cipher: ct.key_id,
                });
            }
        }
        Ok(())
    }
}

impl Encryption for CkksContext {
    type PublicKey = PublicKey;
    type SecretKey = SecretKey;

    /// Encode `values` into the first slots and encrypt at level 0.
    fn encrypt(&self, public_key: &PublicKey, values: &[f64]) -> Result<Ciphertext> {
        self.check_key(public_key.context_id, public_key.key_id, None)?;
        if values.is_empty() {
            return Err(HeError::EmptyPlaintext);
        }
        if values.len() > self.slots() {
            return Err(HeError::SlotOverflow {
                len: values.len(),
                slots: self.slots(),
            });
        }
        let mut slots = values.to_vec();
        self.perturb(&mut slots);
        Ok(Ciphertext {
            slots,
            level: 0,
            scale: self.scale(),
            components: 2,
            context_id: self.id,
            key_id: public_key.key_id,
        })
    }

    fn decrypt(&self, secret_key: &SecretKey, ct: &Ciphertext) -> Result<Vec<f64>> {
        self.check_key(secret_key.context_id, secret_key.key_id, Some(ct))?;
        let mut values = ct.slots.clone();
        self.perturb(&mut values);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::CiphertextAlgebra;
    use crate::params::SecurityLevel;

    fn context() -> CkksContext {
        CkksContext::with_seed(CkksParams::default(), 1).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let ctx = context();
        let keys = ctx.keygen();
        let values = [1.5, -0.25, 3.0, 0.0];

        let ct = ctx.encrypt(&keys.public_key, &values).unwrap();
        assert_eq!(ct.level(), 0);
        assert_eq!(ct.components(), 2);
        assert_eq!(ct.len(), values.len());
        assert_eq!(ct.scale(), 2f64.powi(58));

        let decrypted = ctx.decrypt(&keys.secret_key, &ct).unwrap();
        for (d, v) in decrypted.iter().zip(values.iter()) {
            assert!((d - v).abs() < 1e-8, "decrypted {} expected {}", d, v);
        }
    }

    #[test]
    fn test_wrong_secret_key_rejected() {
        let ctx = context();
        let alice = ctx.keygen();
        let bob = ctx.keygen();
        let ct = ctx.encrypt(&alice.public_key, &[1.0]).unwrap();
        assert!(matches!(
            ctx.decrypt(&bob.secret_key, &ct),
            Err(HeError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn test_foreign_context_rejected() {
        let ctx = context();
        let other = context();
        let keys = other.keygen();
        assert!(matches!(
            ctx.encrypt(&keys.public_key, &[1.0]),
            Err(HeError::ContextMismatch { .. })
        ));

        let ct = other.encrypt(&keys.public_key, &[1.0]).unwrap();
        assert!(ctx.mult(&ct, &ct).is_err());
    }

    #[test]
    fn test_plaintext_bounds() {
        let params = CkksParams {
            security_level: SecurityLevel::NotSet,
            log2_ring_dim: 4,
            batch_size: 8,
            ..CkksParams::default()
        };
        let ctx = CkksContext::with_seed(params, 3).unwrap();
        let keys = ctx.keygen();
        assert!(matches!(ctx.encrypt(&keys.public_key, &[]), Err(HeError::EmptyPlaintext)));
        assert!(matches!(
            ctx.encrypt(&keys.public_key, &[0.5; 9]),
            Err(HeError::SlotOverflow { len: 9, slots: 8 })
        ));
    }

    #[test]
    fn test_invalid_params_fail_setup() {
        let params = CkksParams {
            batch_size: 0,
            ..CkksParams::default()
        };
        assert!(matches!(CkksContext::new(params), Err(HeError::ContextSetup(_))));
    }

    #[test]
    fn test_context_is_shareable_across_threads() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<CkksContext>();
    }
}
