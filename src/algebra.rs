//! Homomorphic add / sub / mult with a depth ceiling.
//!
//! [`CiphertextAlgebra`] is the whole contract the reciprocal algorithms
//! rely on. [`Encryption`] adds the key boundary used by the ciphertext
//! factory, the diagnostics observer and the harness.

use itertools::{EitherOrBoth, Itertools};

use crate::{
    cipher::Ciphertext,
    error::{HeError, Result},
    scheme::CkksContext,
};

/// Arithmetic on encrypted packed reals.
///
/// Every method returns a fresh ciphertext except [`square_in_place`],
/// which must leave its argument untouched when it fails.
///
/// [`square_in_place`]: CiphertextAlgebra::square_in_place
pub trait CiphertextAlgebra {
    /// Encrypted value handled by the engine.
    type Ciphertext: Clone;

    /// Largest level any ciphertext may reach.
    fn max_depth(&self) -> usize;

    /// Level consumed by `ct` so far.
    fn level(&self, ct: &Self::Ciphertext) -> usize;

    /// `a + b`
    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// `a - b`
    fn sub(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// `constant + ct`
    fn add_const(&self, constant: f64, ct: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// `ct - constant`
    fn sub_const(&self, ct: &Self::Ciphertext, constant: f64) -> Result<Self::Ciphertext>;

    /// `constant - ct`
    fn sub_from_const(&self, constant: f64, ct: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// `constant * ct`, rescaled (one level).
    fn mult_const(&self, constant: f64, ct: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Raw tensor product without relinearization (one level).
    fn mult_no_relin(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Reduce a raw product back to two components.
    fn relinearize(&self, ct: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// `a * b`, relinearized and rescaled (one level).
    fn mult(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext> {
        let raw = self.mult_no_relin(a, b)?;
        self.relinearize(&raw)
    }

    /// `ct = ct * ct` (one level).
    fn square_in_place(&self, ct: &mut Self::Ciphertext) -> Result<()> {
        let squared = self.mult(&*ct, &*ct)?;
        *ct = squared;
        Ok(())
    }
}

/// Key boundary of an engine.
pub trait Encryption: CiphertextAlgebra {
    /// Key used to encrypt.
    type PublicKey;
    /// Key used to decrypt.
    type SecretKey;

    /// Encrypt `values` into the first slots of a fresh ciphertext.
    fn encrypt(&self, public_key: &Self::PublicKey, values: &[f64]) -> Result<Self::Ciphertext>;

    /// Decrypt every slot of `ct`.
    fn decrypt(&self, secret_key: &Self::SecretKey, ct: &Self::Ciphertext) -> Result<Vec<f64>>;
}

impl CkksContext {
    /// Level after a rescaling product of ciphertexts at `levels`.
    fn product_level(&self, levels: &[usize]) -> Result<usize> {
        let required = levels.iter().copied().max().unwrap_or(0) + 1;
        let max = self.params().mult_depth;
        if required > max {
            return Err(HeError::DepthExceeded { required, max });
        }
        Ok(required)
    }

    fn check_pair(&self, a: &Ciphertext, b: &Ciphertext) -> Result<()> {
        self.check_context(a)?;
        self.check_context(b)?;
        if a.key_id != b.key_id {
            return Err(HeError::KeyMismatch {
                key: a.key_id,
                cipher: b.key_id,
            });
        }
        Ok(())
    }

    /// Slot-wise combination; missing slots encode zero.
    fn combine(&self, a: &Ciphertext, b: &Ciphertext, op: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        a.slots
            .iter()
            .zip_longest(b.slots.iter())
            .map(|pair| match pair {
                EitherOrBoth::Both(x, y) => op(*x, *y),
                EitherOrBoth::Left(x) => op(*x, 0.0),
                EitherOrBoth::Right(y) => op(0.0, *y),
            })
            .collect()
    }

    fn additive(&self, a: &Ciphertext, b: &Ciphertext, op: impl Fn(f64, f64) -> f64) -> Result<Ciphertext> {
        self.check_pair(a, b)?;
        Ok(Ciphertext {
            slots: self.combine(a, b, op),
            level: a.level.max(b.level),
            scale: a.scale,
            components: a.components.max(b.components),
            context_id: a.context_id,
            key_id: a.key_id,
        })
    }

    fn map_slots(&self, ct: &Ciphertext, op: impl Fn(f64) -> f64) -> Result<Ciphertext> {
        self.check_context(ct)?;
        Ok(Ciphertext {
            slots: ct.slots.iter().map(|&v| op(v)).collect(),
            ..ct.clone()
        })
    }
}

impl CiphertextAlgebra for CkksContext {
    type Ciphertext = Ciphertext;

    fn max_depth(&self) -> usize {
        self.params().mult_depth
    }

    fn level(&self, ct: &Ciphertext) -> usize {
        ct.level
    }

    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.additive(a, b, |x, y| x + y)
    }

    fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.additive(a, b, |x, y| x - y)
    }

    fn add_const(&self, constant: f64, ct: &Ciphertext) -> Result<Ciphertext> {
        self.map_slots(ct, |v| constant + v)
    }

    fn sub_const(&self, ct: &Ciphertext, constant: f64) -> Result<Ciphertext> {
        self.map_slots(ct, |v| v - constant)
    }

    fn sub_from_const(&self, constant: f64, ct: &Ciphertext) -> Result<Ciphertext> {
        self.map_slots(ct, |v| constant - v)
    }

    fn mult_const(&self, constant: f64, ct: &Ciphertext) -> Result<Ciphertext> {
        self.check_context(ct)?;
        let level = self.product_level(&[ct.level])?;
        let mut out = self.map_slots(ct, |v| constant * v)?;
        self.perturb(&mut out.slots);
        out.level = level;
        Ok(out)
    }

    fn mult_no_relin(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_pair(a, b)?;
        let level = self.product_level(&[a.level, b.level])?;
        let mut slots = self.combine(a, b, |x, y| x * y);
        self.perturb(&mut slots);
        Ok(Ciphertext {
            slots,
            level,
            scale: a.scale,
            components: a.components + b.components - 1,
            context_id: a.context_id,
            key_id: a.key_id,
        })
    }

    fn relinearize(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.check_context(ct)?;
        Ok(Ciphertext {
            components: 2,
            ..ct.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CkksParams;
    use crate::scheme::KeyPair;

    const TOL: f64 = 1e-8;

    fn setup(depth: usize) -> (CkksContext, KeyPair) {
        let ctx = CkksContext::with_seed(CkksParams::with_depth(depth), 11).unwrap();
        let keys = ctx.keygen();
        (ctx, keys)
    }

    fn first(ctx: &CkksContext, keys: &KeyPair, ct: &Ciphertext) -> f64 {
        ctx.decrypt(&keys.secret_key, ct).unwrap()[0]
    }

    #[test]
    fn test_constant_operations() {
        let (ctx, keys) = setup(4);
        let ct = ctx.encrypt(&keys.public_key, &[1.5]).unwrap();

        assert!((first(&ctx, &keys, &ctx.add_const(2.0, &ct).unwrap()) - 3.5).abs() < TOL);
        assert!((first(&ctx, &keys, &ctx.sub_const(&ct, 2.0).unwrap()) + 0.5).abs() < TOL);
        assert!((first(&ctx, &keys, &ctx.sub_from_const(2.0, &ct).unwrap()) - 0.5).abs() < TOL);

        let scaled = ctx.mult_const(0.4, &ct).unwrap();
        assert!((first(&ctx, &keys, &scaled) - 0.6).abs() < TOL);
        assert_eq!(scaled.level(), 1);

        // additive constants do not consume depth
        assert_eq!(ctx.add_const(1.0, &ct).unwrap().level(), 0);
    }

    #[test]
    fn test_ciphertext_operations() {
        let (ctx, keys) = setup(4);
        let a = ctx.encrypt(&keys.public_key, &[1.5, 2.0]).unwrap();
        let b = ctx.encrypt(&keys.public_key, &[0.5, -1.0]).unwrap();

        let sum = ctx.decrypt(&keys.secret_key, &ctx.add(&a, &b).unwrap()).unwrap();
        let diff = ctx.decrypt(&keys.secret_key, &ctx.sub(&a, &b).unwrap()).unwrap();
        let prod = ctx.decrypt(&keys.secret_key, &ctx.mult(&a, &b).unwrap()).unwrap();
        assert!((sum[0] - 2.0).abs() < TOL && (sum[1] - 1.0).abs() < TOL);
        assert!((diff[0] - 1.0).abs() < TOL && (diff[1] - 3.0).abs() < TOL);
        assert!((prod[0] - 0.75).abs() < TOL && (prod[1] + 2.0).abs() < TOL);
    }

    #[test]
    fn test_levels_follow_deepest_operand() {
        let (ctx, keys) = setup(5);
        let a = ctx.encrypt(&keys.public_key, &[1.1]).unwrap();
        let mut b = a.clone();
        ctx.square_in_place(&mut b).unwrap();
        ctx.square_in_place(&mut b).unwrap();
        assert_eq!(b.level(), 2);

        assert_eq!(ctx.add(&a, &b).unwrap().level(), 2);
        assert_eq!(ctx.mult(&a, &b).unwrap().level(), 3);
        assert!((first(&ctx, &keys, &b) - 1.1f64.powi(4)).abs() < 1e-7);
    }

    #[test]
    fn test_depth_ceiling_enforced() {
        let (ctx, keys) = setup(2);
        let mut ct = ctx.encrypt(&keys.public_key, &[0.9]).unwrap();
        ctx.square_in_place(&mut ct).unwrap();
        ctx.square_in_place(&mut ct).unwrap();
        assert_eq!(ct.level(), ctx.max_depth());

        let before = first(&ctx, &keys, &ct);
        let err = ctx.square_in_place(&mut ct).unwrap_err();
        assert!(matches!(err, HeError::DepthExceeded { required: 3, max: 2 }));
        // a failed square leaves the operand as it was
        assert_eq!(ct.level(), 2);
        assert!((first(&ctx, &keys, &ct) - before).abs() < 1e-7);

        assert!(ctx.mult_const(2.0, &ct).unwrap_err().is_depth_exceeded());
    }

    #[test]
    fn test_relinearization_tracks_components() {
        let (ctx, keys) = setup(3);
        let a = ctx.encrypt(&keys.public_key, &[2.0]).unwrap();
        let raw = ctx.mult_no_relin(&a, &a).unwrap();
        assert_eq!(raw.components(), 3);
        let relin = ctx.relinearize(&raw).unwrap();
        assert_eq!(relin.components(), 2);
        assert_eq!(relin.level(), 1);
        assert!((first(&ctx, &keys, &relin) - 4.0).abs() < TOL);
    }

    #[test]
    fn test_mixed_lengths_pad_with_zero() {
        let (ctx, keys) = setup(3);
        let a = ctx.encrypt(&keys.public_key, &[1.0, 2.0, 3.0]).unwrap();
        let b = ctx.encrypt(&keys.public_key, &[1.0]).unwrap();
        let sum = ctx.decrypt(&keys.secret_key, &ctx.add(&a, &b).unwrap()).unwrap();
        assert_eq!(sum.len(), 3);
        assert!((sum[2] - 3.0).abs() < TOL);
    }

    #[test]
    fn test_operands_from_different_keys_rejected() {
        let (ctx, alice) = setup(3);
        let bob = ctx.keygen();
        let a = ctx.encrypt(&alice.public_key, &[1.0]).unwrap();
        let b = ctx.encrypt(&bob.public_key, &[1.0]).unwrap();
        assert!(matches!(ctx.add(&a, &b), Err(HeError::KeyMismatch { .. })));
    }
}
