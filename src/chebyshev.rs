//! Chebyshev series approximation of `1/x` on an interval.
//!
//! Evaluated with the three-term recurrence `T_{k+1} = 2·y·T_k − T_{k−1}`,
//! which costs one level per degree plus one for the coefficient products.

use std::f64::consts::PI;

use crate::{
    algebra::CiphertextAlgebra,
    error::{HeError, Result},
};

/// Chebyshev coefficients `c_0..=c_degree` of `f` on `[lower, upper]`,
/// interpolating at the Chebyshev nodes. The series is
/// `c_0/2 + Σ c_k·T_k(y)` with `y = (2x − (lower + upper)) / (upper − lower)`.
pub fn chebyshev_coefficients(lower: f64, upper: f64, degree: usize, f: impl Fn(f64) -> f64) -> Vec<f64> {
    let n = degree + 1;
    let half_width = (upper - lower) / 2.0;
    let mid = (upper + lower) / 2.0;
    let samples: Vec<f64> = (0..n)
        .map(|j| {
            let t = (PI * (j as f64 + 0.5) / n as f64).cos();
            f(t * half_width + mid)
        })
        .collect();

    (0..n)
        .map(|k| {
            let sum: f64 = samples
                .iter()
                .enumerate()
                .map(|(j, fx)| fx * (k as f64 * PI * (j as f64 + 0.5) / n as f64).cos())
                .sum();
            2.0 * sum / n as f64
        })
        .collect()
}

/// Evaluate a Chebyshev series on plaintext.
pub fn evaluate_series(coeffs: &[f64], lower: f64, upper: f64, x: f64) -> f64 {
    let y = (2.0 * x - (lower + upper)) / (upper - lower);
    let mut acc = coeffs.first().map_or(0.0, |c| c / 2.0);
    let (mut prev, mut cur) = (1.0, y);
    for (k, c) in coeffs.iter().enumerate().skip(1) {
        if k > 1 {
            let next = 2.0 * y * cur - prev;
            prev = cur;
            cur = next;
        }
        acc += c * cur;
    }
    acc
}

/// Approximate `1/x` for encrypted `ct` whose values lie in `[lower, upper]`.
///
/// Needs `degree + 1` levels above the level of `ct`. Any failure is fatal:
/// a partially summed series is not an approximation.
pub fn chebyshev_inverse<A>(
    alg: &A,
    ct: &A::Ciphertext,
    lower: f64,
    upper: f64,
    degree: usize,
) -> Result<A::Ciphertext>
where
    A: CiphertextAlgebra + ?Sized,
{
    if !(lower > 0.0 && lower < upper && upper.is_finite()) {
        return Err(HeError::DomainPrecondition(format!(
            "chebyshev inversion needs 0 < lower < upper, got [{lower}, {upper}]"
        )));
    }
    if degree == 0 {
        return Err(HeError::DomainPrecondition("chebyshev degree must be at least 1".into()));
    }

    let coeffs = chebyshev_coefficients(lower, upper, degree, |x| 1.0 / x);
    let width = upper - lower;

    // y in [-1, 1]
    let y = alg.mult_const(2.0 / width, ct)?;
    let y = alg.sub_const(&y, (lower + upper) / width)?;

    // T_0 = 1 stays a plaintext constant
    let mut prev: Option<A::Ciphertext> = None;
    let mut cur = y.clone();
    let mut acc = alg.mult_const(coeffs[1], &cur)?;
    for c in coeffs.iter().skip(2) {
        let prod = alg.mult(&y, &cur)?;
        let doubled = alg.add(&prod, &prod)?;
        let next = match &prev {
            Some(p) => alg.sub(&doubled, p)?,
            None => alg.sub_const(&doubled, 1.0)?,
        };
        prev = Some(cur);
        cur = next;
        let term = alg.mult_const(*c, &cur)?;
        acc = alg.add(&acc, &term)?;
    }
    alg.add_const(coeffs[0] / 2.0, &acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Encryption;
    use crate::params::CkksParams;
    use crate::scheme::CkksContext;

    #[test]
    fn test_series_matches_reciprocal() {
        let coeffs = chebyshev_coefficients(1.0, 2.0, 5, |x| 1.0 / x);
        assert_eq!(coeffs.len(), 6);
        for i in 0..=100 {
            let x = 1.0 + i as f64 / 100.0;
            assert!((evaluate_series(&coeffs, 1.0, 2.0, x) - 1.0 / x).abs() < 1e-4, "x = {}", x);
        }
    }

    #[test]
    fn test_series_reproduces_polynomials() {
        // a cubic is represented exactly by a degree-3 series
        let f = |x: f64| 2.0 * x * x * x - x + 0.5;
        let coeffs = chebyshev_coefficients(-1.0, 3.0, 3, f);
        for x in [-1.0, -0.3, 0.0, 1.7, 3.0] {
            assert!((evaluate_series(&coeffs, -1.0, 3.0, x) - f(x)).abs() < 1e-10);
        }
    }

    #[test]
    fn test_encrypted_chebyshev_inverse() {
        let ctx = CkksContext::with_seed(CkksParams::default(), 21).unwrap();
        let keys = ctx.keygen();
        let values = [1.0, 1.5, 1.9];
        let ct = ctx.encrypt(&keys.public_key, &values).unwrap();

        let inv = chebyshev_inverse(&ctx, &ct, 1.0, 2.0, 5).unwrap();
        assert_eq!(inv.level(), 6);
        let out = ctx.decrypt(&keys.secret_key, &inv).unwrap();
        for (o, v) in out.iter().zip(values.iter()) {
            assert!((o - 1.0 / v).abs() < 1e-4, "{} vs {}", o, 1.0 / v);
        }
    }

    #[test]
    fn test_degree_beyond_depth_fails() {
        let ctx = CkksContext::with_seed(CkksParams::default(), 22).unwrap();
        let keys = ctx.keygen();
        let ct = ctx.encrypt(&keys.public_key, &[1.5]).unwrap();
        let err = chebyshev_inverse(&ctx, &ct, 1.0, 2.0, 7).unwrap_err();
        assert!(err.is_depth_exceeded());
    }

    #[test]
    fn test_bad_interval_rejected() {
        let ctx = CkksContext::with_seed(CkksParams::default(), 23).unwrap();
        let keys = ctx.keygen();
        let ct = ctx.encrypt(&keys.public_key, &[1.5]).unwrap();
        for (lo, hi) in [(0.0, 2.0), (2.0, 1.0), (-1.0, 1.0)] {
            assert!(matches!(
                chebyshev_inverse(&ctx, &ct, lo, hi, 3),
                Err(HeError::DomainPrecondition(_))
            ));
        }
        assert!(chebyshev_inverse(&ctx, &ct, 1.0, 2.0, 0).is_err());
    }
}
