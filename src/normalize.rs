//! Plaintext range normalization for Goldschmidt inversion.
//!
//! Goldschmidt only converges for inputs in `(0, 2)`, so a magnitude is
//! divided down before encryption and the accumulated factor is reapplied to
//! the decrypted reciprocal.

use crate::error::{HeError, Result};

/// Divisor used when a magnitude lands exactly on the boundary value 2.
pub const BOUNDARY_DIVISOR: f64 = 1.6;

/// A magnitude mapped into `(0, 2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normalized {
    /// Value in `(0, 2)` to encrypt.
    pub value: f64,
    /// `|original| == value * factor`
    pub factor: f64,
    /// Sign of the original input.
    pub negative: bool,
    /// Loop passes taken.
    pub steps: u32,
}

impl Normalized {
    /// Turn the decrypted reciprocal of [`Normalized::value`] into the
    /// reciprocal of the original input: `1/x = ±(1/value) / factor`.
    pub fn restore_reciprocal(&self, normalized_reciprocal: f64) -> f64 {
        let r = normalized_reciprocal / self.factor;
        if self.negative {
            -r
        } else {
            r
        }
    }

    /// The original input, sign included.
    pub fn original(&self) -> f64 {
        let m = self.value * self.factor;
        if self.negative {
            -m
        } else {
            m
        }
    }
}

/// Scale `magnitude` into `(0, 2)`.
///
/// Non-positive inputs are replaced by their absolute value and flagged in
/// [`Normalized::negative`]. Zero, NaN and infinities have no such scaling.
#[allow(clippy::float_cmp)]
pub fn normalize(magnitude: f64) -> Result<Normalized> {
    if !magnitude.is_finite() || magnitude == 0.0 {
        return Err(HeError::DomainPrecondition(format!(
            "cannot scale {magnitude} into (0, 2)"
        )));
    }

    let negative = magnitude < 0.0;
    let mut m = magnitude;
    if m <= 0.0 {
        tracing::warn!(input = magnitude, "non-positive input, taking absolute value");
        m = m.abs();
    }

    let mut factor = 1.0;
    let mut steps = 0;
    while m >= 2.0 || m <= 0.0 {
        if m > 2.0 {
            m /= 2.0;
            factor *= 2.0;
        } else if m == 2.0 {
            m /= BOUNDARY_DIVISOR;
            factor *= BOUNDARY_DIVISOR;
        } else {
            // unreachable once the absolute value has been taken
            tracing::error!(value = m, "non-positive value after scaling, giving up");
            break;
        }
        steps += 1;
    }

    Ok(Normalized {
        value: m,
        factor,
        negative,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_five() {
        let n = normalize(5.0).unwrap();
        assert_eq!(n.value, 1.25);
        assert_eq!(n.factor, 4.0);
        assert_eq!(n.steps, 2);
        assert!(!n.negative);
    }

    #[test]
    fn test_exact_boundary_uses_special_divisor() {
        let n = normalize(2.0).unwrap();
        assert!((n.value - 1.25).abs() < 1e-15);
        assert!((n.factor - 1.6).abs() < 1e-15);
        assert_eq!(n.steps, 1);
    }

    #[test]
    fn test_halving_onto_boundary() {
        // 4 -> 2 (x2) -> 1.25 (x1.6)
        let n = normalize(4.0).unwrap();
        assert!((n.value - 1.25).abs() < 1e-15);
        assert!((n.factor - 3.2).abs() < 1e-12);
        assert_eq!(n.steps, 2);
    }

    #[test]
    fn test_in_range_untouched() {
        for x in [1e-9, 0.5, 1.0, 1.999] {
            let n = normalize(x).unwrap();
            assert_eq!(n.value, x);
            assert_eq!(n.factor, 1.0);
            assert_eq!(n.steps, 0);
        }
    }

    #[test]
    fn test_negative_input() {
        let n = normalize(-5.0).unwrap();
        assert!(n.negative);
        assert_eq!(n.value, 1.25);
        assert_eq!(n.original(), -5.0);
        assert!((n.restore_reciprocal(1.0 / 1.25) + 0.2).abs() < 1e-15);
    }

    #[test]
    fn test_unscalable_inputs() {
        for x in [0.0, -0.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(normalize(x), Err(HeError::DomainPrecondition(_))), "input {}", x);
        }
    }

    #[test]
    fn test_round_trip_and_step_bound() {
        for p in [2.5, 3.0, 7.0, 16.0, 100.0, 1024.0, 12345.678, 1e12] {
            let n = normalize(p).unwrap();
            assert!(n.value > 0.0 && n.value < 2.0, "p = {} gave {}", p, n.value);
            assert!((n.value * n.factor - p).abs() <= 1e-12 * p, "p = {}", p);
            let bound = (p.ln() / BOUNDARY_DIVISOR.ln()).ceil() as u32 + 1;
            assert!(n.steps <= bound, "p = {} took {} steps", p, n.steps);
            assert!((n.restore_reciprocal(1.0 / n.value) - 1.0 / p).abs() <= 1e-12 / p);
        }
    }
}
