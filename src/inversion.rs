//! Encrypted reciprocal approximation.
//!
//! Both methods run entirely on ciphertexts and never decrypt. Each
//! refinement step costs two multiplicative levels, so the number of useful
//! iterations is bounded by the context depth. The methods fail in two
//! different ways:
//!
//! * if the initial step fails, there is nothing to return and the error is
//!   propagated;
//! * if a refinement step fails (normally [`HeError::DepthExceeded`]), the
//!   loop stops and the last good approximation is returned, with the error
//!   kept in [`Inversion::stopped_by`].

use tracing::{debug, error, warn};

use crate::{
    algebra::{CiphertextAlgebra, Encryption},
    error::{HeError, Result},
};

/// Hook called after every completed refinement step.
pub trait IterationObserver<C> {
    /// Called with the zero-based iteration index and the new approximation.
    fn observe(&mut self, iteration: usize, approximation: &C);
}

impl<C, F> IterationObserver<C> for F
where
    F: FnMut(usize, &C),
{
    fn observe(&mut self, iteration: usize, approximation: &C) {
        self(iteration, approximation)
    }
}

/// Observer that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl<C> IterationObserver<C> for Silent {
    fn observe(&mut self, _iteration: usize, _approximation: &C) {}
}

/// Diagnostic observer: decrypts slot 0 of every approximation, logs it and
/// keeps the trace.
pub struct DecryptingObserver<'a, E: Encryption> {
    engine: &'a E,
    secret_key: &'a E::SecretKey,
    /// Decrypted slot 0 after each iteration.
    pub trace: Vec<f64>,
}

impl<'a, E: Encryption> DecryptingObserver<'a, E> {
    /// Observer decrypting with `secret_key`.
    pub fn new(engine: &'a E, secret_key: &'a E::SecretKey) -> Self {
        Self {
            engine,
            secret_key,
            trace: Vec::new(),
        }
    }
}

impl<E: Encryption> IterationObserver<E::Ciphertext> for DecryptingObserver<'_, E> {
    fn observe(&mut self, iteration: usize, approximation: &E::Ciphertext) {
        match self.engine.decrypt(self.secret_key, approximation) {
            Ok(values) => {
                if let Some(&v) = values.first() {
                    debug!(iteration, approximation = v, "intermediate reciprocal");
                    self.trace.push(v);
                }
            }
            Err(e) => warn!(iteration, error = %e, "could not decrypt intermediate value"),
        }
    }
}

/// Result of an inversion.
#[derive(Debug)]
pub struct Inversion<C> {
    /// Encrypted approximation of the reciprocal.
    pub value: C,
    /// Refinement iterations actually completed.
    pub iterations: usize,
    /// Error that ended the loop early, if any.
    pub stopped_by: Option<HeError>,
}

impl<C> Inversion<C> {
    /// True when fewer iterations ran than were requested.
    pub fn truncated(&self) -> bool {
        self.stopped_by.is_some()
    }

    /// Drop the bookkeeping and keep the ciphertext.
    pub fn into_value(self) -> C {
        self.value
    }
}

/// Newton–Raphson reciprocal of `b` from the plaintext guess `x0`.
///
/// `z₀ = x0·(2 − x0·b)`, then `z ← z·(2 − z·b)` up to `max_iterations`
/// times. Converges quadratically when `|1 − x0·b| < 1`, which is not
/// checked.
pub fn newton_inverse<A, O>(
    alg: &A,
    b: &A::Ciphertext,
    x0: f64,
    max_iterations: usize,
    observer: &mut O,
) -> Result<Inversion<A::Ciphertext>>
where
    A: CiphertextAlgebra + ?Sized,
    O: IterationObserver<A::Ciphertext> + ?Sized,
{
    let init = alg
        .mult_const(x0, b)
        .and_then(|xb| alg.sub_from_const(2.0, &xb))
        .and_then(|t| alg.mult_const(x0, &t));
    let mut z = match init {
        Ok(z) => z,
        Err(e) => {
            error!(error = %e, "newton initialization failed");
            return Err(e);
        }
    };

    let mut iterations = 0;
    let mut stopped_by = None;
    for i in 0..max_iterations {
        let step = alg
            .mult(&z, b)
            .and_then(|zb| alg.sub_from_const(2.0, &zb))
            .and_then(|t| alg.mult(&z, &t));
        match step {
            Ok(next) => {
                z = next;
                iterations += 1;
                observer.observe(i, &z);
            }
            Err(e) => {
                warn!(iteration = i, error = %e, "newton iteration failed, keeping last approximation");
                stopped_by = Some(e);
                break;
            }
        }
    }

    Ok(Inversion {
        value: z,
        iterations,
        stopped_by,
    })
}

/// Goldschmidt reciprocal of `cx`, which must lie in `(0, 2)` (not checked).
///
/// `a = 2 − cx`, `b = 1 − cx`, then `b ← b²`, `a ← a·(1 + b)` up to
/// `max_iterations` times.
pub fn goldschmidt_inverse<A, O>(
    alg: &A,
    cx: &A::Ciphertext,
    max_iterations: usize,
    observer: &mut O,
) -> Result<Inversion<A::Ciphertext>>
where
    A: CiphertextAlgebra + ?Sized,
    O: IterationObserver<A::Ciphertext> + ?Sized,
{
    let init = alg
        .sub_from_const(2.0, cx)
        .and_then(|a| alg.sub_from_const(1.0, cx).map(|b| (a, b)));
    let (mut a, mut b) = match init {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "goldschmidt initialization failed");
            return Err(e);
        }
    };

    let mut iterations = 0;
    let mut stopped_by = None;
    for i in 0..max_iterations {
        let step = alg
            .square_in_place(&mut b)
            .and_then(|()| alg.add_const(1.0, &b))
            .and_then(|t| alg.mult(&a, &t));
        match step {
            Ok(next) => {
                a = next;
                iterations += 1;
                observer.observe(i, &a);
            }
            Err(e) => {
                warn!(iteration = i, error = %e, "goldschmidt iteration failed, keeping last approximation");
                stopped_by = Some(e);
                break;
            }
        }
    }

    Ok(Inversion {
        value: a,
        iterations,
        stopped_by,
    })
}
