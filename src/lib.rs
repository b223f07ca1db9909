//! Encrypted reciprocal approximation over a leveled CKKS algebra.
//!
//! Newton–Raphson and Goldschmidt inverters compute `1/b` for an encrypted
//! `b` without decrypting, stopping gracefully when the multiplicative depth
//! runs out. A reference engine, a range normalizer, a random
//! ciphertext-at-level generator and benchmark drivers come with them.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, missing_docs)]

pub mod error;
pub mod params;
pub mod cipher;
pub mod scheme;
pub mod algebra;
pub mod normalize;
pub mod random_ct;
pub mod inversion;
pub mod chebyshev;
pub mod harness;

pub use algebra::{CiphertextAlgebra, Encryption};
pub use chebyshev::chebyshev_inverse;
pub use cipher::Ciphertext;
pub use error::{HeError, Result};
pub use inversion::{goldschmidt_inverse, newton_inverse, DecryptingObserver, Inversion, IterationObserver, Silent};
pub use normalize::{normalize, Normalized};
pub use params::{CkksParams, SecurityLevel};
pub use random_ct::random_ciphertext;
pub use scheme::{CkksContext, KeyPair, PublicKey, SecretKey};
