//! Error type shared by the algebra, the inverters and the harness.

use thiserror::Error;

/// Every failure the crate can report.
#[derive(Debug, Error)]
pub enum HeError {
    /// Parameters rejected while building a context.
    #[error("context setup failed: {0}")]
    ContextSetup(String),

    /// An operation would push a ciphertext past the multiplicative depth.
    #[error("multiplicative depth exceeded: operation needs level {required}, context allows {max}")]
    DepthExceeded {
        /// Level the operation would produce.
        required: usize,
        /// Depth ceiling of the context.
        max: usize,
    },

    /// An input lies outside the range an algorithm can work with.
    #[error("domain precondition violated: {0}")]
    DomainPrecondition(String),

    /// Operands come from different contexts.
    #[error("ciphertexts belong to different contexts ({left} vs {right})")]
    ContextMismatch {
        /// Context performing the operation.
        left: u64,
        /// Context the foreign operand belongs to.
        right: u64,
    },

    /// A key was used with a ciphertext or context it does not belong to.
    #[error("key {key} does not match ciphertext key {cipher}")]
    KeyMismatch {
        /// Key supplied.
        key: u64,
        /// Key the ciphertext was encrypted under.
        cipher: u64,
    },

    /// Plaintext longer than the context batch size.
    #[error("plaintext has {len} values but only {slots} slots are available")]
    SlotOverflow {
        /// Values supplied.
        len: usize,
        /// Slots available.
        slots: usize,
    },

    /// Nothing to encrypt.
    #[error("cannot encode an empty plaintext")]
    EmptyPlaintext,

    /// Sampling bounds are not a valid half-open interval.
    #[error("invalid sampling range [{lower}, {upper})")]
    InvalidRange {
        /// Requested lower bound.
        lower: f64,
        /// Requested upper bound.
        upper: f64,
    },

    /// CSV output failed.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// File system failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HeError {
    /// True when the failure is depth exhaustion.
    pub fn is_depth_exceeded(&self) -> bool {
        matches!(self, HeError::DepthExceeded { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, HeError>;
