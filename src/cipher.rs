//! CKKS ciphertext container.

/// Packed encrypted reals plus the bookkeeping the algebra enforces.
///
/// Slots are private; the only way to read them is
/// [`crate::Encryption::decrypt`] with the matching secret key.
#[derive(Clone, Debug)]
pub struct Ciphertext {
    pub(crate) slots: Vec<f64>,
    pub(crate) level: usize,
    pub(crate) scale: f64,
    pub(crate) components: usize,
    pub(crate) context_id: u64,
    pub(crate) key_id: u64,
}

impl Ciphertext {
    /// Multiplicative levels consumed so far.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Encoding scale Δ.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Polynomial components: 2 when relinearized, 3 after a raw product.
    pub fn components(&self) -> usize {
        self.components
    }

    /// Number of packed values.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no values are packed.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Identifier of the context that produced this ciphertext.
    pub fn context_id(&self) -> u64 {
        self.context_id
    }
}
