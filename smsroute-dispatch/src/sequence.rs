/// Wire message reference allocator.
///
/// Advanced once per logical message, never per retry or fallback attempt,
/// so receivers can use the reference to discard duplicates.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    next: u16,
    modulus: u16,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SequenceCounter {
    /// `modulus` is clamped to `1..=256` so every value fits the 8-bit field.
    #[must_use]
    pub fn new(modulus: u16) -> Self {
        Self::starting_at(0, modulus)
    }

    /// Resume from a previously persisted reference.
    #[must_use]
    pub fn starting_at(next: u16, modulus: u16) -> Self {
        let modulus = modulus.clamp(1, 256);
        Self {
            next: next % modulus,
            modulus,
        }
    }

    /// The reference the next call to [`Self::next`] will hand out.
    #[must_use]
    pub fn peek(&self) -> u8 {
        u8::try_from(self.next).unwrap_or_default()
    }

    #[allow(
        clippy::should_implement_trait,
        reason = "An endless wrapping counter, not an iterator"
    )]
    pub fn next(&mut self) -> u8 {
        let current = self.peek();
        self.next = (self.next + 1) % self.modulus;
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_modulus() {
        let mut counter = SequenceCounter::starting_at(254, 256);
        assert_eq!(counter.next(), 254);
        assert_eq!(counter.next(), 255);
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.peek(), 1);
    }

    #[test]
    fn modulus_is_clamped() {
        let mut counter = SequenceCounter::new(1000);
        for _ in 0..256 {
            counter.next();
        }
        assert_eq!(counter.peek(), 0);

        let mut counter = SequenceCounter::new(0);
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 0);
    }
}
