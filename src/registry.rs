use arrayvec::ArrayVec;

use crate::bank::Bank;

/// Fixed-capacity collection of banks, kept sorted by strictly ascending
/// block size.
pub(crate) struct Registry<const MAX_BANKS: usize> {
    banks: ArrayVec<Bank, MAX_BANKS>,
}

impl<const MAX_BANKS: usize> Registry<MAX_BANKS> {
    pub(crate) const fn new() -> Self {
        Self { banks: ArrayVec::new_const() }
    }

    /// Index of the bank with the smallest block size that still fits
    /// `total` bytes (provenance word included).
    pub(crate) fn find(&self, total: usize) -> Option<usize> {
        self.banks.iter().position(|bank| bank.block_size() >= total)
    }

    /// Index of the bank with exactly this block size.
    pub(crate) fn find_exact(&self, block_size: usize) -> Option<usize> {
        self.banks.iter().position(|bank| bank.block_size() == block_size)
    }

    /// Inserts `bank` at its sorted position. A full registry hands the bank
    /// back so the caller can dispose of it.
    pub(crate) fn insert(&mut self, bank: Bank) -> Result<usize, Bank> {
        if self.banks.is_full() {
            return Err(bank);
        }
        debug_assert!(
            self.find_exact(bank.block_size()).is_none(),
            "two banks must not share a block size"
        );
        let at = self
            .banks
            .iter()
            .position(|existing| existing.block_size() > bank.block_size())
            .unwrap_or(self.banks.len());
        self.banks.insert(at, bank);
        Ok(at)
    }

    pub(crate) fn len(&self) -> usize {
        self.banks.len()
    }

    pub(crate) fn banks(&self) -> &[Bank] {
        &self.banks
    }

    pub(crate) fn banks_mut(&mut self) -> &mut [Bank] {
        &mut self.banks
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::WORD;

    fn bank(block_size: usize) -> Bank {
        Bank::new_static(block_size, 1)
    }

    #[test]
    fn insert_keeps_sizes_ascending() {
        let mut registry: Registry<4> = Registry::new();
        registry.insert(bank(8 * WORD)).ok().unwrap();
        registry.insert(bank(2 * WORD)).ok().unwrap();
        registry.insert(bank(4 * WORD)).ok().unwrap();

        let sizes: std::vec::Vec<_> =
            registry.banks().iter().map(|b| b.block_size()).collect();
        assert_eq!(sizes, [2 * WORD, 4 * WORD, 8 * WORD]);
    }

    #[test]
    fn find_picks_smallest_fitting_bank() {
        let mut registry: Registry<4> = Registry::new();
        for size in [2 * WORD, 4 * WORD, 8 * WORD] {
            registry.insert(bank(size)).ok().unwrap();
        }

        assert_eq!(registry.find(1), Some(0));
        assert_eq!(registry.find(2 * WORD), Some(0));
        assert_eq!(registry.find(2 * WORD + 1), Some(1));
        assert_eq!(registry.find(8 * WORD), Some(2));
        assert_eq!(registry.find(8 * WORD + 1), None);
    }

    #[test]
    fn find_exact_ignores_near_misses() {
        let mut registry: Registry<2> = Registry::new();
        registry.insert(bank(4 * WORD)).ok().unwrap();

        assert_eq!(registry.find_exact(4 * WORD), Some(0));
        assert_eq!(registry.find_exact(2 * WORD), None);
    }

    #[test]
    fn full_registry_returns_the_bank() {
        let mut registry: Registry<1> = Registry::new();
        registry.insert(bank(2 * WORD)).ok().unwrap();

        let rejected = registry.insert(bank(4 * WORD)).err().unwrap();
        assert_eq!(rejected.block_size(), 4 * WORD);
        assert_eq!(registry.len(), 1);
    }
}
