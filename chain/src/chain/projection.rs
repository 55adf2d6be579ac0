//! The main-chain projection: one hash per height, genesis to active tip.

use crate::storage::entry::BlockHash;

/// Height-indexed view of the active chain.
///
/// `hashes[h]` is the main-chain block at height `h`. Never empty: the
/// genesis hash is always at index 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainChain {
    hashes: Vec<BlockHash>,
}

impl MainChain {
    pub fn new(genesis: BlockHash) -> Self {
        Self {
            hashes: vec![genesis],
        }
    }

    /// Main-chain hash at `height`.
    pub fn get(&self, height: u64) -> Option<BlockHash> {
        usize::try_from(height)
            .ok()
            .and_then(|h| self.hashes.get(h))
            .copied()
    }

    /// Whether `hash` sits at `height` on the main chain.
    ///
    /// This is the membership test: an entry is on the main chain iff the
    /// projection holds its hash at its height.
    pub fn contains_at(&self, height: u64, hash: &BlockHash) -> bool {
        self.get(height).as_ref() == Some(hash)
    }

    /// Height of the last entry.
    pub fn tip_height(&self) -> u64 {
        (self.hashes.len() - 1) as u64
    }

    /// Hash of the last entry.
    pub fn tip_hash(&self) -> BlockHash {
        self.hashes[self.hashes.len() - 1]
    }

    /// Number of heights covered (tip height + 1).
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Always `false`.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Replace everything above `fork_height` with `connect`.
    ///
    /// Genesis can never be cut: `fork_height` is at least 0.
    pub(crate) fn rewind_and_extend<I>(&mut self, fork_height: u64, connect: I)
    where
        I: IntoIterator<Item = BlockHash>,
    {
        let keep = usize::try_from(fork_height)
            .map(|h| h.saturating_add(1))
            .unwrap_or(usize::MAX);
        self.hashes.truncate(keep.max(1));
        self.hashes.extend(connect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entry::Hash256;

    fn h(byte: u8) -> BlockHash {
        Hash256([byte; 32])
    }

    #[test]
    fn starts_at_genesis() {
        let main = MainChain::new(h(0));
        assert_eq!(main.len(), 1);
        assert_eq!(main.tip_height(), 0);
        assert_eq!(main.tip_hash(), h(0));
        assert_eq!(main.get(0), Some(h(0)));
        assert_eq!(main.get(1), None);
    }

    #[test]
    fn extend_from_tip() {
        let mut main = MainChain::new(h(0));
        main.rewind_and_extend(0, [h(1)]);
        main.rewind_and_extend(1, [h(2)]);

        assert_eq!(main.tip_height(), 2);
        assert!(main.contains_at(1, &h(1)));
        assert!(!main.contains_at(2, &h(1)));
    }

    #[test]
    fn rewind_replaces_suffix() {
        let mut main = MainChain::new(h(0));
        main.rewind_and_extend(0, [h(1), h(2), h(3)]);
        main.rewind_and_extend(1, [h(12), h(13), h(14)]);

        assert_eq!(main.tip_height(), 4);
        assert_eq!(main.get(1), Some(h(1)));
        assert_eq!(main.get(2), Some(h(12)));
        assert_eq!(main.tip_hash(), h(14));
        assert!(!main.contains_at(3, &h(3)));
    }

    #[test]
    fn rewind_to_genesis_keeps_genesis() {
        let mut main = MainChain::new(h(0));
        main.rewind_and_extend(0, [h(1), h(2)]);
        main.rewind_and_extend(0, [h(21)]);

        assert_eq!(main.len(), 2);
        assert_eq!(main.get(0), Some(h(0)));
        assert_eq!(main.get(1), Some(h(21)));
    }
}
