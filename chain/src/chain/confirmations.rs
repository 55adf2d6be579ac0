//! Confirmation counting.
//!
//! Always computed from the live tip and projection, never stored: a
//! number cached before a reorg would be wrong after it.

use super::tree::ChainView;
use crate::error::{ChainError, ChainResult};
use crate::storage::entry::{BlockHash, ChainEntry};

/// Confirmations reported for a known block that is not on the main chain.
pub const ORPHANED_CONFIRMATIONS: i64 = -1;

/// Confirmations of `entry` against a tip at `tip_height`.
///
/// `on_main_chain` must come from the same snapshot as `tip_height`.
pub fn confirmations_at(entry: &ChainEntry, on_main_chain: bool, tip_height: u64) -> i64 {
    if !on_main_chain || entry.height > tip_height {
        return ORPHANED_CONFIRMATIONS;
    }
    (tip_height - entry.height) as i64 + 1
}

impl ChainView<'_> {
    /// Confirmations of `hash`: `tip.height - height + 1` on the main chain,
    /// [`ORPHANED_CONFIRMATIONS`] off it, `UnknownBlock` if never seen.
    pub fn confirmations(&self, hash: &BlockHash) -> ChainResult<i64> {
        let entry = self.get(hash).ok_or(ChainError::UnknownBlock(*hash))?;
        Ok(self.confirmations_of(&entry))
    }

    /// Confirmations of an entry already in hand.
    pub fn confirmations_of(&self, entry: &ChainEntry) -> i64 {
        confirmations_at(entry, self.is_main_chain(entry), self.height())
    }
}
