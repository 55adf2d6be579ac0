//! # Reorganization Planning
//!
//! A reorg is staged before anything is touched. [`ReorgPlan::build`] walks
//! the entry store from both tips back to their common ancestor and returns
//! the two lists the apply step needs. The walk only reads, so a plan that
//! fails to build (store corruption) leaves the chain exactly as it was.
//!
//! ## Fork-Point Search
//!
//! ```text
//!              old tip                      1. step the taller side down
//!                 │                            until both heights match
//!        a3 ──────┘
//!        │            b4 ── new tip         2. step both sides together
//!        a2           │                        until the hashes match
//!        │            b3
//!        a1           │
//!         \           b2
//!          \          │
//!           \         b1
//!            \       /
//!             fork ─┘
//! ```
//!
//! Iterative and bounded by the shorter branch length plus the height
//! difference. Never recursive, so a 10 000-block reorg is just a longer
//! loop.

use std::sync::Arc;

use crate::error::{ChainError, ChainResult};
use crate::storage::entry::ChainEntry;
use crate::storage::store::EntryStore;

/// The staged steps of a tip change.
#[derive(Debug, Clone)]
pub struct ReorgPlan {
    /// Common ancestor of the old and new tips.
    pub fork: Arc<ChainEntry>,
    /// Entries leaving the main chain, old tip first (descending height).
    pub disconnect: Vec<Arc<ChainEntry>>,
    /// Entries joining the main chain, fork child first (ascending height).
    pub connect: Vec<Arc<ChainEntry>>,
}

impl ReorgPlan {
    /// Stage the move from `old_tip` to `new_tip`.
    pub fn build(
        store: &EntryStore,
        old_tip: &Arc<ChainEntry>,
        new_tip: &Arc<ChainEntry>,
    ) -> ChainResult<Self> {
        let mut disconnect = Vec::new();
        let mut connect = Vec::new();

        let mut old = Arc::clone(old_tip);
        let mut new = Arc::clone(new_tip);

        while old.height > new.height {
            let parent = step_back(store, &old)?;
            disconnect.push(old);
            old = parent;
        }
        while new.height > old.height {
            let parent = step_back(store, &new)?;
            connect.push(new);
            new = parent;
        }
        while old.hash != new.hash {
            let old_parent = step_back(store, &old)?;
            let new_parent = step_back(store, &new)?;
            disconnect.push(old);
            connect.push(new);
            old = old_parent;
            new = new_parent;
        }

        connect.reverse();

        Ok(Self {
            fork: old,
            disconnect,
            connect,
        })
    }

    /// `true` when the plan only appends to the current main chain.
    pub fn is_extension(&self) -> bool {
        self.disconnect.is_empty()
    }
}

/// Parent of a non-genesis entry. Reaching genesis without finding the
/// fork means the two tips do not share a root.
fn step_back(store: &EntryStore, entry: &Arc<ChainEntry>) -> ChainResult<Arc<ChainEntry>> {
    store
        .parent(entry)?
        .ok_or(ChainError::MissingAncestor(entry.prev_hash()))
}
