//! # Chain Listeners
//!
//! Collaborators that track main-chain state (UTXO views, wallets, index
//! builders, the node's metrics and websocket feed) subscribe through
//! [`ChainListener`]. The chain tree calls them in a fixed order during a
//! tip change:
//!
//! ```text
//!   old tip ── on_disconnect(h) ── on_disconnect(h-1) ── … ── fork point
//!   fork point ── on_connect(f+1) ── on_connect(f+2) ── … ── new tip
//!   on_tip_changed(&ChainUpdate)
//! ```
//!
//! `on_disconnect`/`on_connect` may refuse. When one does, the chain tree
//! undoes the callbacks that already ran and keeps the old tip. Once the
//! new tip is committed, `on_tip_changed` is informational and cannot fail.

use std::sync::Arc;

use crate::storage::entry::ChainEntry;

/// A listener refused to apply a connect or disconnect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Subscriber to main-chain changes.
///
/// Every method has a no-op default so implementors only override what
/// they care about. Called with the chain tree's write lock held: keep the
/// work short and never call back into the tree from inside a callback.
pub trait ChainListener: Send + Sync {
    /// `entry` is leaving the main chain. Called in descending height order.
    fn on_disconnect(&self, _entry: &ChainEntry) -> Result<(), ListenerError> {
        Ok(())
    }

    /// `entry` is joining the main chain. Called in ascending height order.
    fn on_connect(&self, _entry: &ChainEntry) -> Result<(), ListenerError> {
        Ok(())
    }

    /// The active tip moved. Called once per committed change.
    fn on_tip_changed(&self, _update: &ChainUpdate) {}
}

/// Summary of one committed tip change.
#[derive(Debug, Clone)]
pub struct ChainUpdate {
    /// Last entry shared by the old and the new main chain.
    pub fork_point: Arc<ChainEntry>,
    /// Tip before the change.
    pub old_tip: Arc<ChainEntry>,
    /// Tip after the change.
    pub new_tip: Arc<ChainEntry>,
    /// Entries that left the main chain, highest first.
    pub disconnected: Vec<Arc<ChainEntry>>,
    /// Entries that joined the main chain, lowest first.
    pub connected: Vec<Arc<ChainEntry>>,
}

impl ChainUpdate {
    /// Number of blocks rolled back.
    pub fn depth(&self) -> usize {
        self.disconnected.len()
    }

    /// `true` when at least one block was rolled back.
    pub fn is_reorg(&self) -> bool {
        !self.disconnected.is_empty()
    }
}
