//! # Chain Tree: Tip Selection & Reorganization
//!
//! The [`ChainTree`] owns the entry store, the main-chain projection and
//! the active tip, and is the only thing allowed to change the latter two.
//!
//! ## Insertion Pipeline
//!
//! ```text
//!  insert_header(header)
//!       │
//!       ▼  (write lock taken here, released at return)
//!  EntryStore::prepare ──► EntryDb::append ──► EntryStore::commit
//!       │
//!       ▼
//!  chainwork > tip.chainwork ? ── no ──► SideBranch
//!       │ yes
//!       ▼
//!  ReorgPlan::build          (read-only walk to the fork point)
//!       │
//!       ▼
//!  on_disconnect × N ↓, on_connect × M ↑      ── failure ──► undo, keep tip
//!       │
//!       ▼
//!  projection.rewind_and_extend, tip swap
//!       │
//!       ▼
//!  on_tip_changed(&ChainUpdate)
//! ```
//!
//! ## Concurrency
//!
//! Parallel readers, one writer. The projection and the tip live behind a
//! single `parking_lot::RwLock`; the writer holds it for the whole pipeline
//! above, so a reader sees either the chain before an insertion or the
//! chain after it. Entry lookups by hash go straight to the store's
//! `DashMap` and never touch the lock.
//!
//! ## Tie-Break
//!
//! The tip only moves on *strictly* greater chainwork. Two branches with
//! the same work: whichever reached this node first stays active. Replay
//! from the entry log preserves insertion order, so restarts agree.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

use super::listener::{ChainListener, ChainUpdate};
use super::projection::MainChain;
use super::reorg::ReorgPlan;
use crate::config::NetworkParams;
use crate::error::{ChainError, ChainResult};
use crate::storage::db::EntryDb;
use crate::storage::entry::{BlockHash, BlockHeader, ChainEntry};
use crate::storage::store::EntryStore;

// ---------------------------------------------------------------------------
// Insert Outcome
// ---------------------------------------------------------------------------

/// What an accepted header did to the main chain.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The new entry extended the main chain. Nothing was disconnected.
    Extended(ChainUpdate),
    /// The new entry's branch overtook the main chain. At least one entry
    /// was disconnected.
    Reorganized(ChainUpdate),
    /// Stored, but the active tip did not move.
    SideBranch(Arc<ChainEntry>),
}

impl InsertOutcome {
    /// The entry that was inserted.
    pub fn entry(&self) -> &Arc<ChainEntry> {
        match self {
            InsertOutcome::Extended(update) | InsertOutcome::Reorganized(update) => {
                &update.new_tip
            }
            InsertOutcome::SideBranch(entry) => entry,
        }
    }

    /// The tip change, if any.
    pub fn update(&self) -> Option<&ChainUpdate> {
        match self {
            InsertOutcome::Extended(update) | InsertOutcome::Reorganized(update) => Some(update),
            InsertOutcome::SideBranch(_) => None,
        }
    }

    /// `true` if the active tip moved.
    pub fn tip_changed(&self) -> bool {
        self.update().is_some()
    }
}

// ---------------------------------------------------------------------------
// Chain State
// ---------------------------------------------------------------------------

/// The mutable part of the tree. Always changed together.
#[derive(Debug)]
pub(crate) struct ChainState {
    pub(crate) main: MainChain,
    pub(crate) tip: Arc<ChainEntry>,
}

/// One step a listener has already applied, kept so it can be undone.
enum Applied<'a> {
    Disconnected(&'a Arc<dyn ChainListener>, &'a Arc<ChainEntry>),
    Connected(&'a Arc<dyn ChainListener>, &'a Arc<ChainEntry>),
}

// ---------------------------------------------------------------------------
// ChainTree
// ---------------------------------------------------------------------------

/// Block tree with a single active chain.
///
/// Construct one per node with [`ChainTree::new`] or
/// [`ChainTree::builder`] and share it behind an `Arc`.
pub struct ChainTree {
    params: NetworkParams,
    store: EntryStore,
    state: RwLock<ChainState>,
    db: Option<EntryDb>,
    listeners: Vec<Arc<dyn ChainListener>>,
}

impl fmt::Debug for ChainTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ChainTree")
            .field("network", &self.params.network)
            .field("entries", &self.store.len())
            .field("height", &state.tip.height)
            .field("tip", &state.tip.hash)
            .field("persistent", &self.db.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ChainTree {
    /// In-memory tree holding only genesis, with no listeners.
    pub fn new(params: NetworkParams) -> ChainResult<Self> {
        Self::builder(params).build()
    }

    /// Start configuring a tree.
    pub fn builder(params: NetworkParams) -> ChainTreeBuilder {
        ChainTreeBuilder {
            params,
            db: None,
            listeners: Vec::new(),
        }
    }

    /// Accept a validated header.
    ///
    /// Fails without side effects on `DuplicateEntry`, `OrphanParent`,
    /// `InvalidWork` and entry log errors. A `Listener` failure leaves the
    /// entry stored as a side branch and the tip unchanged; the entry log
    /// marks it refused so a restart does not select it either.
    pub fn insert_header(&self, header: BlockHeader) -> ChainResult<InsertOutcome> {
        let mut state = self.state.write();

        let entry = self.store.prepare(header)?;
        if let Some(db) = &self.db {
            db.append(&entry.header)?;
        }
        let entry = self.store.commit(entry)?;

        let result = self.select_tip(&mut state, entry, true);
        if let (Err(ChainError::Listener { hash, .. }), Some(db)) = (&result, &self.db) {
            db.mark_refused(hash)?;
        }
        result
    }

    /// Consistent read snapshot. Holds the read lock until dropped.
    pub fn view(&self) -> ChainView<'_> {
        ChainView {
            state: self.state.read(),
            store: &self.store,
        }
    }

    /// Current active tip.
    pub fn tip(&self) -> Arc<ChainEntry> {
        Arc::clone(&self.state.read().tip)
    }

    /// Height of the active tip.
    pub fn height(&self) -> u64 {
        self.state.read().tip.height
    }

    /// Any stored entry, main chain or not.
    pub fn get(&self, hash: &BlockHash) -> Option<Arc<ChainEntry>> {
        self.store.get(hash)
    }

    /// Confirmations of `hash` against the current tip.
    pub fn confirmations(&self, hash: &BlockHash) -> ChainResult<i64> {
        self.view().confirmations(hash)
    }

    /// The underlying entry store.
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// Network parameters this tree was built with.
    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// Whether accepted headers are written to an entry log.
    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Decide whether `entry` becomes the tip, and make it so.
    fn select_tip(
        &self,
        state: &mut ChainState,
        entry: Arc<ChainEntry>,
        notify: bool,
    ) -> ChainResult<InsertOutcome> {
        if entry.chainwork <= state.tip.chainwork {
            debug!(
                height = entry.height,
                hash = %entry.hash,
                tip_height = state.tip.height,
                "entry stored on side branch"
            );
            return Ok(InsertOutcome::SideBranch(entry));
        }

        let plan = ReorgPlan::build(&self.store, &state.tip, &entry)?;

        if notify {
            self.run_listeners(&plan, &entry)?;
        }

        state
            .main
            .rewind_and_extend(plan.fork.height, plan.connect.iter().map(|e| e.hash));
        let old_tip = std::mem::replace(&mut state.tip, Arc::clone(&entry));

        let update = ChainUpdate {
            fork_point: plan.fork,
            old_tip,
            new_tip: entry,
            disconnected: plan.disconnect,
            connected: plan.connect,
        };

        if update.is_reorg() {
            warn!(
                depth = update.depth(),
                fork_height = update.fork_point.height,
                old_tip = %update.old_tip.hash,
                new_tip = %update.new_tip.hash,
                height = update.new_tip.height,
                "chain reorganized"
            );
        } else if notify {
            info!(
                height = update.new_tip.height,
                hash = %update.new_tip.hash,
                "new tip"
            );
        }

        if notify {
            for listener in &self.listeners {
                listener.on_tip_changed(&update);
            }
        }

        Ok(if update.is_reorg() {
            InsertOutcome::Reorganized(update)
        } else {
            InsertOutcome::Extended(update)
        })
    }

    /// Run disconnect/connect callbacks for a plan. On the first refusal,
    /// undo everything already applied in reverse order and report it.
    fn run_listeners(&self, plan: &ReorgPlan, target: &Arc<ChainEntry>) -> ChainResult<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }

        let mut applied: Vec<Applied<'_>> = Vec::new();

        for entry in &plan.disconnect {
            for listener in &self.listeners {
                if let Err(source) = listener.on_disconnect(entry) {
                    warn!(hash = %entry.hash, error = %source, "listener refused disconnect");
                    self.undo(applied);
                    return Err(ChainError::Listener {
                        hash: target.hash,
                        source,
                    });
                }
                applied.push(Applied::Disconnected(listener, entry));
            }
        }

        for entry in &plan.connect {
            for listener in &self.listeners {
                if let Err(source) = listener.on_connect(entry) {
                    warn!(hash = %entry.hash, error = %source, "listener refused connect");
                    self.undo(applied);
                    return Err(ChainError::Listener {
                        hash: target.hash,
                        source,
                    });
                }
                applied.push(Applied::Connected(listener, entry));
            }
        }

        Ok(())
    }

    fn undo(&self, applied: Vec<Applied<'_>>) {
        for step in applied.into_iter().rev() {
            let (result, hash) = match step {
                Applied::Connected(listener, entry) => (listener.on_disconnect(entry), entry.hash),
                Applied::Disconnected(listener, entry) => (listener.on_connect(entry), entry.hash),
            };
            if let Err(e) = result {
                error!(hash = %hash, error = %e, "listener failed to undo partial reorg");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and builds a [`ChainTree`].
///
/// ```
/// use nova_chain::{ChainTree, NetworkParams};
///
/// let tree = ChainTree::builder(NetworkParams::regtest()).build().unwrap();
/// assert_eq!(tree.height(), 0);
/// ```
pub struct ChainTreeBuilder {
    params: NetworkParams,
    db: Option<EntryDb>,
    listeners: Vec<Arc<dyn ChainListener>>,
}

impl ChainTreeBuilder {
    /// Persist accepted headers to `db`, and replay what it already holds.
    pub fn with_db(mut self, db: EntryDb) -> Self {
        self.db = Some(db);
        self
    }

    /// Register a listener. Listeners are called in registration order.
    pub fn with_listener(mut self, listener: Arc<dyn ChainListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Build the tree.
    ///
    /// With an entry log attached, checks that the log belongs to this
    /// network and replays it in insertion order. Replay neither writes to
    /// the log nor calls listeners. Entries a listener refused are stored
    /// as side branches without competing for the tip.
    pub fn build(self) -> ChainResult<ChainTree> {
        let store = EntryStore::new(self.params.genesis.clone())?;
        let genesis = store.genesis();

        let mut tree = ChainTree {
            state: RwLock::new(ChainState {
                main: MainChain::new(genesis.hash),
                tip: genesis,
            }),
            params: self.params,
            store,
            db: None,
            listeners: Vec::new(),
        };

        if let Some(db) = &self.db {
            db.bind_genesis(&tree.params.genesis_hash())?;
            let headers = db.load_headers()?;
            let refused = db.load_refused()?;
            let count = headers.len();
            tree.replay(headers, &refused)?;

            let tip = tree.tip();
            info!(
                replayed = count,
                refused = refused.len(),
                height = tip.height,
                tip = %tip.hash,
                "chain restored from entry log"
            );
        }

        tree.db = self.db;
        tree.listeners = self.listeners;
        Ok(tree)
    }
}

impl ChainTree {
    fn replay(&self, headers: Vec<BlockHeader>, refused: &HashSet<BlockHash>) -> ChainResult<()> {
        let mut state = self.state.write();
        for header in headers {
            let entry = self.store.put(header)?;
            if refused.contains(&entry.hash) {
                debug!(height = entry.height, hash = %entry.hash, "replayed refused entry");
                continue;
            }
            self.select_tip(&mut state, entry, false)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ChainView
// ---------------------------------------------------------------------------

/// A consistent snapshot of the main chain.
///
/// Every read through one view sees the same tip and projection. Writers
/// wait until the view is dropped, so keep it short-lived.
pub struct ChainView<'a> {
    state: RwLockReadGuard<'a, ChainState>,
    store: &'a EntryStore,
}

impl<'a> ChainView<'a> {
    /// Active tip.
    pub fn tip(&self) -> &Arc<ChainEntry> {
        &self.state.tip
    }

    /// Height of the active tip.
    pub fn height(&self) -> u64 {
        self.state.tip.height
    }

    /// Any stored entry.
    pub fn get(&self, hash: &BlockHash) -> Option<Arc<ChainEntry>> {
        self.store.get(hash)
    }

    /// Main-chain hash at `height`.
    pub fn hash_at_height(&self, height: u64) -> Option<BlockHash> {
        self.state.main.get(height)
    }

    /// Main-chain entry at `height`.
    pub fn entry_at_height(&self, height: u64) -> Option<Arc<ChainEntry>> {
        self.hash_at_height(height).and_then(|h| self.store.get(&h))
    }

    /// Whether `entry` is on the main chain.
    pub fn is_main_chain(&self, entry: &ChainEntry) -> bool {
        self.state.main.contains_at(entry.height, &entry.hash)
    }

    /// Hash of the main-chain child of `hash`.
    ///
    /// `None` for the tip, for side-branch entries and for unknown hashes.
    pub fn next_hash(&self, hash: &BlockHash) -> Option<BlockHash> {
        let entry = self.store.get(hash)?;
        if !self.is_main_chain(&entry) {
            return None;
        }
        self.state.main.get(entry.height + 1)
    }

    /// Parent hash of any known entry, [`BlockHash::ZERO`] for genesis.
    /// `None` for unknown hashes.
    pub fn prev_hash(&self, hash: &BlockHash) -> Option<BlockHash> {
        self.store.get(hash).map(|entry| entry.prev_hash())
    }

    /// The entry store behind this view.
    pub fn store(&self) -> &'a EntryStore {
        self.store
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::listener::ListenerError;
    use crate::config::REGTEST_BITS;
    use parking_lot::Mutex;

    // -- Helpers ------------------------------------------------------------

    fn tree() -> ChainTree {
        ChainTree::new(NetworkParams::regtest()).unwrap()
    }

    fn extend(
        tree: &ChainTree,
        parent: &Arc<ChainEntry>,
        tag: u32,
    ) -> (Arc<ChainEntry>, InsertOutcome) {
        let header = BlockHeader::extending(parent, parent.time() + 1, REGTEST_BITS, tag);
        let outcome = tree.insert_header(header).unwrap();
        (Arc::clone(outcome.entry()), outcome)
    }

    fn build(
        tree: &ChainTree,
        from: &Arc<ChainEntry>,
        len: usize,
        tag: u32,
    ) -> Vec<Arc<ChainEntry>> {
        let mut out = Vec::new();
        let mut parent = Arc::clone(from);
        for _ in 0..len {
            let (entry, _) = extend(tree, &parent, tag);
            out.push(Arc::clone(&entry));
            parent = entry;
        }
        out
    }

    /// Records every callback as a string.
    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
        refuse_connect_at: Option<u64>,
    }

    impl ChainListener for Recorder {
        fn on_disconnect(&self, entry: &ChainEntry) -> Result<(), ListenerError> {
            self.log.lock().push(format!("-{}", entry.height));
            Ok(())
        }

        fn on_connect(&self, entry: &ChainEntry) -> Result<(), ListenerError> {
            if self.refuse_connect_at == Some(entry.height) {
                return Err(ListenerError::new("refused"));
            }
            self.log.lock().push(format!("+{}", entry.height));
            Ok(())
        }

        fn on_tip_changed(&self, update: &ChainUpdate) {
            self.log.lock().push(format!("tip {}", update.new_tip.height));
        }
    }

    // -- 1. extension -------------------------------------------------------

    #[test]
    fn extension_moves_tip() {
        let tree = tree();
        let genesis = tree.tip();
        let (a1, outcome) = extend(&tree, &genesis, 0);

        assert!(matches!(outcome, InsertOutcome::Extended(_)));
        assert_eq!(tree.tip().hash, a1.hash);
        assert_eq!(tree.height(), 1);

        let update = outcome.update().unwrap();
        assert_eq!(update.fork_point.hash, genesis.hash);
        assert_eq!(update.connected.len(), 1);
        assert_eq!(update.depth(), 0);
    }

    // -- 2. tie-break -------------------------------------------------------

    #[test]
    fn equal_work_keeps_first_seen() {
        let tree = tree();
        let genesis = tree.tip();
        let (a1, _) = extend(&tree, &genesis, 1);
        let (b1, outcome) = extend(&tree, &genesis, 2);

        assert!(matches!(outcome, InsertOutcome::SideBranch(_)));
        assert_eq!(tree.tip().hash, a1.hash);
        assert_eq!(tree.confirmations(&b1.hash).unwrap(), -1);
    }

    // -- 3. reorg -----------------------------------------------------------

    #[test]
    fn heavier_branch_reorganizes() {
        let tree = tree();
        let genesis = tree.tip();
        let a = build(&tree, &genesis, 2, 1);
        let b = build(&tree, &genesis, 2, 2);
        assert_eq!(tree.tip().hash, a[1].hash);

        let (b3, outcome) = extend(&tree, &b[1], 2);
        match outcome {
            InsertOutcome::Reorganized(update) => {
                assert_eq!(update.depth(), 2);
                assert_eq!(update.connected.len(), 3);
                assert_eq!(update.old_tip.hash, a[1].hash);
                assert_eq!(update.fork_point.hash, genesis.hash);
            }
            other => panic!("expected Reorganized, got: {:?}", other),
        }

        let view = tree.view();
        assert_eq!(view.tip().hash, b3.hash);
        assert_eq!(view.hash_at_height(1), Some(b[0].hash));
        assert_eq!(view.hash_at_height(2), Some(b[1].hash));
        assert!(!view.is_main_chain(&a[0]));
        assert!(view.is_main_chain(&genesis));
    }

    // -- 4. listeners -------------------------------------------------------

    #[test]
    fn listener_sees_ordered_callbacks() {
        let recorder = Arc::new(Recorder::default());
        let tree = ChainTree::builder(NetworkParams::regtest())
            .with_listener(recorder.clone())
            .build()
            .unwrap();
        let genesis = tree.tip();

        let a = build(&tree, &genesis, 2, 1);
        recorder.log.lock().clear();

        let b = build(&tree, &genesis, 3, 2);
        assert_eq!(tree.tip().hash, b[2].hash);
        assert_eq!(a.len(), 2);

        let log = recorder.log.lock().clone();
        assert_eq!(log, vec!["-2", "-1", "+1", "+2", "+3", "tip 3"]);
    }

    #[test]
    fn refused_connect_rolls_back_and_keeps_tip() {
        let recorder = Arc::new(Recorder {
            refuse_connect_at: Some(2),
            ..Recorder::default()
        });
        let tree = ChainTree::builder(NetworkParams::regtest())
            .with_listener(recorder.clone())
            .build()
            .unwrap();
        let genesis = tree.tip();

        let (a1, _) = extend(&tree, &genesis, 1);
        recorder.log.lock().clear();

        let header = BlockHeader::extending(&a1, a1.time() + 1, REGTEST_BITS, 1);
        let hash = header.hash();
        match tree.insert_header(header) {
            Err(ChainError::Listener { hash: h, .. }) => assert_eq!(h, hash),
            other => panic!("expected Listener error, got: {:?}", other),
        }

        assert_eq!(tree.tip().hash, a1.hash);
        assert!(tree.get(&hash).is_some(), "entry stays stored");
        assert_eq!(tree.confirmations(&hash).unwrap(), -1);
        assert_eq!(tree.confirmations(&a1.hash).unwrap(), 1);
        assert!(recorder.log.lock().is_empty());
    }

    #[test]
    fn refused_connect_mid_reorg_undoes_in_reverse() {
        let recorder = Arc::new(Recorder {
            refuse_connect_at: Some(3),
            ..Recorder::default()
        });
        let tree = ChainTree::builder(NetworkParams::regtest())
            .with_listener(recorder.clone())
            .build()
            .unwrap();
        let genesis = tree.tip();

        let a = build(&tree, &genesis, 2, 1);
        let b = build(&tree, &genesis, 2, 2);
        recorder.log.lock().clear();

        let header = BlockHeader::extending(&b[1], b[1].time() + 1, REGTEST_BITS, 2);
        assert!(matches!(
            tree.insert_header(header),
            Err(ChainError::Listener { .. })
        ));

        // Applied: -2 -1 +1 +2, refused +3, undone: -2 -1 +1 +2.
        let log = recorder.log.lock().clone();
        assert_eq!(log, vec!["-2", "-1", "+1", "+2", "-2", "-1", "+1", "+2"]);
        assert_eq!(tree.tip().hash, a[1].hash);
        assert_eq!(tree.view().hash_at_height(1), Some(a[0].hash));
    }

    // -- 5. errors ----------------------------------------------------------

    #[test]
    fn rejected_headers_leave_state_untouched() {
        let tree = tree();
        let genesis = tree.tip();
        let (a1, _) = extend(&tree, &genesis, 0);

        let dup = BlockHeader::extending(&genesis, genesis.time() + 1, REGTEST_BITS, 0);
        assert!(matches!(
            tree.insert_header(dup),
            Err(ChainError::DuplicateEntry(_))
        ));
        assert_eq!(tree.tip().hash, a1.hash);
        assert_eq!(tree.store().len(), 2);
    }

    // -- 6. view ------------------------------------------------------------

    #[test]
    fn view_navigation() {
        let tree = tree();
        let genesis = tree.tip();
        let a = build(&tree, &genesis, 3, 0);
        let (side, _) = extend(&tree, &a[0], 9);

        let view = tree.view();
        assert_eq!(view.next_hash(&genesis.hash), Some(a[0].hash));
        assert_eq!(view.next_hash(&a[2].hash), None);
        assert_eq!(view.next_hash(&side.hash), None);
        assert_eq!(view.prev_hash(&side.hash), Some(a[0].hash));
        assert_eq!(view.prev_hash(&genesis.hash), Some(BlockHash::ZERO));
        assert_eq!(view.entry_at_height(2).map(|e| e.hash), Some(a[1].hash));
        assert!(view.entry_at_height(4).is_none());
    }
}
