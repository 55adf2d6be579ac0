//! # Entry Store
//!
//! The append-only arena of every entry the node has accepted, keyed by
//! hash, plus the set of branch tips (entries without a known child).
//!
//! ## Design
//!
//! - `DashMap` holds the entries. Readers (confirmation lookups, RPC
//!   queries) never block on the chain tree's projection lock just to find
//!   an entry by hash.
//! - `parking_lot::RwLock<HashSet>` holds the tip set. It changes on every
//!   insertion but is only read by `getchaintips`-style callers.
//! - Insertion is split into `prepare` (validate + derive, no side
//!   effects) and `commit` (publish). Both are crate-private: only the
//!   chain tree inserts, under its write lock, persisting the header
//!   between the two so the tip is always re-selected.
//!
//! Entries are never removed, so an `Arc<ChainEntry>` handed out once stays
//! valid and correct forever.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use super::entry::{median, BlockHash, BlockHeader, ChainEntry};
use crate::config::MEDIAN_TIME_SPAN;
use crate::error::{ChainError, ChainResult};

/// Hash-indexed arena of chain entries.
///
/// Read-only outside this crate. Headers go through
/// [`ChainTree::insert_header`](crate::ChainTree::insert_header):
///
/// ```compile_fail
/// use nova_chain::config::REGTEST_BITS;
/// use nova_chain::{BlockHeader, ChainTree, NetworkParams};
///
/// let tree = ChainTree::new(NetworkParams::regtest()).unwrap();
/// let genesis = tree.tip();
/// let header = BlockHeader::extending(&genesis, genesis.time() + 1, REGTEST_BITS, 0);
/// tree.store().put(header).unwrap();
/// ```
#[derive(Debug)]
pub struct EntryStore {
    /// Every accepted entry, main chain and forks alike.
    entries: DashMap<BlockHash, Arc<ChainEntry>>,
    /// Entries with no known child.
    tips: RwLock<HashSet<BlockHash>>,
    /// The height-0 entry. Always present.
    genesis: Arc<ChainEntry>,
}

impl EntryStore {
    /// Create a store seeded with the genesis header.
    ///
    /// Fails with [`ChainError::InvalidWork`] if the genesis `bits` carry
    /// no work.
    pub fn new(genesis: BlockHeader) -> ChainResult<Self> {
        let hash = genesis.hash();
        let work = genesis.work().ok_or(ChainError::InvalidWork {
            hash,
            bits: genesis.bits,
        })?;
        let time = genesis.time;
        let entry = Arc::new(ChainEntry::new(genesis, hash, 0, work, time));

        let entries = DashMap::new();
        entries.insert(hash, Arc::clone(&entry));
        let mut tips = HashSet::new();
        tips.insert(hash);

        Ok(Self {
            entries,
            tips: RwLock::new(tips),
            genesis: entry,
        })
    }

    /// Validate a header and derive its entry without storing anything.
    ///
    /// Checks, in order: not already stored, parent known, bits carry work.
    /// Derives height, chainwork and median time from the parent chain.
    pub(crate) fn prepare(&self, header: BlockHeader) -> ChainResult<ChainEntry> {
        let hash = header.hash();

        if self.entries.contains_key(&hash) {
            return Err(ChainError::DuplicateEntry(hash));
        }

        let parent = self.get(&header.prev_hash).ok_or(ChainError::OrphanParent {
            hash,
            prev_hash: header.prev_hash,
        })?;

        let work = header.work().ok_or(ChainError::InvalidWork {
            hash,
            bits: header.bits,
        })?;

        let median_time = self.median_time_with(&parent, header.time)?;
        let height = parent.height + 1;
        let chainwork = parent.chainwork.saturating_add(work);

        Ok(ChainEntry::new(header, hash, height, chainwork, median_time))
    }

    /// Publish a prepared entry and update the tip set.
    ///
    /// The caller must hold whatever lock serializes insertions; `commit`
    /// re-checks for duplicates but not for a vanished parent (parents are
    /// never removed).
    pub(crate) fn commit(&self, entry: ChainEntry) -> ChainResult<Arc<ChainEntry>> {
        let entry = Arc::new(entry);

        match self.entries.entry(entry.hash) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ChainError::DuplicateEntry(entry.hash));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&entry));
            }
        }

        let mut tips = self.tips.write();
        tips.remove(&entry.prev_hash());
        tips.insert(entry.hash);

        Ok(entry)
    }

    /// `prepare` + `commit`.
    pub(crate) fn put(&self, header: BlockHeader) -> ChainResult<Arc<ChainEntry>> {
        let entry = self.prepare(header)?;
        self.commit(entry)
    }

    /// Look up an entry by hash.
    pub fn get(&self, hash: &BlockHash) -> Option<Arc<ChainEntry>> {
        self.entries.get(hash).map(|e| Arc::clone(e.value()))
    }

    /// Look up an entry by hash, failing with [`ChainError::UnknownBlock`].
    pub fn require(&self, hash: &BlockHash) -> ChainResult<Arc<ChainEntry>> {
        self.get(hash).ok_or(ChainError::UnknownBlock(*hash))
    }

    /// Parent of `entry`, or `None` for genesis.
    pub fn parent(&self, entry: &ChainEntry) -> ChainResult<Option<Arc<ChainEntry>>> {
        if entry.is_genesis() {
            return Ok(None);
        }
        self.get(&entry.prev_hash())
            .map(Some)
            .ok_or(ChainError::MissingAncestor(entry.prev_hash()))
    }

    /// Whether the hash is stored.
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Number of stored entries, genesis included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`: genesis is stored at construction.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The genesis entry.
    pub fn genesis(&self) -> Arc<ChainEntry> {
        Arc::clone(&self.genesis)
    }

    /// Current branch tips, highest first (hash order breaks height ties).
    pub fn tips(&self) -> Vec<Arc<ChainEntry>> {
        let hashes: Vec<BlockHash> = self.tips.read().iter().copied().collect();
        let mut tips: Vec<Arc<ChainEntry>> =
            hashes.iter().filter_map(|h| self.get(h)).collect();
        tips.sort_by(|a, b| b.height.cmp(&a.height).then_with(|| a.hash.cmp(&b.hash)));
        tips
    }

    /// Number of branch tips.
    pub fn tip_count(&self) -> usize {
        self.tips.read().len()
    }

    /// Walk back from `entry` to its ancestor at `height`.
    ///
    /// Returns `Ok(None)` when `height` is above `entry`.
    pub fn ancestor(
        &self,
        entry: &Arc<ChainEntry>,
        height: u64,
    ) -> ChainResult<Option<Arc<ChainEntry>>> {
        if height > entry.height {
            return Ok(None);
        }
        let mut cursor = Arc::clone(entry);
        while cursor.height > height {
            cursor = self
                .parent(&cursor)?
                .ok_or(ChainError::MissingAncestor(cursor.prev_hash()))?;
        }
        Ok(Some(cursor))
    }

    /// Median time of a would-be child of `parent` with timestamp `time`.
    fn median_time_with(&self, parent: &Arc<ChainEntry>, time: u64) -> ChainResult<u64> {
        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
        times.push(time);

        let mut cursor = Some(Arc::clone(parent));
        while let Some(entry) = cursor {
            if times.len() == MEDIAN_TIME_SPAN {
                break;
            }
            times.push(entry.time());
            cursor = self.parent(&entry)?;
        }

        Ok(median(times))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkParams, REGTEST_BITS};
    use crate::storage::entry::Hash256;
    use primitive_types::U256;

    // -- Helpers ------------------------------------------------------------

    fn store() -> EntryStore {
        EntryStore::new(NetworkParams::regtest().genesis).expect("genesis")
    }

    fn child(store: &EntryStore, parent: &Arc<ChainEntry>, nonce: u32) -> Arc<ChainEntry> {
        let header = BlockHeader::extending(parent, parent.time() + 60, REGTEST_BITS, nonce);
        store.put(header).expect("put")
    }

    // -- 1. genesis ---------------------------------------------------------

    #[test]
    fn new_store_contains_only_genesis() {
        let store = store();
        let genesis = store.genesis();

        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
        assert_eq!(genesis.height, 0);
        assert_eq!(genesis.chainwork, U256::from(2u64));
        assert!(store.contains(&genesis.hash));
        assert_eq!(store.tips().len(), 1);
    }

    #[test]
    fn genesis_with_unusable_bits_is_rejected() {
        let mut genesis = NetworkParams::regtest().genesis;
        genesis.bits = 0;
        assert!(matches!(
            EntryStore::new(genesis),
            Err(ChainError::InvalidWork { bits: 0, .. })
        ));
    }

    // -- 2. put -------------------------------------------------------------

    #[test]
    fn put_derives_height_and_chainwork() {
        let store = store();
        let genesis = store.genesis();
        let a1 = child(&store, &genesis, 1);
        let a2 = child(&store, &a1, 1);

        assert_eq!(a1.height, 1);
        assert_eq!(a2.height, 2);
        assert_eq!(a1.chainwork, U256::from(4u64));
        assert_eq!(a2.chainwork, U256::from(6u64));
        assert_eq!(a2.prev_hash(), a1.hash);
    }

    #[test]
    fn put_rejects_duplicate() {
        let store = store();
        let genesis = store.genesis();
        let header = BlockHeader::extending(&genesis, genesis.time() + 1, REGTEST_BITS, 9);

        store.put(header.clone()).unwrap();
        match store.put(header.clone()) {
            Err(ChainError::DuplicateEntry(hash)) => assert_eq!(hash, header.hash()),
            other => panic!("expected DuplicateEntry, got: {:?}", other),
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn put_rejects_genesis_again() {
        let store = store();
        let result = store.put(NetworkParams::regtest().genesis);
        assert!(matches!(result, Err(ChainError::DuplicateEntry(_))));
    }

    #[test]
    fn put_rejects_unknown_parent() {
        let store = store();
        let mut header = NetworkParams::regtest().genesis;
        header.prev_hash = Hash256([0x55; 32]);

        match store.put(header) {
            Err(ChainError::OrphanParent { prev_hash, .. }) => {
                assert_eq!(prev_hash, Hash256([0x55; 32]));
            }
            other => panic!("expected OrphanParent, got: {:?}", other),
        }
    }

    #[test]
    fn second_genesis_is_an_orphan() {
        let store = store();
        let mut other_genesis = NetworkParams::regtest().genesis;
        other_genesis.nonce += 1;

        assert!(matches!(
            store.put(other_genesis),
            Err(ChainError::OrphanParent { prev_hash, .. }) if prev_hash.is_zero()
        ));
    }

    #[test]
    fn put_rejects_zero_work() {
        let store = store();
        let genesis = store.genesis();
        let header = BlockHeader::extending(&genesis, genesis.time() + 1, 0x0180_0001, 0);
        assert!(matches!(store.put(header), Err(ChainError::InvalidWork { .. })));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn prepare_has_no_side_effects() {
        let store = store();
        let genesis = store.genesis();
        let header = BlockHeader::extending(&genesis, genesis.time() + 1, REGTEST_BITS, 0);

        let entry = store.prepare(header).unwrap();
        assert_eq!(entry.height, 1);
        assert!(!store.contains(&entry.hash));
        assert_eq!(store.tip_count(), 1);

        store.commit(entry.clone()).unwrap();
        assert!(store.contains(&entry.hash));
        assert!(matches!(store.commit(entry), Err(ChainError::DuplicateEntry(_))));
    }

    // -- 3. tips ------------------------------------------------------------

    #[test]
    fn tip_set_tracks_childless_entries() {
        let store = store();
        let genesis = store.genesis();
        let a1 = child(&store, &genesis, 1);
        let b1 = child(&store, &genesis, 2);
        let a2 = child(&store, &a1, 1);

        let tips: Vec<BlockHash> = store.tips().iter().map(|e| e.hash).collect();
        assert_eq!(tips.len(), 2);
        assert_eq!(tips[0], a2.hash, "highest tip first");
        assert!(tips.contains(&b1.hash));
        assert!(!tips.contains(&genesis.hash));
        assert!(!tips.contains(&a1.hash));
    }

    // -- 4. ancestry --------------------------------------------------------

    #[test]
    fn ancestor_walks_back() {
        let store = store();
        let mut tip = store.genesis();
        let mut chain = vec![Arc::clone(&tip)];
        for _ in 0..5 {
            tip = child(&store, &tip, 0);
            chain.push(Arc::clone(&tip));
        }

        for (height, expected) in chain.iter().enumerate() {
            let found = store.ancestor(&tip, height as u64).unwrap().unwrap();
            assert_eq!(found.hash, expected.hash);
        }
        assert!(store.ancestor(&chain[2], 3).unwrap().is_none());
        assert!(store.parent(&chain[0]).unwrap().is_none());
    }

    #[test]
    fn require_reports_unknown_block() {
        let store = store();
        let missing = Hash256([1u8; 32]);
        assert!(matches!(
            store.require(&missing),
            Err(ChainError::UnknownBlock(h)) if h == missing
        ));
    }

    // -- 5. median time -----------------------------------------------------

    #[test]
    fn median_time_uses_eleven_block_window() {
        let store = store();
        let genesis = store.genesis();
        let base = genesis.time();

        let mut tip = genesis;
        for i in 1..=20u64 {
            let header = BlockHeader::extending(&tip, base + i * 10, REGTEST_BITS, 0);
            tip = store.put(header).unwrap();
        }

        // Window is heights 10..=20, timestamps base+100 ..= base+200.
        assert_eq!(tip.median_time, base + 150);
    }

    #[test]
    fn median_time_near_genesis_uses_what_exists() {
        let store = store();
        let genesis = store.genesis();
        let base = genesis.time();

        let h1 = BlockHeader::extending(&genesis, base + 100, REGTEST_BITS, 0);
        let e1 = store.put(h1).unwrap();
        // {base, base+100} → upper median.
        assert_eq!(e1.median_time, base + 100);
        assert_eq!(genesis.median_time, base);
    }
}
