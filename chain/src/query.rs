//! # Query Façade
//!
//! The read-only API the RPC layer talks to. [`ChainQuery`] is a cheap
//! clone over an `Arc<ChainTree>`, so every axum handler can own one.
//!
//! Single lookups go through whatever path is cheapest. Composite answers
//! (`block_info`, `chain_tips`) are built from one [`ChainView`], so the
//! confirmation count and the `nextblockhash` of a `getblock` reply always
//! describe the same tip even if a reorg lands mid-request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::{ChainTree, ChainView};
use crate::error::{ChainError, ChainResult};
use crate::storage::entry::{BlockHash, ChainEntry, Hash256};

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// `getblock`-style description of one block relative to the active chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: BlockHash,
    pub confirmations: i64,
    pub height: u64,
    pub version: u32,
    #[serde(rename = "versionHex")]
    pub version_hex: String,
    pub merkleroot: Hash256,
    pub time: u64,
    pub mediantime: u64,
    pub nonce: u32,
    /// Compact target as 8 hex characters.
    pub bits: String,
    pub difficulty: f64,
    /// Cumulative work as 64 hex characters.
    pub chainwork: String,
    pub previousblockhash: Option<BlockHash>,
    pub nextblockhash: Option<BlockHash>,
}

/// Status of a branch tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TipStatus {
    /// The tip of the main chain.
    Active,
    /// A fully stored side branch that lost on chainwork.
    ValidFork,
}

/// One entry of `getchaintips`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTipInfo {
    pub height: u64,
    pub hash: BlockHash,
    /// Blocks between this tip and the main chain. 0 for the active tip.
    pub branchlen: u64,
    pub status: TipStatus,
}

// ---------------------------------------------------------------------------
// ChainQuery
// ---------------------------------------------------------------------------

/// Read-only handle over a shared [`ChainTree`].
#[derive(Debug, Clone)]
pub struct ChainQuery {
    tree: Arc<ChainTree>,
}

impl ChainQuery {
    pub fn new(tree: Arc<ChainTree>) -> Self {
        Self { tree }
    }

    /// The tree behind this handle.
    pub fn tree(&self) -> &Arc<ChainTree> {
        &self.tree
    }

    /// Any stored entry, main chain or side branch.
    pub fn get_entry(&self, hash: &BlockHash) -> Option<Arc<ChainEntry>> {
        self.tree.get(hash)
    }

    /// Main-chain entry at `height`.
    pub fn get_entry_at_height(&self, height: u64) -> Option<Arc<ChainEntry>> {
        self.tree.view().entry_at_height(height)
    }

    /// The active tip.
    pub fn get_active_tip(&self) -> Arc<ChainEntry> {
        self.tree.tip()
    }

    /// Main-chain successor of `hash`.
    pub fn get_next_hash(&self, hash: &BlockHash) -> Option<BlockHash> {
        self.tree.view().next_hash(hash)
    }

    /// Parent of any known entry.
    pub fn get_prev_hash(&self, hash: &BlockHash) -> Option<BlockHash> {
        self.tree.view().prev_hash(hash)
    }

    /// See [`ChainView::confirmations`].
    pub fn confirmations(&self, hash: &BlockHash) -> ChainResult<i64> {
        self.tree.confirmations(hash)
    }

    /// Main-chain hash at `height`.
    pub fn get_block_hash(&self, height: u64) -> Option<BlockHash> {
        self.tree.view().hash_at_height(height)
    }

    /// Hash of the active tip.
    pub fn best_block_hash(&self) -> BlockHash {
        self.tree.tip().hash
    }

    /// Height of the active tip.
    pub fn block_count(&self) -> u64 {
        self.tree.height()
    }

    /// Number of stored entries, all branches.
    pub fn entry_count(&self) -> usize {
        self.tree.store().len()
    }

    /// Every branch tip with its distance to the main chain.
    pub fn chain_tips(&self) -> ChainResult<Vec<ChainTipInfo>> {
        let view = self.tree.view();
        view.store()
            .tips()
            .into_iter()
            .map(|tip| -> ChainResult<ChainTipInfo> {
                let fork_height = fork_height(&view, &tip)?;
                let status = if view.is_main_chain(&tip) {
                    TipStatus::Active
                } else {
                    TipStatus::ValidFork
                };
                Ok(ChainTipInfo {
                    height: tip.height,
                    hash: tip.hash,
                    branchlen: tip.height - fork_height,
                    status,
                })
            })
            .collect()
    }

    /// Everything `getblock` reports about `hash`.
    pub fn block_info(&self, hash: &BlockHash) -> ChainResult<BlockInfo> {
        let view = self.tree.view();
        let entry = view.get(hash).ok_or(ChainError::UnknownBlock(*hash))?;
        Ok(block_info_in(&view, &entry))
    }
}

/// Height of the highest main-chain ancestor of `entry` (itself included).
fn fork_height(view: &ChainView<'_>, entry: &Arc<ChainEntry>) -> ChainResult<u64> {
    let mut cursor = Arc::clone(entry);
    while !view.is_main_chain(&cursor) {
        cursor = view
            .store()
            .parent(&cursor)?
            .ok_or(ChainError::MissingAncestor(cursor.prev_hash()))?;
    }
    Ok(cursor.height)
}

fn block_info_in(view: &ChainView<'_>, entry: &ChainEntry) -> BlockInfo {
    let header = &entry.header;
    BlockInfo {
        hash: entry.hash,
        confirmations: view.confirmations_of(entry),
        height: entry.height,
        version: header.version,
        version_hex: format!("{:08x}", header.version),
        merkleroot: header.merkle_root,
        time: header.time,
        mediantime: entry.median_time,
        nonce: header.nonce,
        bits: format!("{:08x}", header.bits),
        difficulty: entry.difficulty(),
        chainwork: entry.chainwork_hex(),
        previousblockhash: (!entry.is_genesis()).then(|| entry.prev_hash()),
        nextblockhash: view.next_hash(&entry.hash),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkParams, REGTEST_BITS};
    use crate::storage::entry::BlockHeader;

    fn setup() -> ChainQuery {
        ChainQuery::new(Arc::new(ChainTree::new(NetworkParams::regtest()).unwrap()))
    }

    fn extend(query: &ChainQuery, parent: &Arc<ChainEntry>, tag: u32) -> Arc<ChainEntry> {
        let header = BlockHeader::extending(parent, parent.time() + 1, REGTEST_BITS, tag);
        Arc::clone(query.tree().insert_header(header).unwrap().entry())
    }

    #[test]
    fn block_info_for_genesis() {
        let query = setup();
        let genesis = query.get_active_tip();
        let info = query.block_info(&genesis.hash).unwrap();

        assert_eq!(info.height, 0);
        assert_eq!(info.confirmations, 1);
        assert_eq!(info.previousblockhash, None);
        assert_eq!(info.nextblockhash, None);
        assert_eq!(info.bits, "207fffff");
        assert_eq!(info.version_hex, "00000001");
        assert!(info.chainwork.ends_with("02"));
    }

    #[test]
    fn block_info_links_neighbours() {
        let query = setup();
        let genesis = query.get_active_tip();
        let a1 = extend(&query, &genesis, 0);
        let a2 = extend(&query, &a1, 0);

        let info = query.block_info(&a1.hash).unwrap();
        assert_eq!(info.confirmations, 2);
        assert_eq!(info.previousblockhash, Some(genesis.hash));
        assert_eq!(info.nextblockhash, Some(a2.hash));
    }

    #[test]
    fn block_info_json_field_names() {
        let query = setup();
        let genesis = query.get_active_tip();
        let json = serde_json::to_value(query.block_info(&genesis.hash).unwrap()).unwrap();

        for field in [
            "hash",
            "confirmations",
            "height",
            "version",
            "versionHex",
            "merkleroot",
            "time",
            "mediantime",
            "nonce",
            "bits",
            "difficulty",
            "chainwork",
            "previousblockhash",
            "nextblockhash",
        ] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
        assert!(json["nextblockhash"].is_null());
        assert_eq!(json["hash"], genesis.hash.to_hex());
    }

    #[test]
    fn chain_tips_report_branch_lengths() {
        let query = setup();
        let genesis = query.get_active_tip();
        let a1 = extend(&query, &genesis, 1);
        let a2 = extend(&query, &a1, 1);
        let a3 = extend(&query, &a2, 1);
        let b2 = extend(&query, &a1, 2);
        let c1 = extend(&query, &genesis, 3);

        let tips = query.chain_tips().unwrap();
        assert_eq!(tips.len(), 3);

        let find = |h: BlockHash| tips.iter().find(|t| t.hash == h).unwrap().clone();
        assert_eq!(find(a3.hash).status, TipStatus::Active);
        assert_eq!(find(a3.hash).branchlen, 0);
        assert_eq!(find(b2.hash).status, TipStatus::ValidFork);
        assert_eq!(find(b2.hash).branchlen, 1);
        assert_eq!(find(c1.hash).branchlen, 1);

        let json = serde_json::to_value(find(b2.hash)).unwrap();
        assert_eq!(json["status"], "valid-fork");
    }

    #[test]
    fn navigation_by_height_and_hash() {
        let query = setup();
        let genesis = query.get_active_tip();
        let a1 = extend(&query, &genesis, 0);

        assert_eq!(query.block_count(), 1);
        assert_eq!(query.best_block_hash(), a1.hash);
        assert_eq!(query.get_block_hash(0), Some(genesis.hash));
        assert_eq!(query.get_block_hash(2), None);
        assert_eq!(query.get_entry_at_height(1).unwrap().hash, a1.hash);
        assert_eq!(query.get_next_hash(&genesis.hash), Some(a1.hash));
        assert_eq!(query.get_prev_hash(&a1.hash), Some(genesis.hash));
        assert_eq!(query.entry_count(), 2);
    }

    #[test]
    fn genesis_prev_hash_is_zero_but_reported_as_null() {
        let query = setup();
        let genesis = query.get_active_tip();

        assert_eq!(query.get_prev_hash(&genesis.hash), Some(Hash256::ZERO));
        assert_eq!(query.get_prev_hash(&Hash256([9; 32])), None);

        let info = query.block_info(&genesis.hash).unwrap();
        assert_eq!(info.previousblockhash, None);
    }

    #[test]
    fn unknown_block_info_is_not_found() {
        let query = setup();
        let err = query.block_info(&Hash256([3; 32])).unwrap_err();
        assert!(err.is_not_found());
    }
}
