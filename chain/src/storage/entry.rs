//! # Chain Entries
//!
//! A [`ChainEntry`] is what the node remembers about one block once the
//! validator has accepted it: the header, where it sits in the tree, and
//! how much work the path from genesis to it represents.
//!
//! ## Entry Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ChainEntry                                  │
//! │  ├── hash: Hash256        (BLAKE3 of header) │
//! │  ├── height: u64          (parent + 1)       │
//! │  ├── chainwork: U256      (parent + work)    │
//! │  ├── median_time: u64     (11-block median)  │
//! │  └── header: BlockHeader                     │
//! │      ├── version: u32                        │
//! │      ├── prev_hash: Hash256  (zero = genesis)│
//! │      ├── merkle_root: Hash256                │
//! │      ├── time: u64                           │
//! │      ├── bits: u32        (compact target)   │
//! │      └── nonce: u32                          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Entries are immutable. A reorg changes whether an entry is on the main
//! chain, never the entry itself.

use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::work;
use crate::config::HASH_LENGTH;
use crate::crypto::blake3_hash_parts;

// ---------------------------------------------------------------------------
// Hash256
// ---------------------------------------------------------------------------

/// A 32-byte digest.
///
/// Serializes as a lowercase hex string in human-readable formats (JSON)
/// and as raw bytes otherwise (bincode).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; HASH_LENGTH]);

/// Identifier of a block: the hash of its header.
pub type BlockHash = Hash256;

impl Hash256 {
    /// All-zero hash. Used as the parent of genesis.
    pub const ZERO: Hash256 = Hash256([0u8; HASH_LENGTH]);

    /// Returns `true` for the all-zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse exactly 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; HASH_LENGTH];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Hash256(bytes))
    }
}

impl From<[u8; HASH_LENGTH]> for Hash256 {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Hash256(bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Hash256::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; HASH_LENGTH]>::deserialize(deserializer).map(Hash256)
        }
    }
}

// ---------------------------------------------------------------------------
// BlockHeader
// ---------------------------------------------------------------------------

/// Chain-relevant header fields of a validated block.
///
/// This is what the validation collaborator hands to the chain tree. The
/// hash covers every field, so two headers with the same hash are the
/// same header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Header format version.
    pub version: u32,
    /// Hash of the parent header. [`Hash256::ZERO`] for genesis.
    pub prev_hash: BlockHash,
    /// Merkle root of the block body. Opaque to the chain index.
    pub merkle_root: Hash256,
    /// Unix timestamp (seconds) claimed by the block producer.
    pub time: u64,
    /// Compact proof-of-work target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Build a header on top of `parent` with an empty merkle root.
    ///
    /// Handy for producers and tests. Different `nonce` values give
    /// different hashes, which is how sibling blocks are made.
    pub fn extending(parent: &ChainEntry, time: u64, bits: u32, nonce: u32) -> Self {
        Self {
            version: parent.header.version,
            prev_hash: parent.hash,
            merkle_root: Hash256::ZERO,
            time,
            bits,
            nonce,
        }
    }

    /// BLAKE3 over `version || prev_hash || merkle_root || time || bits || nonce`,
    /// integers little-endian.
    pub fn hash(&self) -> BlockHash {
        Hash256(blake3_hash_parts(&[
            &self.version.to_le_bytes(),
            self.prev_hash.as_bytes(),
            self.merkle_root.as_bytes(),
            &self.time.to_le_bytes(),
            &self.bits.to_le_bytes(),
            &self.nonce.to_le_bytes(),
        ]))
    }

    /// Work this header claims, or `None` if `bits` is unusable.
    pub fn work(&self) -> Option<U256> {
        work::block_work(self.bits)
    }
}

// ---------------------------------------------------------------------------
// ChainEntry
// ---------------------------------------------------------------------------

/// Immutable record of one block's position in the block tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Hash of `header`.
    pub hash: BlockHash,
    /// Distance from genesis. Genesis is 0.
    pub height: u64,
    /// Cumulative work from genesis up to and including this entry.
    pub chainwork: U256,
    /// Median of the timestamps of this entry and up to 10 ancestors.
    pub median_time: u64,
    /// The header this entry was built from.
    pub header: BlockHeader,
}

impl ChainEntry {
    pub(crate) fn new(
        header: BlockHeader,
        hash: BlockHash,
        height: u64,
        chainwork: U256,
        median_time: u64,
    ) -> Self {
        Self {
            hash,
            height,
            chainwork,
            median_time,
            header,
        }
    }

    /// Hash of the parent entry.
    pub fn prev_hash(&self) -> BlockHash {
        self.header.prev_hash
    }

    /// Block timestamp.
    pub fn time(&self) -> u64 {
        self.header.time
    }

    /// `true` for the height-0 entry.
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// Difficulty of this block, for display.
    pub fn difficulty(&self) -> f64 {
        work::difficulty(self.header.bits)
    }

    /// Chainwork as 64 hex characters.
    pub fn chainwork_hex(&self) -> String {
        work::work_to_hex(&self.chainwork)
    }
}

/// Median of a set of timestamps. Upper median for even counts.
pub(crate) fn median(mut times: Vec<u64>) -> u64 {
    if times.is_empty() {
        return 0;
    }
    times.sort_unstable();
    times[times.len() / 2]
}
