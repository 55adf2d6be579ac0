//! # EntryDb: Persistent Entry Log
//!
//! The block tree is rebuilt from headers on startup, so the only thing
//! worth persisting is the headers themselves, in the order they were
//! accepted. Insertion order matters: equal-work ties go to the branch
//! seen first, and replaying in the same order reproduces the same tip.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                    | Value                  |
//! |------------|------------------------|------------------------|
//! | `headers`  | sequence (8B BE)       | `bincode(BlockHeader)` |
//! | `refused`  | block hash (32B)       | empty                  |
//! | `metadata` | key (UTF-8)            | value (bytes)          |
//!
//! Sequence numbers are big-endian so sled's lexicographic order is the
//! insertion order. Genesis is never written, since it comes from the network
//! parameters, but its hash is recorded under `genesis_hash` so a data
//! directory from another network is refused instead of silently mixed.
//!
//! A header is logged before listeners see it. If a listener then refuses
//! the tip change, its hash goes into `refused`, and replay stores that
//! entry as a side branch instead of selecting it again.

use std::collections::HashSet;
use std::path::Path;

use sled::{Db, Tree};

use super::entry::{BlockHash, BlockHeader};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during entry log operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("genesis mismatch: database has {stored}, node expects {expected}")]
    GenesisMismatch {
        stored: BlockHash,
        expected: BlockHash,
    },
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the genesis hash.
const META_GENESIS_HASH: &[u8] = b"genesis_hash";

// ---------------------------------------------------------------------------
// EntryDb
// ---------------------------------------------------------------------------

/// Append-only header log on top of sled.
///
/// `Clone` is cheap (sled handles are reference counted).
#[derive(Debug, Clone)]
pub struct EntryDb {
    db: Db,
    headers: Tree,
    refused: Tree,
    metadata: Tree,
}

impl EntryDb {
    /// Open or create a log at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a log that lives in a temporary directory and disappears on
    /// drop. For tests and `--memory` nodes.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let headers = db.open_tree("headers")?;
        let refused = db.open_tree("refused")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            headers,
            refused,
            metadata,
        })
    }

    /// Record the genesis hash on first use, or check it on later opens.
    pub fn bind_genesis(&self, expected: &BlockHash) -> DbResult<()> {
        match self.metadata.get(META_GENESIS_HASH)? {
            Some(bytes) => {
                let stored: [u8; 32] = bytes.as_ref().try_into().map_err(|_| {
                    DbError::Serialization("invalid genesis hash bytes".to_string())
                })?;
                let stored = BlockHash::from(stored);
                if &stored != expected {
                    return Err(DbError::GenesisMismatch {
                        stored,
                        expected: *expected,
                    });
                }
                Ok(())
            }
            None => {
                self.metadata
                    .insert(META_GENESIS_HASH, expected.as_bytes().as_slice())?;
                self.db.flush()?;
                Ok(())
            }
        }
    }

    /// Append a header at the next sequence number and flush.
    pub fn append(&self, header: &BlockHeader) -> DbResult<u64> {
        let seq = self.next_sequence()?;
        let bytes =
            bincode::serialize(header).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.headers.insert(seq.to_be_bytes(), bytes)?;
        self.db.flush()?;
        Ok(seq)
    }

    /// All headers in insertion order.
    pub fn load_headers(&self) -> DbResult<Vec<BlockHeader>> {
        let mut headers = Vec::with_capacity(self.headers.len());
        for result in self.headers.iter() {
            let (_key, value) = result?;
            let header: BlockHeader = bincode::deserialize(&value)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            headers.push(header);
        }
        Ok(headers)
    }

    /// Remember that listeners refused to make `hash` the tip.
    pub fn mark_refused(&self, hash: &BlockHash) -> DbResult<()> {
        self.refused
            .insert(hash.as_bytes().as_slice(), Vec::<u8>::new())?;
        self.db.flush()?;
        Ok(())
    }

    /// Hashes recorded by [`mark_refused`](Self::mark_refused).
    pub fn load_refused(&self) -> DbResult<HashSet<BlockHash>> {
        self.refused
            .iter()
            .keys()
            .map(|key| {
                let bytes: [u8; 32] = key?.as_ref().try_into().map_err(|_| {
                    DbError::Serialization("invalid refused hash key".to_string())
                })?;
                Ok(BlockHash::from(bytes))
            })
            .collect()
    }

    /// Number of logged headers (genesis excluded).
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether nothing beyond genesis has been logged.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn next_sequence(&self) -> DbResult<u64> {
        match self.headers.last()? {
            Some((key, _)) => {
                let seq = u64::from_be_bytes(key.as_ref().try_into().map_err(|_| {
                    DbError::Serialization("invalid sequence key".to_string())
                })?);
                Ok(seq + 1)
            }
            None => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
