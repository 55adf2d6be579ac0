//! Error type shared by every chain operation.
//!
//! The variants split into caller bugs (`DuplicateEntry`, `OrphanParent`,
//! `InvalidWork`), ordinary misses (`UnknownBlock`), collaborator failures
//! (`Listener`, `Db`) and store corruption (`MissingAncestor`). Only the
//! last one should ever wake somebody up at night.

use crate::chain::listener::ListenerError;
use crate::storage::db::DbError;
use crate::storage::entry::BlockHash;

/// Errors returned by the entry store, the chain tree and the query facade.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The hash is already stored. Entries are never overwritten.
    #[error("duplicate entry: {0}")]
    DuplicateEntry(BlockHash),

    /// The parent of the inserted header is not known. Parents must be
    /// inserted before their children.
    #[error("orphan entry {hash}: parent {prev_hash} is unknown")]
    OrphanParent { hash: BlockHash, prev_hash: BlockHash },

    /// No entry with this hash has ever been inserted.
    #[error("unknown block: {0}")]
    UnknownBlock(BlockHash),

    /// The compact target does not decode to a positive amount of work.
    #[error("entry {hash} has invalid bits 0x{bits:08x}")]
    InvalidWork { hash: BlockHash, bits: u32 },

    /// An ancestor that must exist was not found while walking the tree.
    #[error("missing ancestor {0}: entry store is inconsistent")]
    MissingAncestor(BlockHash),

    /// A chain listener refused a connect or disconnect. The active tip was
    /// left where it was.
    #[error("listener rejected reorg to {hash}: {source}")]
    Listener {
        hash: BlockHash,
        #[source]
        source: ListenerError,
    },

    /// The entry log failed.
    #[error("entry log error: {0}")]
    Db(#[from] DbError),
}

impl ChainError {
    /// `true` for errors that describe a lookup miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::UnknownBlock(_))
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
