//! # Storage Module
//!
//! Everything the chain index remembers, and how it remembers it.
//!
//! ## Architecture
//!
//! ```text
//! entry.rs : Hash256, BlockHeader, ChainEntry (immutable records)
//! work.rs  : compact target decoding, work and difficulty
//! store.rs : EntryStore: hash-indexed arena + branch tip set
//! db.rs    : EntryDb: sled-backed append-only header log
//! ```
//!
//! ## Design Decisions
//!
//! 1. **Append-only.** Entries are never deleted, not even when their
//!    branch loses. Orphaned entries still answer `getblock` and still
//!    report `-1` confirmations.
//!
//! 2. **Headers on disk, entries in memory.** Height, chainwork and median
//!    time are all derivable from the header sequence, so only headers are
//!    persisted. Rebuilding is a replay, not a migration.
//!
//! 3. **Bincode for on-disk serialization.** Compact, fast, deterministic.
//!    JSON is for the API.

pub mod db;
pub mod entry;
pub mod store;
pub mod work;

pub use db::{DbError, EntryDb};
pub use entry::{BlockHash, BlockHeader, ChainEntry, Hash256};
pub use store::EntryStore;
