// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Chain: Block-Tree Index & Confirmation Engine
//!
//! Every node keeps a map of the block tree it has seen: the main chain,
//! every stale fork that lost a race, and the single path from genesis to
//! the heaviest tip. This crate is that map. It is small on purpose. If
//! it is wrong, every confirmation count and RPC answer downstream is
//! wrong with it, silently.
//!
//! ## Architecture
//!
//! - **storage**: Immutable [`ChainEntry`] records, the append-only
//!   [`EntryStore`] arena, and the optional sled-backed [`EntryDb`] log.
//! - **chain**: The main-chain projection, fork-point search, staged
//!   reorganizations, and the [`ChainTree`] that ties them together.
//! - **query**: The read-only facade consumed by RPC layers.
//! - **config**: Network parameters and protocol constants.
//! - **error**: One error enum for the whole crate.
//!
//! ## Data Flow
//!
//! ```text
//! validated header ─► EntryStore::prepare ─► EntryDb::append ─► EntryStore::commit
//!                                                                   │
//!                                            chainwork > tip? ──────┤
//!                                                 │ yes             │ no
//!                                            ReorgPlan::build    side branch
//!                                                 │
//!                               on_disconnect ↓ … on_connect ↑ … swap tip
//! ```
//!
//! ## Design Philosophy
//!
//! 1. The entry store only ever grows. The main-chain projection is the
//!    only thing a reorg is allowed to touch.
//! 2. Readers never see half a reorg. One write lock spans the whole thing.
//! 3. Equal work never moves the tip. First seen wins, every time.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod query;
pub mod storage;

pub use chain::{
    ChainListener, ChainTree, ChainTreeBuilder, ChainUpdate, ChainView, InsertOutcome,
    ListenerError, ORPHANED_CONFIRMATIONS,
};
pub use config::{Network, NetworkParams};
pub use error::{ChainError, ChainResult};
pub use query::{BlockInfo, ChainQuery, ChainTipInfo, TipStatus};
pub use storage::{BlockHash, BlockHeader, ChainEntry, EntryDb, EntryStore};
