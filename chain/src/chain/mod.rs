//! # Chain Module
//!
//! Fork choice and the main chain.
//!
//! ## Architecture
//!
//! ```text
//! projection.rs   : MainChain: height → hash for the active chain
//! reorg.rs        : ReorgPlan: fork-point search, disconnect/connect lists
//! listener.rs     : ChainListener trait, ChainUpdate
//! tree.rs         : ChainTree: insertion, tip selection, apply; ChainView
//! confirmations.rs: confirmation counting against a ChainView
//! ```
//!
//! The entry store underneath (see [`crate::storage`]) never changes shape
//! during a reorg. Only the projection and the tip pointer move, and they
//! move together under one lock.

pub mod confirmations;
pub mod listener;
pub mod projection;
pub mod reorg;
pub mod tree;

pub use confirmations::ORPHANED_CONFIRMATIONS;
pub use listener::{ChainListener, ChainUpdate, ListenerError};
pub use projection::MainChain;
pub use reorg::ReorgPlan;
pub use tree::{ChainTree, ChainTreeBuilder, ChainView, InsertOutcome};
