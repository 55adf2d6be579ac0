//! # Hashing for Chain Entries
//!
//! Block identifiers are content hashes of the header. We use BLAKE3 for
//! all of them, through the helpers in [`hash`]. Nothing in this crate
//! signs or encrypts anything. Validation is somebody else's job.

pub mod hash;

pub use hash::{blake3_hash, blake3_hash_parts};
