//! # Hashing Utilities
//!
//! BLAKE3 is the only hash function the chain index needs. It is fast on
//! every platform that matters and has no length-extension weakness, so a
//! single pass over the header fields is enough to identify a block.

/// Compute the BLAKE3 hash of the input data.
///
/// # Example
///
/// ```
/// use nova_chain::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"NOVA chain");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute the BLAKE3 hash of several byte slices, as if concatenated.
///
/// Streams the parts through one hasher instead of building a preimage
/// buffer first. Header hashing calls this on every insertion.
pub fn blake3_hash_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake3_is_deterministic() {
        assert_eq!(blake3_hash(b"abc"), blake3_hash(b"abc"));
        assert_ne!(blake3_hash(b"abc"), blake3_hash(b"abd"));
    }

    #[test]
    fn parts_match_concatenation() {
        let whole = blake3_hash(b"hello world");
        let parts = blake3_hash_parts(&[b"hello", b" ", b"world"]);
        assert_eq!(whole, parts);
    }

    #[test]
    fn empty_parts_hash_like_empty_input() {
        assert_eq!(blake3_hash_parts(&[]), blake3_hash(b""));
    }
}
