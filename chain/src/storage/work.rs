//! # Proof-of-Work Arithmetic
//!
//! The chain index never checks proof of work. That's the validator's job.
//! It does need to know how much work each header *claims*, because the
//! heaviest chain wins. This module turns the compact `bits` encoding into a
//! 256-bit target and the target into an amount of work.
//!
//! ## Compact Encoding
//!
//! ```text
//! bits = 0xEEMMMMMM
//!          │ └──── 23-bit mantissa (bit 23 is the sign)
//!          └────── exponent (size of the target in bytes)
//!
//! target = mantissa * 256^(exponent - 3)
//! work   = 2^256 / (target + 1)
//! ```
//!
//! `2^256` does not fit in a U256, so work is computed as
//! `(!target / (target + 1)) + 1`, which is the same number.

use primitive_types::U256;

/// Decode a compact target.
///
/// Returns `None` for negative or overflowing encodings. A zero target
/// decodes fine (it is a valid number) but carries no work.
pub fn compact_to_target(bits: u32) -> Option<U256> {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;

    if mantissa != 0 && bits & 0x0080_0000 != 0 {
        return None;
    }

    let overflow = mantissa != 0
        && (exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32));
    if overflow {
        return None;
    }

    let target = if exponent <= 3 {
        U256::from(mantissa >> (8 * (3 - exponent)))
    } else {
        U256::from(mantissa) << (8 * (exponent - 3))
    };
    Some(target)
}

/// Amount of work a header with these bits represents.
///
/// `None` when the target is invalid or zero. Such a header would not
/// increase the chainwork, and the store refuses it.
pub fn block_work(bits: u32) -> Option<U256> {
    let target = compact_to_target(bits)?;
    if target.is_zero() {
        return None;
    }
    Some((!target / (target + U256::one())) + U256::one())
}

/// Difficulty relative to the minimum mainnet target `0x1d00ffff`.
///
/// Floating point and for display only. Never compare chains with it.
pub fn difficulty(bits: u32) -> f64 {
    let mantissa = bits & 0x00ff_ffff;
    if mantissa == 0 {
        return 0.0;
    }

    let mut shift = (bits >> 24) & 0xff;
    let mut diff = f64::from(0x0000_ffff_u32) / f64::from(mantissa);

    while shift < 29 {
        diff *= 256.0;
        shift += 1;
    }
    while shift > 29 {
        diff /= 256.0;
        shift -= 1;
    }

    diff
}

/// Big-endian hex rendering of a work value, zero-padded to 64 characters.
pub fn work_to_hex(work: &U256) -> String {
    let mut bytes = [0u8; 32];
    work.to_big_endian(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAINNET_BITS, REGTEST_BITS};

    #[test]
    fn regtest_block_work_is_two() {
        assert_eq!(block_work(REGTEST_BITS), Some(U256::from(2u64)));
    }

    #[test]
    fn mainnet_genesis_work_matches_reference() {
        // Bitcoin's genesis chainwork: 0x0000...000100010001.
        assert_eq!(block_work(MAINNET_BITS), Some(U256::from(0x1_0001_0001u64)));
    }

    #[test]
    fn harder_target_means_more_work() {
        let easy = block_work(REGTEST_BITS).unwrap();
        let harder = block_work(0x1f7f_ffff).unwrap();
        let hardest = block_work(MAINNET_BITS).unwrap();
        assert!(harder > easy);
        assert!(hardest > harder);
    }

    #[test]
    fn negative_target_is_rejected() {
        assert_eq!(compact_to_target(0x0180_0001), None);
        assert_eq!(block_work(0x0480_0001), None);
    }

    #[test]
    fn overflowing_target_is_rejected() {
        assert_eq!(compact_to_target(0xff12_3456), None);
        assert_eq!(compact_to_target(0x2301_0000), None);
    }

    #[test]
    fn zero_target_has_no_work() {
        assert_eq!(compact_to_target(0), Some(U256::zero()));
        assert_eq!(block_work(0), None);
        assert_eq!(block_work(0x0300_0000), None);
    }

    #[test]
    fn small_exponent_shifts_right() {
        assert_eq!(compact_to_target(0x0112_3456), Some(U256::from(0x12u64)));
        assert_eq!(compact_to_target(0x0212_3456), Some(U256::from(0x1234u64)));
        assert_eq!(compact_to_target(0x0312_3456), Some(U256::from(0x12_3456u64)));
    }

    #[test]
    fn mainnet_difficulty_is_one() {
        assert!((difficulty(MAINNET_BITS) - 1.0).abs() < f64::EPSILON);
        assert!(difficulty(REGTEST_BITS) < 1.0);
        assert_eq!(difficulty(0), 0.0);
    }

    #[test]
    fn work_hex_is_zero_padded() {
        let hex = work_to_hex(&U256::from(2u64));
        assert_eq!(hex.len(), 64);
        assert!(hex.ends_with("02"));
        assert!(hex.starts_with("0000"));
    }
}
