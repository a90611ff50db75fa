//! Difficulty and target conversions.
//!
//! A hash meets a target when, interpreted as a little-endian 256-bit
//! integer, it is numerically less than or equal to the target. Difficulty
//! and target have an inverse relationship:
//!
//! ```text
//! target = DIFF1_TARGET / difficulty
//! difficulty = DIFF1_TARGET / target
//! ```
//!
//! Pool difficulties are fractional (a CPU miner may sit well below 1.0), so
//! the conversions take `f64` and do the division in wide integer arithmetic
//! to keep the full precision of the float.

use ruint::aliases::{U256, U512};

/// The difficulty-1 target, `0x00000000FFFF0000...0` (0xffff << 208).
pub const DIFF1_TARGET: U256 = U256::from_limbs([0, 0, 0, 0x0000_0000_ffff_0000]);

/// Expand a compact `bits` field into the full 256-bit target.
///
/// `bits` packs an exponent in the top byte and a 24-bit mantissa below it;
/// mantissas above 0x7fffff are clamped (the sign bit of the original
/// signed encoding is never valid in a target).
pub fn bits_to_target(bits: u32) -> U256 {
    let exp = (bits >> 24) as i64;
    let mut mant = bits & 0x00ff_ffff;
    if mant > 0x007f_ffff {
        mant = 0x007f_ffff;
    }

    let mant = U256::from(mant);
    if exp >= 3 {
        mant.checked_shl((8 * (exp - 3)) as usize).unwrap_or(U256::MAX)
    } else {
        mant >> (8 * (3 - exp)) as usize
    }
}

/// Target a share must meet at the given difficulty.
///
/// Computes `floor(DIFF1_TARGET / difficulty)` exactly by decomposing the
/// float into mantissa and exponent and dividing in 512-bit fixed point.
/// Saturates to `U256::MAX` when the quotient does not fit (difficulties so
/// low that every hash qualifies), and treats non-positive or non-finite
/// input the same way.
pub fn difficulty_to_target(difficulty: f64) -> U256 {
    if difficulty <= 0.0 || !difficulty.is_finite() {
        return U256::MAX;
    }

    // difficulty = mantissa * 2^exponent
    let bits = difficulty.to_bits();
    let exp_field = ((bits >> 52) & 0x7ff) as i64;
    let frac = bits & ((1u64 << 52) - 1);
    let (mantissa, exponent) = if exp_field == 0 {
        (frac, -1074)
    } else {
        (frac | (1u64 << 52), exp_field - 1075)
    };

    // DIFF1 < 2^224, so a left shift beyond 288 bits overflows U512; any
    // difficulty that small already saturates the 256-bit target.
    if exponent < -230 {
        return U256::MAX;
    }

    let mut wide = [0u8; 64];
    wide[32..].copy_from_slice(&DIFF1_TARGET.to_be_bytes::<32>());
    let num = U512::from_be_bytes(wide);
    let num = if exponent < 0 {
        num << (-exponent) as usize
    } else {
        num >> exponent as usize
    };
    let quotient = num / U512::from(mantissa);

    let bytes = quotient.to_be_bytes::<64>();
    if bytes[..32].iter().any(|&b| b != 0) {
        U256::MAX
    } else {
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes[32..]);
        U256::from_be_bytes(out)
    }
}

/// Interpret a 32-byte hash as the little-endian integer compared against
/// targets.
pub fn hash_value(hash: [u8; 32]) -> U256 {
    U256::from_le_bytes(hash)
}

/// Approximate difficulty of a compact target, for display.
pub fn bits_to_difficulty(bits: u32) -> f64 {
    let target = bits_to_target(bits);
    if target == U256::ZERO {
        return f64::INFINITY;
    }
    u256_to_f64(DIFF1_TARGET) / u256_to_f64(target)
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .to_be_bytes::<32>()
        .iter()
        .fold(0.0, |acc, &b| acc * 256.0 + b as f64)
}
