//! 256-bit hash arithmetic. Hashes are interpreted as little-endian integers
//! whenever they are compared, shifted, or multiplied (the `arith_uint256`
//! convention); raw byte order is used everywhere else.

use primitive_types::{U256, U512};

/// Interpret a 32-byte hash as an unsigned 256-bit integer.
pub fn u256_from_hash(hash: &[u8; 32]) -> U256 {
    U256::from_little_endian(hash)
}

/// Expand a compact `nBits` difficulty encoding into a full 256-bit target.
///
/// Mantissa is the low 23 bits, exponent the high byte; values whose mantissa
/// would shift entirely out of range collapse to zero rather than erroring,
/// matching `SetCompact` on the reference chain.
pub fn target_from_compact(bits: u32) -> U256 {
    let exponent = bits >> 24;
    let mantissa = bits & 0x007f_ffff;
    if mantissa == 0 {
        return U256::zero();
    }
    let base = U256::from(mantissa);
    if exponent <= 3 {
        base >> (8 * (3 - exponent))
    } else {
        let shift = 8 * (exponent - 3);
        if shift >= 256 {
            U256::zero()
        } else {
            base << shift
        }
    }
}

/// `hash <= weight * target`, with the product kept at full 512-bit width so
/// a large coin-day weight can never silently wrap below the hash.
pub fn proof_meets_target(hash_proof: &[u8; 32], coin_day_weight: U256, target: U256) -> bool {
    let product: U512 = coin_day_weight.full_mul(target);
    U512::from(u256_from_hash(hash_proof)) <= product
}
