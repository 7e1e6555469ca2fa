use super::*;

/// Per-algorithm difficulty conventions. `diff1` is the 256-bit target that
/// corresponds to difficulty 1; `min_diff` is the floor a share difficulty is
/// reported at.
pub(crate) struct AlgoParams {
    pub(crate) diff1: U256,
    pub(crate) min_diff: f64,
}

pub(crate) static KOMODO: LazyLock<AlgoParams> = LazyLock::new(|| AlgoParams {
    diff1: U256::from_big_endian(&[0x0f; 32]),
    min_diff: 1.0,
});

pub(crate) static ZCASH: LazyLock<AlgoParams> = LazyLock::new(|| {
    let mut bytes = [0xff; 32];
    bytes[0] = 0x00;
    bytes[1] = 0x07;
    AlgoParams {
        diff1: U256::from_big_endian(&bytes),
        min_diff: 1.0,
    }
});

pub(crate) fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .enumerate()
        .map(|(i, limb)| *limb as f64 * 2f64.powi(64 * i as i32))
        .sum()
}

/// Ratio between the Zcash and Komodo difficulty-1 targets. Miner-facing
/// targets are expressed in the Zcash unit space, internal difficulty in
/// Komodo's.
pub(crate) fn scaling_factor() -> f64 {
    u256_to_f64(ZCASH.diff1) / u256_to_f64(KOMODO.diff1)
}

/// The 256-bit share target for a miner difficulty:
/// `komodo.diff1 / (difficulty / scaling_factor)`.
///
/// Division is done on integers after scaling the divisor up, widening into
/// 512 bits so the high bits of `diff1` survive the multiply.
pub(crate) fn target_for_difficulty(difficulty: f64) -> U256 {
    assert!(
        difficulty.is_finite() && difficulty > 0.0,
        "difficulty must be finite and > 0"
    );

    let adjusted = difficulty / scaling_factor();

    const MAX_SCALE: f64 = 0xffff_ffffu32 as f64;

    let scale = (u64::MAX as f64 / adjusted).floor().min(MAX_SCALE).max(1.0) as u64;
    let denominator = (adjusted * scale as f64).round() as u64;

    if denominator == 0 {
        return U256::MAX;
    }

    let wide = KOMODO.diff1.full_mul(U256::from(scale)) / U512::from(denominator);

    U256::try_from(wide).unwrap_or(U256::MAX)
}

/// 64 hex char big-endian rendering for `mining.set_target`.
pub(crate) fn target_to_hex(target: U256) -> String {
    hex::encode(target.to_big_endian())
}

pub(crate) fn difficulty_for_target(target: U256) -> f64 {
    u256_to_f64(KOMODO.diff1) / u256_to_f64(target)
}

/// Difficulty of a share whose 140-byte-header-plus-solution double-SHA256
/// digest is `hash`, interpreted as a little-endian 256-bit integer.
pub(crate) fn share_difficulty(hash: &[u8; 32]) -> f64 {
    u256_to_f64(KOMODO.diff1) / u256_to_f64(U256::from_little_endian(hash))
}

/// Expands a compact-bits representation (`nBits`) into the full 256-bit
/// target. Used when a template carries no explicit `target` field.
pub(crate) fn target_from_compact(bits: u32) -> U256 {
    let exponent = (bits >> 24) as usize;
    let mantissa = U256::from(bits & 0x007f_ffff);

    if exponent <= 3 {
        mantissa >> (8 * (3 - exponent))
    } else {
        mantissa << (8 * (exponent - 3))
    }
}
