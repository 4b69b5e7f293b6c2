//! Bit-scan and alignment helpers.
//!
//! The scan functions return a 0-based bit index (0..=31 for 32-bit words,
//! 0..=63 for 64-bit words). Every scan reports a word without any set bit
//! with the single sentinel [`BIT_NONE`].
//!
//! The top-level functions lower to the target's bit-scan instructions
//! (`tzcnt`/`lzcnt`, `bsf`/`bsr`, `rbit`+`clz`). The [`portable`] module holds
//! the bit-halving fallback used where no such instruction exists; both paths
//! must agree on every input.

use crate::error::{Error, Result};

/// Sentinel returned by every scan when the input word is zero.
pub const BIT_NONE: u32 = u32::MAX;

/// Index of the least-significant set bit, or [`BIT_NONE`] for zero.
#[inline]
pub const fn bit_ffs32(word: u32) -> u32 {
    if word == 0 {
        BIT_NONE
    } else {
        word.trailing_zeros()
    }
}

/// Index of the most-significant set bit, or [`BIT_NONE`] for zero.
#[inline]
pub const fn bit_fls32(word: u32) -> u32 {
    if word == 0 {
        BIT_NONE
    } else {
        31 - word.leading_zeros()
    }
}

/// Index of the least-significant set bit of a 64-bit word, or [`BIT_NONE`].
#[inline]
pub const fn bit_ffs64(word: u64) -> u32 {
    if word == 0 {
        BIT_NONE
    } else {
        word.trailing_zeros()
    }
}

/// Index of the most-significant set bit of a 64-bit word, or [`BIT_NONE`].
#[inline]
pub const fn bit_fls64(word: u64) -> u32 {
    if word == 0 {
        BIT_NONE
    } else {
        63 - word.leading_zeros()
    }
}

/// Returns true if `x` is nonzero and has exactly one set bit.
#[inline]
pub const fn bit_is_pow2(x: u32) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

/// Round `size` up to the next multiple of `align`.
///
/// Fails with [`Error::Precondition`] if `align` is not a power of two or if
/// the rounded value does not fit in a `u32`.
pub fn try_align_up(size: u32, align: u32) -> Result<u32> {
    if !bit_is_pow2(align) {
        return Err(Error::Precondition(format!(
            "alignment {align} is not a power of two"
        )));
    }

    let mask = align - 1;
    size.checked_add(mask)
        .map(|padded| padded & !mask)
        .ok_or_else(|| Error::Precondition(format!("aligning {size} to {align} overflows u32")))
}

/// Round `size` up to the next multiple of `align`.
///
/// # Panics
/// Panics if `align` is not a power of two or the result overflows `u32`.
/// These are caller bugs, never rounded around.
#[inline]
pub fn bit_align_up(size: u32, align: u32) -> u32 {
    match try_align_up(size, align) {
        Ok(aligned) => aligned,
        Err(e) => panic!("{e}"),
    }
}

/// Portable bit-halving scans for targets without a bit-scan instruction.
pub mod portable {
    /// 1-based position of the highest set bit, 0 when `word` is zero.
    const fn fls_generic(mut word: u32) -> u32 {
        let mut bit = 32;

        if word == 0 {
            bit -= 1;
        }
        if word & 0xffff_0000 == 0 {
            word <<= 16;
            bit -= 16;
        }
        if word & 0xff00_0000 == 0 {
            word <<= 8;
            bit -= 8;
        }
        if word & 0xf000_0000 == 0 {
            word <<= 4;
            bit -= 4;
        }
        if word & 0xc000_0000 == 0 {
            word <<= 2;
            bit -= 2;
        }
        if word & 0x8000_0000 == 0 {
            bit -= 1;
        }

        bit
    }

    /// Portable [`bit_ffs32`](super::bit_ffs32).
    #[inline]
    pub const fn ffs32(word: u32) -> u32 {
        // Isolate the lowest set bit, then scan it from the top.
        fls_generic(word & word.wrapping_neg()).wrapping_sub(1)
    }

    /// Portable [`bit_fls32`](super::bit_fls32).
    #[inline]
    pub const fn fls32(word: u32) -> u32 {
        fls_generic(word).wrapping_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// xorshift32, enough to spread samples over the whole input space.
    fn samples(count: usize) -> impl Iterator<Item = u32> {
        let mut state = 0x9e37_79b9_u32;
        (0..count).map(move |_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        })
    }

    fn assert_paths_agree(word: u32) {
        assert_eq!(bit_ffs32(word), portable::ffs32(word), "ffs32({word:#x})");
        assert_eq!(bit_fls32(word), portable::fls32(word), "fls32({word:#x})");
    }

    #[test]
    fn ffs_and_fls_known_values() {
        assert_eq!(bit_ffs32(1), 0);
        assert_eq!(bit_fls32(1), 0);
        assert_eq!(bit_ffs32(0x8000_0000), 31);
        assert_eq!(bit_fls32(0x8000_0000), 31);
        assert_eq!(bit_ffs32(0b1011_0000), 4);
        assert_eq!(bit_fls32(0b1011_0000), 7);
        assert_eq!(bit_ffs32(u32::MAX), 0);
        assert_eq!(bit_fls32(u32::MAX), 31);
    }

    #[test]
    fn zero_word_returns_sentinel() {
        assert_eq!(bit_ffs32(0), BIT_NONE);
        assert_eq!(bit_fls32(0), BIT_NONE);
        assert_eq!(portable::ffs32(0), BIT_NONE);
        assert_eq!(portable::fls32(0), BIT_NONE);
        assert_eq!(bit_ffs64(0), BIT_NONE);
        assert_eq!(bit_fls64(0), BIT_NONE);
    }

    #[test]
    fn scans_64_bit() {
        assert_eq!(bit_ffs64(1 << 40), 40);
        assert_eq!(bit_fls64(1 << 40), 40);
        assert_eq!(bit_ffs64(0x8000_0000_0000_0001), 0);
        assert_eq!(bit_fls64(0x8000_0000_0000_0001), 63);
        assert_eq!(bit_fls64(u64::from(u32::MAX)), 31);
    }

    #[test]
    fn paths_agree_on_single_and_double_bits() {
        for i in 0..32 {
            assert_paths_agree(1 << i);
            for j in 0..32 {
                assert_paths_agree((1 << i) | (1 << j));
            }
        }
    }

    #[test]
    fn paths_agree_on_sampled_words() {
        assert_paths_agree(0);
        assert_paths_agree(u32::MAX);
        for word in (0..=u32::MAX).step_by(65_537) {
            assert_paths_agree(word);
        }
        for word in samples(1_000_000) {
            assert_paths_agree(word);
        }
    }

    #[test]
    #[ignore = "walks all 2^32 inputs; run with --ignored in release"]
    fn paths_agree_exhaustively() {
        for word in 0..=u32::MAX {
            assert_paths_agree(word);
        }
    }

    #[test]
    fn is_pow2_matches_popcount() {
        assert!(!bit_is_pow2(0));
        assert!(bit_is_pow2(1));
        assert!(bit_is_pow2(0x8000_0000));
        assert!(!bit_is_pow2(6));
        for word in samples(100_000).chain(0..1024) {
            assert_eq!(bit_is_pow2(word), word.count_ones() == 1, "{word:#x}");
        }
    }

    #[test]
    fn align_up_examples() {
        assert_eq!(bit_align_up(13, 8), 16);
        assert_eq!(bit_align_up(16, 8), 16);
        assert_eq!(bit_align_up(0, 4), 0);
        assert_eq!(bit_align_up(1, 1), 1);
        assert_eq!(bit_align_up(5, 0x8000_0000), 0x8000_0000);
    }

    #[test]
    fn align_up_bounds() {
        for size in samples(10_000).map(|s| s >> 2) {
            for shift in 0..8 {
                let align = 1 << shift;
                let aligned = bit_align_up(size, align);
                assert!(aligned >= size);
                assert_eq!(aligned % align, 0);
                assert!(aligned - size < align);
            }
        }
    }

    #[test]
    fn align_up_rejects_non_pow2() {
        assert!(matches!(try_align_up(13, 6), Err(Error::Precondition(_))));
        assert!(matches!(try_align_up(13, 0), Err(Error::Precondition(_))));
    }

    #[test]
    fn align_up_rejects_overflow() {
        assert!(matches!(
            try_align_up(u32::MAX, 8),
            Err(Error::Precondition(_))
        ));
        assert_eq!(try_align_up(u32::MAX, 1), Ok(u32::MAX));
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn align_up_panics_on_non_pow2() {
        bit_align_up(13, 12);
    }
}
