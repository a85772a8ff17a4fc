//! Positional index arithmetic shared by every tree: base-2/base-3/base-M
//! digit conversions and integer exponentiation.
//!
//! Digits are produced most-significant first, so that digit 0 always
//! corresponds to the x axis (matching [`Octant`](crate::Octant) bit order).

use crate::Error;

/// A helper was called outside its documented domain.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("index out of range: 0..{1} ∌ {0}")]
    IndexOutOfRange(usize, usize),
    #[error("digit out of range: 0..{1} ∌ {0}")]
    DigitOutOfRange(usize, usize),
    #[error("positional base must be at least 2: {0}")]
    InvalidBase(usize),
    #[error("sample index {0} does not address a face sample")]
    NotAFaceSample(usize),
}

/// An index does not fit the requested digit capacity, or an integer power
/// wrapped.
#[derive(Debug, thiserror::Error)]
pub enum OverflowError {
    #[error("index {index} does not fit in {digits} base-{base} digits")]
    DigitCapacity {
        index: usize,
        base: usize,
        digits: usize,
    },
    #[error("integer power overflow: {0}^{1}")]
    Pow(u64, u32),
}

/// Decode an octant index into per-axis upper/lower selections, `[x, y, z]`.
///
/// # Errors
/// * [`DomainError::IndexOutOfRange`] if `i` ∉ 0..8
#[inline]
pub fn base2(i: usize) -> Result<[bool; 3], DomainError> {
    if i >= 8 {
        return Err(DomainError::IndexOutOfRange(i, 8));
    }
    Ok([(i >> 2) & 1 == 1, (i >> 1) & 1 == 1, i & 1 == 1])
}

/// Decode a 3×3×3 stencil index into per-axis digits ∈ {0, 1, 2}, `[x, y, z]`.
///
/// # Errors
/// * [`DomainError::IndexOutOfRange`] if `i` ∉ 0..27
#[inline]
pub fn base3(i: usize) -> Result<[usize; 3], DomainError> {
    if i >= 27 {
        return Err(DomainError::IndexOutOfRange(i, 27));
    }
    Ok([i / 9, (i / 3) % 3, i % 3])
}

/// General positional decomposition of `i` into `N` base-`base` digits,
/// most-significant first.
///
/// # Errors
/// * [`DomainError::InvalidBase`] if `base` < 2
/// * [`OverflowError::DigitCapacity`] if `i` ≥ `base`^`N`
pub fn digits<const N: usize>(mut i: usize, base: usize) -> Result<[usize; N], Error> {
    if base < 2 {
        return Err(DomainError::InvalidBase(base).into());
    }
    let index = i;
    let mut out = [0usize; N];
    for d in out.iter_mut().rev() {
        *d = i % base;
        i /= base;
    }
    if i != 0 {
        return Err(OverflowError::DigitCapacity {
            index,
            base,
            digits: N,
        }
        .into());
    }
    Ok(out)
}

/// Recompose most-significant-first digits into a flat index; the inverse of
/// [`digits`].
///
/// # Errors
/// * [`DomainError::InvalidBase`] if `base` < 2
/// * [`DomainError::DigitOutOfRange`] if any digit ≥ `base`
pub fn compose<const N: usize>(digits: &[usize; N], base: usize) -> Result<usize, DomainError> {
    if base < 2 {
        return Err(DomainError::InvalidBase(base));
    }
    let mut i = 0usize;
    for &d in digits {
        if d >= base {
            return Err(DomainError::DigitOutOfRange(d, base));
        }
        i = i * base + d;
    }
    Ok(i)
}

/// `base`^`exp` by squaring, with checked arithmetic.
///
/// # Errors
/// * [`OverflowError::Pow`] if the result wraps
pub fn uint_pow(base: u64, exp: u32) -> Result<u64, OverflowError> {
    let overflow = || OverflowError::Pow(base, exp);
    let mut acc: u64 = 1;
    let mut b = base;
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            acc = acc.checked_mul(b).ok_or_else(overflow)?;
        }
        e >>= 1;
        if e > 0 {
            b = b.checked_mul(b).ok_or_else(overflow)?;
        }
    }
    Ok(acc)
}

/// Signed counterpart of [`uint_pow`].
///
/// # Errors
/// * [`OverflowError::Pow`] if the result wraps
pub fn int_pow(base: i64, exp: u32) -> Result<i64, OverflowError> {
    let overflow = || OverflowError::Pow(base.unsigned_abs(), exp);
    let mut acc: i64 = 1;
    let mut b = base;
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            acc = acc.checked_mul(b).ok_or_else(overflow)?;
        }
        e >>= 1;
        if e > 0 {
            b = b.checked_mul(b).ok_or_else(overflow)?;
        }
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn base2_decodes_octants() {
        assert_eq!(base2(0).unwrap(), [false, false, false]);
        assert_eq!(base2(1).unwrap(), [false, false, true]);
        assert_eq!(base2(4).unwrap(), [true, false, false]);
        assert_eq!(base2(7).unwrap(), [true, true, true]);
        assert!(matches!(base2(8), Err(DomainError::IndexOutOfRange(8, 8))));
    }

    #[test]
    fn base3_decodes_stencil_positions() {
        assert_eq!(base3(0).unwrap(), [0, 0, 0]);
        assert_eq!(base3(13).unwrap(), [1, 1, 1]);
        assert_eq!(base3(26).unwrap(), [2, 2, 2]);
        assert!(base3(27).is_err());
    }

    #[quickcheck]
    fn base3_roundtrip(i: usize) -> quickcheck::TestResult {
        if i >= 27 {
            return quickcheck::TestResult::discard();
        }
        quickcheck::TestResult::from_bool(compose(&base3(i).unwrap(), 3).unwrap() == i)
    }

    #[quickcheck]
    fn digits_roundtrip(i: u16, base: u8) -> quickcheck::TestResult {
        let base = base as usize;
        if !(2..=9).contains(&base) {
            return quickcheck::TestResult::discard();
        }
        let i = i as usize;
        match digits::<6>(i, base) {
            Ok(d) => quickcheck::TestResult::from_bool(compose(&d, base).unwrap() == i),
            Err(_) => quickcheck::TestResult::from_bool(i >= base.pow(6)),
        }
    }

    #[test]
    fn digits_overflow() {
        assert!(digits::<2>(9, 3).is_err());
        assert_eq!(digits::<2>(8, 3).unwrap(), [2, 2]);
        assert!(digits::<3>(0, 1).is_err());
    }

    #[test]
    fn compose_rejects_bad_digits() {
        assert!(matches!(
            compose(&[0, 3, 1], 3),
            Err(DomainError::DigitOutOfRange(3, 3))
        ));
    }

    #[test]
    fn pow_by_squaring() {
        assert_eq!(uint_pow(3, 0).unwrap(), 1);
        assert_eq!(uint_pow(3, 3).unwrap(), 27);
        assert_eq!(uint_pow(2, 10).unwrap(), 1024);
        assert_eq!(uint_pow(0, 5).unwrap(), 0);
        assert!(uint_pow(u64::MAX, 2).is_err());
        assert_eq!(int_pow(-3, 3).unwrap(), -27);
        assert!(int_pow(i64::MAX, 2).is_err());
    }
}
