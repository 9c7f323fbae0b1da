//! Fixed-point arithmetic with Sigma condition-code semantics.
//!
//! Carry and overflow come from the operands and the untruncated result:
//! overflow when both operands have the same sign and the result's sign
//! differs; carry when the unsigned sum leaves the top bit. Subtraction is
//! `a + !b + 1`, so it carries exactly when no borrow occurs.

use crate::cpu::registers::{sign_cc, sign_cc64, CC_CARRY, CC_OVERFLOW};

/// Result of a 32-bit add or subtract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sum32 {
    pub value: u32,
    pub carry: bool,
    pub overflow: bool,
}

impl Sum32 {
    /// The full four-bit condition code for this result.
    pub fn cc(&self) -> u8 {
        let mut cc = sign_cc(self.value as i32);
        if self.overflow {
            cc |= CC_OVERFLOW;
        }
        if self.carry {
            cc |= CC_CARRY;
        }
        cc
    }
}

/// Result of a 64-bit add or subtract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sum64 {
    pub value: u64,
    pub carry: bool,
    pub overflow: bool,
}

impl Sum64 {
    pub fn cc(&self) -> u8 {
        let mut cc = sign_cc64(self.value as i64);
        if self.overflow {
            cc |= CC_OVERFLOW;
        }
        if self.carry {
            cc |= CC_CARRY;
        }
        cc
    }
}

/// `a + b`.
pub fn add32(a: u32, b: u32) -> Sum32 {
    let (value, carry) = a.overflowing_add(b);
    Sum32 {
        value,
        carry,
        overflow: ((a ^ value) & (b ^ value)) >> 31 != 0,
    }
}

/// `a - b`.
pub fn sub32(a: u32, b: u32) -> Sum32 {
    let value = a.wrapping_sub(b);
    Sum32 {
        value,
        carry: a >= b,
        overflow: ((a ^ b) & (a ^ value)) >> 31 != 0,
    }
}

/// `a + b` on doublewords.
pub fn add64(a: u64, b: u64) -> Sum64 {
    let (value, carry) = a.overflowing_add(b);
    Sum64 {
        value,
        carry,
        overflow: ((a ^ value) & (b ^ value)) >> 63 != 0,
    }
}

/// `a - b` on doublewords.
pub fn sub64(a: u64, b: u64) -> Sum64 {
    let value = a.wrapping_sub(b);
    Sum64 {
        value,
        carry: a >= b,
        overflow: ((a ^ b) & (a ^ value)) >> 63 != 0,
    }
}

/// Whether a 64-bit product or quotient is representable in 32 bits.
#[inline]
pub fn fits_word(value: i64) -> bool {
    i32::try_from(value).is_ok()
}

/// Sign-extend the low `bits` bits of `value`.
#[inline]
pub fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::registers::{CC_NEGATIVE, CC_POSITIVE};
    use proptest::prelude::*;

    #[test]
    fn test_add_overflow() {
        let s = add32(0x7fff_ffff, 1);
        assert_eq!(s.value, 0x8000_0000);
        assert!(s.overflow);
        assert!(!s.carry);
        assert_eq!(s.cc(), CC_OVERFLOW | CC_NEGATIVE);
    }

    #[test]
    fn test_add_carry() {
        let s = add32(0xffff_ffff, 1);
        assert_eq!(s.value, 0);
        assert!(s.carry);
        assert!(!s.overflow);
        assert_eq!(s.cc(), CC_CARRY);
    }

    #[test]
    fn test_sub_zero_zero() {
        let s = sub32(0, 0);
        assert_eq!(s.value, 0);
        assert!(!s.overflow);
        assert!(s.carry);
    }

    #[test]
    fn test_sub_overflow() {
        let s = sub32(0x8000_0000, 1);
        assert!(s.overflow);
        assert_eq!(s.value, 0x7fff_ffff);
        let s = sub32(0, 0x8000_0000);
        assert!(s.overflow);
        let s = sub32(1, 2);
        assert!(!s.carry);
        assert_eq!(s.cc(), CC_NEGATIVE);
    }

    #[test]
    fn test_doubleword() {
        let s = add64(0x0000_0000_ffff_ffff, 1);
        assert_eq!(s.value, 0x1_0000_0000);
        assert_eq!(s.cc(), CC_POSITIVE);
        let s = add64(0x7fff_ffff_ffff_ffff, 1);
        assert!(s.overflow);
        let s = sub64(5, 5);
        assert_eq!(s.cc(), CC_CARRY);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0xfffff, 20), -1);
        assert_eq!(sign_extend(0x7ffff, 20), 0x7ffff);
        assert_eq!(sign_extend(0x40, 7), -64);
        assert_eq!(sign_extend(0x8, 4), -8);
    }

    proptest! {
        #[test]
        fn prop_add_matches_wide(a: i32, b: i32) {
            let s = add32(a as u32, b as u32);
            let wide = a as i64 + b as i64;
            prop_assert_eq!(s.value as i32 as i64 != wide, s.overflow);
            prop_assert_eq!((a as u32 as u64 + b as u32 as u64) > 0xffff_ffff, s.carry);
        }

        #[test]
        fn prop_sub_matches_wide(a: i32, b: i32) {
            let s = sub32(a as u32, b as u32);
            let wide = a as i64 - b as i64;
            prop_assert_eq!(s.value as i32 as i64 != wide, s.overflow);
            prop_assert_eq!(s.value, (a as u32).wrapping_sub(b as u32));
        }
    }
}
