//! Shift instructions.
//!
//! The effective address (after indirection) is not used as an address:
//! bits 21-23 select the shift type and bits 25-31 a signed count, to which
//! the low seven bits of the index register are added. Negative counts
//! shift right.

use crate::cpu::alu::sign_extend;
use crate::cpu::decode::{ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::ExecResult;
use crate::cpu::registers::{CC_CARRY, CC_NEGATIVE, CC_OVERFLOW, CC_POSITIVE};

/// Shift types selected by bits 21-23 of the effective address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Logical,
    Circular,
    Arithmetic,
    Searching,
}

impl ShiftKind {
    /// Decode the three-bit type field into the kind and whether it acts on
    /// the register pair.
    pub fn decode(field: u32) -> (Self, bool) {
        let kind = match (field >> 1) & 0x3 {
            0 => ShiftKind::Logical,
            1 => ShiftKind::Circular,
            2 => ShiftKind::Arithmetic,
            _ => ShiftKind::Searching,
        };
        (kind, field & 1 != 0)
    }
}

/// Mnemonics of the eight shift types, in type-field order.
pub const SHIFT_NAMES: [&str; 8] = ["SLS", "SLD", "SCS", "SCD", "SAS", "SAD", "SSS", "SSD"];

fn shift_count(op: &Operand) -> i32 {
    sign_extend(((op.ea & 0x7f) + (op.index & 0x7f)) & 0x7f, 7)
}

/// A value of `width` bits held in a u64.
#[derive(Debug, Clone, Copy)]
struct Field {
    width: u32,
}

impl Field {
    fn mask(self) -> u64 {
        if self.width == 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    fn sign_bit(self) -> u64 {
        1u64 << (self.width - 1)
    }

    fn is_negative(self, v: u64) -> bool {
        v & self.sign_bit() != 0
    }

    /// Sign-extend to i64.
    fn signed(self, v: u64) -> i64 {
        let shift = 64 - self.width;
        ((v << shift) as i64) >> shift
    }
}

/// Left shift, one place at a time: every bit shifted out of the sign
/// position toggles CC1, and CC2 latches when the sign ever differs from
/// the original. A circular shift feeds the bit back in at the bottom.
fn shift_left(field: Field, value: u64, count: i32, circular: bool, cc: &mut u8) -> u64 {
    let sign = field.is_negative(value);
    let mut v = value;
    for _ in 0..count {
        let out = field.is_negative(v);
        if out {
            *cc ^= CC_CARRY;
        }
        v = (v << 1) & field.mask();
        if circular && out {
            v |= 1;
        }
        if field.is_negative(v) != sign {
            *cc |= CC_OVERFLOW;
        }
    }
    v
}

fn shift_right(field: Field, value: u64, places: u32, kind: ShiftKind) -> u64 {
    match kind {
        ShiftKind::Circular => {
            let n = places % field.width;
            if n == 0 {
                value
            } else {
                ((value >> n) | (value << (field.width - n))) & field.mask()
            }
        }
        ShiftKind::Arithmetic => {
            (field.signed(value) >> places.min(63)) as u64 & field.mask()
        }
        _ => {
            if places >= field.width {
                0
            } else {
                value >> places
            }
        }
    }
}

/// Searching shift: shift a positive value left until its sign bit is one
/// or the count runs out; CC4 reports that a one was found.
fn shift_search(field: Field, value: u64, count: i32, cc: &mut u8) -> u64 {
    let positive = |v: u64| v != 0 && !field.is_negative(v);
    let sign = field.is_negative(value);
    let mut v = value;
    if count >= 0 {
        let mut remaining = count;
        while remaining > 0 && positive(v) {
            v = (v << 1) & field.mask();
            if field.is_negative(v) != sign {
                *cc |= CC_OVERFLOW;
            }
            remaining -= 1;
        }
    } else {
        let mut remaining = -count;
        let mut fill = 0;
        while remaining > 0 && positive(v) {
            if v & 1 != 0 {
                fill = field.sign_bit();
            }
            v = (v >> 1) | fill;
            if field.is_negative(v) != sign {
                *cc |= CC_OVERFLOW;
            }
            remaining -= 1;
        }
    }
    if field.is_negative(v) {
        *cc |= CC_NEGATIVE;
    }
    v
}

/// S: logical, circular, arithmetic and searching shifts of R or R:R|1.
pub(crate) fn s(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let (kind, double) = ShiftKind::decode((op.ea >> 8) & 0x7);
    let count = shift_count(&op);
    let field = Field { width: if double { 64 } else { 32 } };
    let value = if double { cpu.pair(op.r) } else { cpu.reg(op.r) as u64 };

    let mut cc = cpu.psd.cc & (CC_POSITIVE | CC_NEGATIVE);
    let result = match kind {
        ShiftKind::Searching => shift_search(field, value, count, &mut cc),
        _ if count >= 0 => shift_left(field, value, count, kind == ShiftKind::Circular, &mut cc),
        _ => shift_right(field, value, count.unsigned_abs(), kind),
    };
    cpu.psd.cc = cc;

    if double {
        cpu.set_pair(op.r, result);
    } else {
        cpu.set_reg(op.r, result as u32);
    }
    tracing::trace!(kind = ?kind, double, count, "shift");
    Ok(())
}

/// Shift a floating-point value: normalize (positive count) or denormalize
/// (negative count) one hexadecimal digit at a time, adjusting the
/// characteristic. Returns the new value and CC.
fn shift_floating(field: Field, value: u64, count: i32, cc_in: u8) -> (u64, u8) {
    let fraction_bits = field.width - 8;
    let fraction_mask = (1u64 << fraction_bits) - 1;
    let lead_digit = 0xfu64 << (fraction_bits - 4);

    let mut negative = field.is_negative(value);
    let magnitude = if negative { value.wrapping_neg() & field.mask() } else { value };
    let mut characteristic = ((magnitude >> fraction_bits) & 0x7f) as i32;
    let mut fraction = magnitude & fraction_mask;
    let mut cc = cc_in & (CC_POSITIVE | CC_NEGATIVE);
    let mut underflow = false;

    let remaining = if fraction == 0 {
        cc = CC_CARRY;
        characteristic = 0;
        negative = false;
        count.abs()
    } else if count >= 0 {
        let mut remaining = count;
        while remaining > 0 && fraction & lead_digit == 0 {
            fraction <<= 4;
            characteristic -= 1;
            remaining -= 1;
            if characteristic & 0x7f == 0x7f {
                underflow = true;
                break;
            }
        }
        remaining
    } else {
        let mut remaining = -count;
        while remaining > 0 && fraction != 0 {
            fraction >>= 4;
            characteristic += 1;
            remaining -= 1;
            if characteristic & 0x7f == 0 {
                underflow = true;
                break;
            }
        }
        remaining
    };
    if count < 0 && fraction == 0 {
        cc = 0;
        characteristic = 0;
        negative = false;
        underflow = false;
    }

    let mut result = ((characteristic as u64 & 0x7f) << fraction_bits) | fraction;
    if negative {
        result = result.wrapping_neg() & field.mask();
        cc = (cc & (CC_CARRY | CC_OVERFLOW)) | CC_NEGATIVE;
    } else if result != 0 {
        cc = (cc & (CC_CARRY | CC_OVERFLOW)) | CC_POSITIVE;
    }
    if remaining == 0 {
        cc &= CC_POSITIVE | CC_NEGATIVE;
    }
    if underflow {
        cc |= CC_OVERFLOW;
    }
    if fraction & lead_digit != 0 {
        cc |= CC_CARRY;
    }
    (result, cc)
}

/// SF: bit 23 of the effective address selects long (R:R|1) format.
pub(crate) fn sf(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let double = op.ea & 0x100 != 0;
    let count = shift_count(&op);
    let field = Field { width: if double { 64 } else { 32 } };
    let value = if double { cpu.pair(op.r) } else { cpu.reg(op.r) as u64 };
    let (result, cc) = shift_floating(field, value, count, cpu.psd.cc);
    cpu.psd.cc = cc;
    if double {
        cpu.set_pair(op.r, result);
    } else {
        cpu.set_reg(op.r, result as u32);
    }
    Ok(())
}
