//! Fixed-point add, subtract, multiply, divide, compare and modify-and-test.

use super::read_doubleword;
use crate::cpu::alu::{add32, add64, fits_word, sign_extend, sub32, sub64, Sum32};
use crate::cpu::decode::{ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::{ExecResult, Fault};
use crate::cpu::registers::{sign_cc, sign_cc64, CC_CARRY, CC_NEGATIVE, CC_OVERFLOW, CC_POSITIVE};

// ==================== Helpers ====================

/// Commit a 32-bit sum to register `r`. An overflow with the arithmetic
/// mask set leaves the register alone and traps.
fn sum_to_register(cpu: &mut Cpu, r: usize, sum: Sum32) -> ExecResult {
    cpu.psd.cc = sum.cc();
    if sum.overflow && cpu.psd.arith_mask {
        return Err(Fault::ArithmeticOverflow.into());
    }
    cpu.set_reg(r, sum.value);
    Ok(())
}

/// Negating or taking the magnitude of the most negative value overflows:
/// CC reports overflow and negative, and the result is only written when
/// the arithmetic mask is clear.
fn negate_overflow(cpu: &mut Cpu) -> ExecResult {
    cpu.psd.cc = (cpu.psd.cc & CC_CARRY) | CC_OVERFLOW | CC_NEGATIVE;
    if cpu.psd.arith_mask {
        return Err(Fault::ArithmeticOverflow.into());
    }
    Ok(())
}

/// Signed compare setting CC3/CC4, plus CC2 when the operands share a one bit.
fn compare_with_mask(cpu: &mut Cpu, r: i32, value: i32) {
    cpu.psd.cc &= CC_CARRY;
    cpu.psd.cc |= compare(r, value);
    if r & value != 0 {
        cpu.psd.cc |= CC_OVERFLOW;
    }
}

/// CC_NEGATIVE when `a < b`, CC_POSITIVE when `a > b`.
fn compare<T: Ord>(a: T, b: T) -> u8 {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => CC_NEGATIVE,
        std::cmp::Ordering::Greater => CC_POSITIVE,
        std::cmp::Ordering::Equal => 0,
    }
}

fn read_halfword(cpu: &Cpu, ea: u32) -> Result<i32, Fault> {
    Ok(cpu.mem.read_halfword(ea)? as i32)
}

/// Store a 64-bit product with the high word in R and the low word in R|1.
fn store_product(cpu: &mut Cpu, r: usize, product: i64) {
    cpu.set_reg(r, (product >> 32) as u32);
    cpu.set_reg(r | 1, product as u32);
    cpu.psd.cc &= CC_CARRY;
    cpu.psd.cc |= sign_cc64(product);
    if !fits_word(product) {
        cpu.psd.cc |= CC_OVERFLOW;
    }
}

/// Quotient fits in a word and is not the most negative value.
fn quotient_fits(q: i64) -> bool {
    fits_word(q) && q != i32::MIN as i64
}

fn divide_fault(cpu: &mut Cpu) -> ExecResult {
    cpu.psd.cc |= CC_OVERFLOW;
    if cpu.psd.arith_mask {
        return Err(Fault::Divide.into());
    }
    Ok(())
}

/// Under the arithmetic mask an ordinary modify-and-test that overflows sets
/// CC and traps before memory is written. Counter instructions never trap.
fn modify_overflow(cpu: &mut Cpu, ctx: ExecContext, local_cc: u8) -> ExecResult {
    if ctx == ExecContext::Normal && local_cc & CC_OVERFLOW != 0 && cpu.psd.arith_mask {
        cpu.psd.cc = local_cc;
        return Err(Fault::ArithmeticOverflow.into());
    }
    Ok(())
}

/// Finish a modify-and-test. Ordinary execution sets CC; as a counter
/// interrupt instruction it clears the interrupt and raises the
/// counter-equals-zero level when the result is zero.
fn finish_modify(cpu: &mut Cpu, ctx: ExecContext, local_cc: u8) -> ExecResult {
    match ctx {
        ExecContext::Normal => {
            cpu.psd.cc = local_cc;
            Ok(())
        }
        ExecContext::InTrap(loc) => {
            cpu.interrupts.with(|c| {
                c.clear(loc);
                if local_cc & (CC_POSITIVE | CC_NEGATIVE) == 0 {
                    c.interrupt(loc + 6);
                }
            });
            Ok(())
        }
    }
}

// ==================== Add / subtract ====================

pub(crate) fn ai(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let sum = add32(cpu.reg(op.r), op.ea);
    sum_to_register(cpu, op.r, sum)
}

pub(crate) fn aw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    let sum = add32(cpu.reg(op.r), value);
    sum_to_register(cpu, op.r, sum)
}

pub(crate) fn sw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    let sum = sub32(cpu.reg(op.r), value);
    sum_to_register(cpu, op.r, sum)
}

pub(crate) fn ah(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = read_halfword(cpu, op.ea)?;
    let sum = add32(cpu.reg(op.r), value as u32);
    sum_to_register(cpu, op.r, sum)
}

pub(crate) fn sh(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = read_halfword(cpu, op.ea)?;
    let sum = sub32(cpu.reg(op.r), value as u32);
    sum_to_register(cpu, op.r, sum)
}

/// Add word to memory.
pub(crate) fn awm(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    let sum = add32(value, cpu.reg(op.r));
    cpu.psd.cc = sum.cc();
    if sum.overflow && cpu.psd.arith_mask {
        return Err(Fault::ArithmeticOverflow.into());
    }
    cpu.mem.write_word(op.ea, sum.value)?;
    Ok(())
}

pub(crate) fn ad(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = read_doubleword(cpu, op.ea)?;
    let sum = add64(cpu.pair(op.r), value);
    cpu.psd.cc = sum.cc();
    if sum.overflow && cpu.psd.arith_mask {
        return Err(Fault::ArithmeticOverflow.into());
    }
    cpu.set_pair(op.r, sum.value);
    Ok(())
}

pub(crate) fn sd(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = read_doubleword(cpu, op.ea)?;
    let sum = sub64(cpu.pair(op.r), value);
    cpu.psd.cc = sum.cc();
    if sum.overflow && cpu.psd.arith_mask {
        return Err(Fault::ArithmeticOverflow.into());
    }
    cpu.set_pair(op.r, sum.value);
    Ok(())
}

// ==================== Negate / absolute value ====================

pub(crate) fn lcw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let result = (cpu.mem.read_word(op.ea)? as i32).wrapping_neg();
    if result == i32::MIN {
        negate_overflow(cpu)?;
        cpu.set_reg(op.r, result as u32);
        return Ok(());
    }
    cpu.set_reg(op.r, result as u32);
    cpu.psd.cc &= CC_CARRY;
    cpu.psd.cc |= sign_cc(result);
    Ok(())
}

pub(crate) fn law(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let result = (cpu.mem.read_word(op.ea)? as i32).wrapping_abs();
    if result == i32::MIN {
        negate_overflow(cpu)?;
        cpu.set_reg(op.r, result as u32);
        return Ok(());
    }
    cpu.set_reg(op.r, result as u32);
    cpu.psd.cc &= CC_CARRY;
    if result != 0 {
        cpu.psd.cc |= CC_POSITIVE;
    }
    Ok(())
}

pub(crate) fn lcd(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let result = (read_doubleword(cpu, op.ea)? as i64).wrapping_neg();
    if result == i64::MIN {
        negate_overflow(cpu)?;
        cpu.set_pair(op.r, result as u64);
        return Ok(());
    }
    cpu.set_pair(op.r, result as u64);
    cpu.psd.cc &= CC_CARRY;
    cpu.psd.cc |= sign_cc64(result);
    Ok(())
}

pub(crate) fn lad(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let result = (read_doubleword(cpu, op.ea)? as i64).wrapping_abs();
    if result == i64::MIN {
        negate_overflow(cpu)?;
        cpu.set_pair(op.r, result as u64);
        return Ok(());
    }
    cpu.set_pair(op.r, result as u64);
    cpu.psd.cc &= CC_CARRY;
    if result != 0 {
        cpu.psd.cc |= CC_POSITIVE;
    }
    Ok(())
}

pub(crate) fn lch(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let result = -read_halfword(cpu, op.ea)?;
    cpu.set_reg(op.r, result as u32);
    cpu.psd.set_sign_cc(result);
    Ok(())
}

pub(crate) fn lah(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let result = read_halfword(cpu, op.ea)?.abs();
    cpu.set_reg(op.r, result as u32);
    cpu.psd.cc &= CC_CARRY | CC_OVERFLOW;
    if result != 0 {
        cpu.psd.cc |= CC_POSITIVE;
    }
    Ok(())
}

// ==================== Compare ====================

pub(crate) fn ci(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let r = cpu.reg_signed(op.r);
    compare_with_mask(cpu, r, op.value());
    Ok(())
}

pub(crate) fn cw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)? as i32;
    let r = cpu.reg_signed(op.r);
    compare_with_mask(cpu, r, value);
    Ok(())
}

pub(crate) fn ch(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = read_halfword(cpu, op.ea)?;
    let r = cpu.reg_signed(op.r);
    compare_with_mask(cpu, r, value);
    Ok(())
}

/// Compare byte: both operands unsigned, R contributes its low byte.
pub(crate) fn cb(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_byte(op.ea)? as u8 as i32;
    let r = (cpu.reg(op.r) & 0xff) as i32;
    compare_with_mask(cpu, r, value);
    Ok(())
}

pub(crate) fn cd(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = read_doubleword(cpu, op.ea)? as i64;
    cpu.psd.cc &= CC_CARRY | CC_OVERFLOW;
    let r = cpu.pair(op.r) as i64;
    cpu.psd.cc |= compare(r, value);
    Ok(())
}

/// Compare with limits in registers: R against the word sets CC3/CC4,
/// R|1 against it sets CC2/CC1.
pub(crate) fn clr(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)? as i32;
    let low = compare(cpu.reg_signed(op.r), value);
    let high = compare(cpu.reg_signed(op.r | 1), value);
    cpu.psd.cc = low | high << 2;
    Ok(())
}

/// Compare with limits in memory: R against both words of the doubleword.
pub(crate) fn clm(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let limits = read_doubleword(cpu, op.ea)?;
    let r = cpu.reg_signed(op.r);
    let low = compare(r, (limits >> 32) as u32 as i32);
    let high = compare(r, limits as u32 as i32);
    cpu.psd.cc = low | high << 2;
    Ok(())
}

// ==================== Multiply / divide ====================

pub(crate) fn mi(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let product = op.value() as i64 * cpu.reg_signed(op.r | 1) as i64;
    store_product(cpu, op.r, product);
    Ok(())
}

pub(crate) fn mw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)? as i32;
    let product = value as i64 * cpu.reg_signed(op.r | 1) as i64;
    store_product(cpu, op.r, product);
    Ok(())
}

/// Multiply halfword: R|1 gets the halfword times the low half of R.
pub(crate) fn mh(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = read_halfword(cpu, op.ea)?;
    let result = value * sign_extend(cpu.reg(op.r), 16);
    cpu.set_reg(op.r | 1, result as u32);
    cpu.psd.set_sign_cc(result);
    Ok(())
}

/// Divide word. An even R divides the doubleword R:R|1, an odd R divides
/// R alone. Remainder goes to R, quotient to R|1.
pub(crate) fn dw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let divisor = cpu.mem.read_word(op.ea)? as i32 as i64;
    cpu.psd.cc &= !CC_OVERFLOW;
    if divisor == 0 {
        return divide_fault(cpu);
    }
    let dividend = if op.r & 1 == 0 {
        cpu.pair(op.r) as i64
    } else {
        cpu.reg_signed(op.r) as i64
    };
    let quotient = match dividend.checked_div(divisor) {
        Some(q) if quotient_fits(q) => q,
        _ => return divide_fault(cpu),
    };
    let remainder = dividend.wrapping_rem(divisor);
    cpu.set_reg(op.r, remainder as u32);
    cpu.set_reg(op.r | 1, quotient as u32);
    cpu.psd.set_sign_cc(quotient as i32);
    Ok(())
}

/// Divide halfword: R is replaced by the quotient; the remainder is lost.
pub(crate) fn dh(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let divisor = read_halfword(cpu, op.ea)? as i64;
    cpu.psd.cc &= !CC_OVERFLOW;
    if divisor == 0 {
        return divide_fault(cpu);
    }
    let quotient = cpu.reg_signed(op.r) as i64 / divisor;
    if !quotient_fits(quotient) {
        return divide_fault(cpu);
    }
    cpu.set_reg(op.r, quotient as u32);
    cpu.psd.set_sign_cc(quotient as i32);
    Ok(())
}

// ==================== Conversion ====================

/// Convert by subtraction: walk a 32-word table, subtracting each entry that
/// fits and shifting a one bit into R|1 for it.
pub(crate) fn cvs(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let mut value = cpu.reg(op.r);
    let mut bits = 0u32;
    for i in 0..32 {
        let entry = cpu.mem.read_word(op.ea.wrapping_add(i))?;
        bits <<= 1;
        if entry <= value {
            value -= entry;
            bits |= 1;
        }
    }
    cpu.set_reg(op.r, value);
    cpu.set_reg(op.r | 1, bits);
    cpu.psd.set_sign_cc(bits as i32);
    Ok(())
}

/// Convert by addition: sum the table entries selected by the bits of R|1,
/// most significant bit first.
pub(crate) fn cva(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let bits = cpu.reg(op.r | 1);
    let mut sum = 0u64;
    for i in 0..32 {
        if bits & (0x8000_0000 >> i) != 0 {
            sum += cpu.mem.read_word(op.ea.wrapping_add(i))? as u64;
        }
    }
    cpu.set_reg(op.r, sum as u32);
    cpu.psd.cc &= CC_OVERFLOW;
    cpu.psd.cc |= sign_cc(sum as u32 as i32);
    if sum > u32::MAX as u64 {
        cpu.psd.cc |= CC_CARRY;
    }
    Ok(())
}

// ==================== Modify and test ====================

/// Modify and test word. R (as a signed four-bit value) is added to the
/// word; R = 0 only tests it.
pub(crate) fn mtw(cpu: &mut Cpu, op: Operand, ctx: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    let local_cc = if op.r == 0 {
        sign_cc(value as i32)
    } else {
        let sum = add32(value, sign_extend(op.r as u32, 4) as u32);
        modify_overflow(cpu, ctx, sum.cc())?;
        cpu.mem.write_word(op.ea, sum.value)?;
        sum.cc()
    };
    finish_modify(cpu, ctx, local_cc)
}

pub(crate) fn mth(cpu: &mut Cpu, op: Operand, ctx: ExecContext) -> ExecResult {
    let value = cpu.mem.read_halfword(op.ea)?;
    let local_cc = if op.r == 0 {
        sign_cc(value as i32)
    } else {
        let a = value as u16 as u32;
        let b = sign_extend(op.r as u32, 4) as u32 & 0xffff;
        let result = a + b;
        let mut cc = if result & 0x8000 != 0 {
            CC_NEGATIVE
        } else if result & 0x7fff != 0 {
            CC_POSITIVE
        } else {
            0
        };
        if !(a ^ b) & (result ^ a) & 0x8000 != 0 {
            cc |= CC_OVERFLOW;
        }
        if result & 0xf_0000 != 0 {
            cc |= CC_CARRY;
        }
        modify_overflow(cpu, ctx, cc)?;
        cpu.mem.write_halfword(op.ea, result as u16)?;
        cc
    };
    finish_modify(cpu, ctx, local_cc)
}

/// Modify and test byte. Bytes are unsigned, so only CC2 and CC1 (carry)
/// are reported and overflow never traps.
pub(crate) fn mtb(cpu: &mut Cpu, op: Operand, ctx: ExecContext) -> ExecResult {
    let value = cpu.mem.read_byte(op.ea)? as u8 as u32;
    let local_cc = if op.r == 0 {
        if value != 0 { CC_POSITIVE } else { 0 }
    } else {
        let result = value + (sign_extend(op.r as u32, 4) as u32 & 0xff);
        cpu.mem.write_byte(op.ea, result as u8)?;
        let mut cc = 0;
        if result & 0xff != 0 {
            cc |= CC_POSITIVE;
        }
        if result & 0xf00 != 0 {
            cc |= CC_CARRY;
        }
        cc
    };
    finish_modify(cpu, ctx, local_cc)
}
