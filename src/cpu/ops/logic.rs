//! Boolean and selective (masked) word operations.
//!
//! The selective instructions take their mask from R|1 when R is even. With
//! an odd R the register is both operand and mask.

use crate::cpu::decode::{ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::ExecResult;
use crate::cpu::registers::{CC_CARRY, CC_NEGATIVE, CC_OVERFLOW, CC_POSITIVE};

fn combine(cpu: &mut Cpu, op: Operand, f: fn(u32, u32) -> u32) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    let result = f(cpu.reg(op.r), value);
    cpu.set_reg(op.r, result);
    cpu.psd.set_sign_cc(result as i32);
    Ok(())
}

pub(crate) fn and(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    combine(cpu, op, |r, v| r & v)
}

pub(crate) fn or(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    combine(cpu, op, |r, v| r | v)
}

pub(crate) fn eor(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    combine(cpu, op, |r, v| r ^ v)
}

/// Load selective: bits of the word under the mask replace those of R.
pub(crate) fn ls(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    let r = cpu.reg(op.r);
    let result = if op.r & 1 == 0 {
        let mask = cpu.reg(op.r | 1);
        (value & mask) | (r & !mask)
    } else {
        value & r
    };
    cpu.set_reg(op.r, result);
    cpu.psd.set_sign_cc(result as i32);
    Ok(())
}

/// Store selective: bits of R under the mask replace those of the word.
pub(crate) fn sts(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    let r = cpu.reg(op.r);
    let result = if op.r & 1 == 0 {
        let mask = cpu.reg(op.r | 1);
        (r & mask) | (value & !mask)
    } else {
        value | r
    };
    cpu.mem.write_word(op.ea, result)?;
    Ok(())
}

/// Compare selective, unsigned, under the mask.
pub(crate) fn cs(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    let r = cpu.reg(op.r);
    let (lhs, rhs) = if op.r & 1 == 0 {
        let mask = cpu.reg(op.r | 1);
        (r & mask, value & mask)
    } else {
        (r, value & r)
    };
    cpu.psd.cc &= CC_CARRY | CC_OVERFLOW;
    if lhs < rhs {
        cpu.psd.cc |= CC_NEGATIVE;
    } else if lhs > rhs {
        cpu.psd.cc |= CC_POSITIVE;
    }
    Ok(())
}
