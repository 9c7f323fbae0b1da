//! Loads, stores and exchanges.

use super::{multiple_count, read_doubleword};
use crate::cpu::decode::{ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::ExecResult;
use crate::cpu::memory::MemoryFault;
use crate::cpu::registers::{sign_cc64, CC_CARRY, CC_OVERFLOW, CC_POSITIVE};

/// Bit set in memory by the load-and-set instructions.
const SET_BIT: u32 = 0x8000_0000;

fn load_register(cpu: &mut Cpu, r: usize, value: u32) {
    cpu.set_reg(r, value);
    cpu.psd.set_sign_cc(value as i32);
}

/// R bit 2 loads CC from bits 0-3 of `value`, R bit 1 loads the floating
/// mode flags from bits 5-7.
fn load_conditions(cpu: &mut Cpu, r: usize, value: u32) {
    if r & 0x2 != 0 {
        cpu.psd.cc = ((value >> 4) & 0xf) as u8;
    }
    if r & 0x1 != 0 {
        cpu.psd.set_float_flags(value);
    }
}

pub(crate) fn li(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    load_register(cpu, op.r, op.ea);
    Ok(())
}

pub(crate) fn lw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    load_register(cpu, op.r, value);
    Ok(())
}

pub(crate) fn lh(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_halfword(op.ea)? as i32;
    load_register(cpu, op.r, value as u32);
    Ok(())
}

/// Load byte, zero-extended.
pub(crate) fn lb(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_byte(op.ea)? as u8;
    cpu.set_reg(op.r, value as u32);
    cpu.psd.cc &= CC_CARRY | CC_OVERFLOW;
    if value != 0 {
        cpu.psd.cc |= CC_POSITIVE;
    }
    Ok(())
}

/// Load doubleword. CC reflects the 64-bit value.
pub(crate) fn ld(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = read_doubleword(cpu, op.ea)?;
    cpu.set_pair(op.r, value);
    cpu.psd.cc &= CC_CARRY | CC_OVERFLOW;
    cpu.psd.cc |= sign_cc64(value as i64);
    Ok(())
}

pub(crate) fn stw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.reg(op.r);
    cpu.mem.write_word(op.ea, value)?;
    Ok(())
}

/// Store halfword; CC2 reports that R did not fit in 16 bits.
pub(crate) fn sth(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.reg_signed(op.r);
    cpu.mem.write_halfword(op.ea, value as u16)?;
    cpu.psd.cc &= !CC_OVERFLOW;
    if !matches!(value >> 15, 0 | -1) {
        cpu.psd.cc |= CC_OVERFLOW;
    }
    Ok(())
}

pub(crate) fn stb(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.reg(op.r) as u8;
    cpu.mem.write_byte(op.ea, value)?;
    Ok(())
}

/// Store doubleword, R|1 to the odd word first.
pub(crate) fn std(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let (hi, lo) = (cpu.reg(op.r), cpu.reg(op.r | 1));
    cpu.mem.write_word(op.ea.wrapping_add(1), lo)?;
    cpu.mem.write_word(op.ea, hi)?;
    Ok(())
}

/// Exchange word between R and memory.
pub(crate) fn xw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    let old = cpu.reg(op.r);
    cpu.set_reg(op.r, value);
    cpu.mem.write_word(op.ea, old)?;
    cpu.psd.set_sign_cc(value as i32);
    Ok(())
}

/// Load multiple: CC registers starting at R, wrapping past R15.
pub(crate) fn lm(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    for i in 0..multiple_count(cpu.psd.cc) {
        let value = cpu.mem.read_word(op.ea.wrapping_add(i as u32))?;
        cpu.set_reg((op.r + i) & 0xf, value);
    }
    Ok(())
}

pub(crate) fn stm(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    for i in 0..multiple_count(cpu.psd.cc) {
        let value = cpu.reg((op.r + i) & 0xf);
        cpu.mem.write_word(op.ea.wrapping_add(i as u32), value)?;
    }
    Ok(())
}

/// Load the word into R and set its sign bit in memory. The set is skipped
/// when the word is a register.
fn load_and_set(cpu: &mut Cpu, op: Operand) -> Result<u32, MemoryFault> {
    let mut value = cpu.mem.read_word(op.ea)?;
    cpu.set_reg(op.r, value);
    if op.ea & 0x1_ffff > 15 {
        value |= SET_BIT;
        cpu.mem.write_word(op.ea, value)?;
    }
    Ok(value)
}

pub(crate) fn las(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = load_and_set(cpu, op)?;
    cpu.psd.set_sign_cc(value as i32);
    Ok(())
}

/// Privileged load-and-set; leaves CC alone.
pub(crate) fn lms(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    load_and_set(cpu, op)?;
    Ok(())
}

/// Load interpretive: CC from bits 0-3, R from bits 4-15, R|1 from bits 16-31.
pub(crate) fn int(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    cpu.psd.cc = (value >> 28) as u8;
    cpu.set_reg(op.r, (value >> 16) & 0xfff);
    cpu.set_reg(op.r | 1, value & 0xffff);
    Ok(())
}

pub(crate) fn lcfi(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    load_conditions(cpu, op.r, op.ea);
    Ok(())
}

pub(crate) fn lcf(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_byte(op.ea)? as u8;
    load_conditions(cpu, op.r, value as u32);
    Ok(())
}

/// Store CC and the floating mode flags as one byte.
pub(crate) fn stfc(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = (cpu.psd.cc & 0xf) << 4 | cpu.psd.float_flags();
    cpu.mem.write_byte(op.ea, value)?;
    Ok(())
}
