//! Branches and execute.

use crate::cpu::decode::{ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::ExecResult;

/// Branch on decrementing register: R-1, taken while the result is positive.
pub(crate) fn bdr(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.reg_signed(op.r).wrapping_sub(1);
    cpu.set_reg(op.r, value as u32);
    if value > 0 {
        cpu.set_ia(op.ea);
    }
    Ok(())
}

/// Branch on incrementing register: R+1, taken while the result is negative.
pub(crate) fn bir(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.reg_signed(op.r).wrapping_add(1);
    cpu.set_reg(op.r, value as u32);
    if value < 0 {
        cpu.set_ia(op.ea);
    }
    Ok(())
}

/// Execute the instruction at the effective address as if it were here.
pub(crate) fn exu(cpu: &mut Cpu, op: Operand, ctx: ExecContext) -> ExecResult {
    let word = cpu.mem.fetch_instruction(op.ea)?;
    cpu.execute_subject(op.ea, word, ctx)
}

/// Branch on conditions reset: taken when no CC bit selected by R is set.
pub(crate) fn bcr(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    if op.r as u8 & cpu.psd.cc == 0 {
        cpu.set_ia(op.ea);
    }
    Ok(())
}

/// Branch on conditions set: taken when any CC bit selected by R is set.
pub(crate) fn bcs(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    if op.r as u8 & cpu.psd.cc != 0 {
        cpu.set_ia(op.ea);
    }
    Ok(())
}

/// Branch and link: the return address goes to R.
pub(crate) fn bal(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let link = cpu.psd.ia;
    cpu.set_reg(op.r, link);
    cpu.set_ia(op.ea);
    Ok(())
}
