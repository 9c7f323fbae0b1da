//! Control instructions: PSD exchange, CALs, register pointer, direct
//! control, memory map control and instruction analysis.

use crate::cpu::decode::{ExecContext, InstructionWord, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::{CpuError, ExecResult, Fault};
use crate::cpu::interrupt::GroupOp;
use crate::cpu::registers::Psd;

/// XPSD instruction-word bit: load the register pointer from the new PSD.
pub const XPSD_LOAD_RP: u32 = 0x0080_0000;
/// XPSD instruction-word bit: advance the new IA by the trap function.
pub const XPSD_ADVANCE: u32 = 0x0040_0000;
/// XPSD instruction-word bit: keep the map on while executing from a trap.
pub const XPSD_KEEP_MAP: u32 = 0x0020_0000;

// ==================== PSD ====================

/// CAL1-CAL4 trap through .48-.4B with R as the trap function.
pub(crate) fn cal(_: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let number = op.word.opcode() - 0x03;
    Err(Fault::Call { number, r: op.r as u8 }.into())
}

/// Load PSD. The interrupt inhibits are replaced outright; R bit 8 also
/// loads the register pointer and R bit 2 clears the active interrupt,
/// re-arming it when R bit 1 is set.
pub(crate) fn lpsd(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let w0 = cpu.mem.read_word(op.ea)?;
    let w1 = cpu.mem.read_word(op.ea.wrapping_add(1))?;
    let mut next = Psd::from_words(w0, w1);
    if op.r & 0x8 == 0 {
        next.rp = cpu.psd.rp;
    }
    if op.r & 0x2 != 0 {
        let rearm = op.r & 0x1 != 0;
        cpu.interrupts.with(|c| c.clear_active(rearm));
    }
    cpu.load_psd(next);
    Ok(())
}

/// Exchange PSD: store the current PSD at the even doubleword A and load a
/// new one from A+2. Not privileged when run from a trap or interrupt
/// vector, where it also executes with write key 0 and (unless bit 10 of
/// the instruction is set) with the map off. The interrupt inhibits can only
/// be set by the new PSD, never cleared.
pub(crate) fn xpsd(cpu: &mut Cpu, op: Operand, ctx: ExecContext) -> ExecResult {
    let word = op.word;
    if !ctx.in_trap() && cpu.psd.slave {
        return Err(Fault::PrivilegedInstruction.into());
    }
    if ctx.in_trap() {
        cpu.mem.set_write_key(0);
    }
    let mut addr = word.reference();
    if word.indirect() {
        addr = cpu.mem.read_word(addr)?;
    }
    if ctx.in_trap() && !word.has(XPSD_KEEP_MAP) {
        cpu.mem.set_map_enabled(false);
    }
    addr &= 0x1_fffe;
    if word.x() != 0 {
        addr = addr.wrapping_add(cpu.reg(word.x()) << 1);
    }

    let (old0, old1) = cpu.psd.to_words();
    cpu.mem.write_word(addr, old0)?;
    cpu.mem.write_word(addr.wrapping_add(1), old1)?;
    let w0 = cpu.mem.read_word(addr.wrapping_add(2))?;
    let w1 = cpu.mem.read_word(addr.wrapping_add(3))?;

    let old = cpu.psd;
    let mut next = Psd::from_words(w0, w1);
    next.counter_inhibit |= old.counter_inhibit;
    next.io_inhibit |= old.io_inhibit;
    next.external_inhibit |= old.external_inhibit;
    if !word.has(XPSD_LOAD_RP) {
        next.rp = old.rp;
    }
    tracing::trace!(psd = addr, from = old.ia, to = next.ia, "exchange PSD");
    cpu.load_psd(next);
    Ok(())
}

/// Idle until an interrupt is pending.
pub(crate) fn wait(cpu: &mut Cpu, _: Operand, _: ExecContext) -> ExecResult {
    cpu.enter_wait();
    Ok(())
}

/// Load register pointer from bits 23-27 of the word.
pub(crate) fn lrp(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let value = cpu.mem.read_word(op.ea)?;
    cpu.set_rp((value >> 4) as u8);
    Ok(())
}

// ==================== Analyze ====================

/// Instruction classes reported in CC by ANLZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Analysis {
    Byte = 0,
    ImmediateByte = 1,
    Halfword = 4,
    Word = 8,
    ImmediateWord = 9,
    Doubleword = 12,
}

fn analysis(opcode: u8) -> Analysis {
    match opcode & 0x7f {
        0x00..=0x03 | 0x20..=0x23 => Analysis::ImmediateWord,
        0x08..=0x1f => Analysis::Doubleword,
        0x40..=0x43 | 0x60..=0x63 => Analysis::ImmediateByte,
        0x50..=0x5f => Analysis::Halfword,
        0x70..=0x7f => Analysis::Byte,
        _ => Analysis::Word,
    }
}

/// Analyze the instruction at the effective address: CC gets its operand
/// class (CC3 set when it is indirect) and R its effective address in
/// operand units.
pub(crate) fn anlz(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let subject = InstructionWord(cpu.mem.read_word(op.ea)?);
    let kind = analysis(subject.opcode());
    cpu.psd.cc = kind as u8;
    let (shift_left, shift_right, mask) = match kind {
        Analysis::ImmediateByte | Analysis::ImmediateWord => return Ok(()),
        Analysis::Byte => (2, 0, 0x7_ffff),
        Analysis::Halfword => (1, 0, 0x3_ffff),
        Analysis::Word => (0, 0, 0x1_ffff),
        Analysis::Doubleword => (0, 1, 0xffff),
    };
    let mut addr = subject.reference();
    if subject.indirect() {
        addr = cpu.mem.read_word(addr)? & 0x1_ffff;
        cpu.psd.cc |= 0x2;
    }
    addr = (addr << shift_left) >> shift_right;
    if subject.x() != 0 {
        addr = addr.wrapping_add(cpu.reg(subject.x()));
    }
    cpu.set_reg(op.r, addr & mask);
    Ok(())
}

// ==================== Direct control ====================

/// Read direct: sense switches into CC; .10 also clears R.
pub(crate) fn rd(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let addr = op.ea & 0xffff;
    match addr {
        0x00 => {}
        0x10 => {
            if op.r != 0 {
                cpu.set_reg(op.r, 0);
            }
        }
        _ => return Err(CpuError::UndefinedReadDirect { addr }.into()),
    }
    cpu.psd.cc = cpu.sense_switches() & 0xf;
    Ok(())
}

/// Write direct: interrupt group control, inhibit set/reset and the
/// control panel functions.
pub(crate) fn wd(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let addr = op.ea & 0xffff;
    if addr & 0xf8f0 == 0x1000 {
        let group = addr & 0xf;
        let mask = cpu.reg(op.r);
        let Some(group_op) = GroupOp::from_code((addr >> 8) & 0x7) else {
            return Err(CpuError::UndefinedWriteDirect { addr }.into());
        };
        tracing::debug!(?group_op, group, mask, "interrupt group control");
        cpu.interrupts.with(|c| c.apply_group(group_op, group, mask));
        return Ok(());
    }
    let (ci, ii, ei) = (addr & 0x4 != 0, addr & 0x2 != 0, addr & 0x1 != 0);
    match addr & 0xfff8 {
        0x30 => {
            let psd = cpu.psd;
            cpu.set_inhibits(
                psd.counter_inhibit || ci,
                psd.io_inhibit || ii,
                psd.external_inhibit || ei,
            );
        }
        0x20 => {
            let psd = cpu.psd;
            cpu.set_inhibits(
                psd.counter_inhibit && !ci,
                psd.io_inhibit && !ii,
                psd.external_inhibit && !ei,
            );
        }
        _ => match addr {
            0x40 | 0x41 | 0x42 | 0x45 => {
                tracing::warn!(addr, "control panel function ignored");
            }
            _ => return Err(CpuError::UndefinedWriteDirect { addr }.into()),
        },
    }
    Ok(())
}

// ==================== Memory map control ====================

/// Move memory map, access protection or write lock images into the
/// paging tables. R holds the source word address; R|1 holds the word
/// count in bits 0-7 (0 meaning 256) and the first page in bits 15-22.
/// Both registers are advanced past what was loaded.
pub(crate) fn mmc(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let word = op.word;
    let (r, ru) = (op.r, op.r | 1);
    let source = cpu.reg(r);
    let descriptor = cpu.reg(ru);
    let addr = source & 0x1_ffff;
    let count = match descriptor >> 24 {
        0 => 256,
        n => n,
    };

    let (page, next_page, keep, page_mask) = if word.has(0x0008_0000) {
        let page = (descriptor >> 9) & 0xff;
        cpu.mem.load_memory_map(addr, count as usize * 4, page as usize)?;
        (page, page + count * 4, 0x00fe_01ff, 0xff)
    } else if word.has(0x0004_0000) || word.has(0x0002_0000) {
        let page = (descriptor >> 9) & 0xfc;
        if word.has(0x0004_0000) {
            cpu.mem.load_access_protection(addr, count as usize * 16, page as usize)?;
        } else {
            cpu.mem.load_write_locks(addr, count as usize * 16, page as usize)?;
        }
        (page, page + count * 16, 0x00fe_07ff, 0xfc)
    } else {
        return Ok(());
    };
    tracing::debug!(page, count, "memory map control");

    cpu.set_reg(r, (source & 0xfffe_0000) | (addr.wrapping_add(count) & 0x1_ffff));
    cpu.set_reg(ru, (descriptor & keep) | (next_page & page_mask) << 9);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_classes() {
        assert_eq!(analysis(0x22), Analysis::ImmediateWord);
        assert_eq!(analysis(0x02), Analysis::ImmediateWord);
        assert_eq!(analysis(0x10), Analysis::Doubleword);
        assert_eq!(analysis(0x32), Analysis::Word);
        assert_eq!(analysis(0x40), Analysis::ImmediateByte);
        assert_eq!(analysis(0x52), Analysis::Halfword);
        assert_eq!(analysis(0x61), Analysis::ImmediateByte);
        assert_eq!(analysis(0x64), Analysis::Word);
        assert_eq!(analysis(0x72), Analysis::Byte);
    }
}
