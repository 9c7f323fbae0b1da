//! Byte-string instructions.
//!
//! The string descriptors live in registers: R holds the source byte
//! address (and for TTBS a test mask in bits 0-7), R|1 holds the
//! destination byte address and a byte count in bits 0-7. The instruction
//! literal is a signed displacement added to the source. With R = 0 the
//! source is the single byte (or table) at the displacement and register 1
//! is the destination descriptor.

use crate::cpu::decode::{ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::ExecResult;
use crate::cpu::registers::{CC_CARRY, CC_NEGATIVE, CC_OVERFLOW, CC_POSITIVE};

const ADDRESS_MASK: u32 = 0x7_ffff;
/// Bits of the destination register kept when its address and count are rewritten.
const DESTINATION_KEEP: u32 = 0x00f8_0000;

/// Destination descriptor register pair.
#[derive(Debug, Clone, Copy)]
struct Strings {
    /// Register holding the source address, or `None` when R = 0.
    source_reg: Option<usize>,
    dest_reg: usize,
    source: u32,
    dest: u32,
    count: u32,
}

impl Strings {
    fn load(cpu: &Cpu, r: usize) -> Self {
        let (source_reg, dest_reg) = if r == 0 { (None, 1) } else { (Some(r), r | 1) };
        let dest_word = cpu.reg(dest_reg);
        Self {
            source_reg,
            dest_reg,
            source: source_reg.map_or(0, |s| cpu.reg(s) & ADDRESS_MASK),
            dest: dest_word & ADDRESS_MASK,
            count: dest_word >> 24,
        }
    }

    /// Rewrite the destination descriptor with the current address and a
    /// remaining byte count.
    fn store_dest(&self, cpu: &mut Cpu, remaining: u32) {
        let value = (cpu.reg(self.dest_reg) & DESTINATION_KEEP)
            | (self.dest & ADDRESS_MASK)
            | (remaining & 0xff) << 24;
        cpu.set_reg(self.dest_reg, value);
    }

    fn store_source(&self, cpu: &mut Cpu) {
        if let Some(s) = self.source_reg {
            let value = (cpu.reg(s) & !ADDRESS_MASK) | (self.source & ADDRESS_MASK);
            cpu.set_reg(s, value);
        }
    }
}

fn byte(cpu: &Cpu, addr: u32) -> Result<u8, crate::cpu::memory::MemoryFault> {
    Ok(cpu.mem.read_byte(addr)? as u8)
}

/// Translate and test: stop at the first destination byte whose translation
/// shares a bit with the mask. CC4 reports the stop; the matching bits are
/// returned in bits 0-7 of R.
pub(crate) fn ttbs(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let disp = op.value() as u32;
    let mut s = Strings::load(cpu, op.r);
    let mask = match s.source_reg {
        Some(r) => cpu.reg(r) >> 24,
        None => 0xff,
    };
    cpu.psd.cc &= !CC_NEGATIVE;

    let mut hit = 0;
    let mut done = 0;
    while done < s.count && hit == 0 {
        let b = byte(cpu, s.dest)? as u32;
        s.dest = s.dest.wrapping_add(1);
        let translated = byte(cpu, disp.wrapping_add(s.source).wrapping_add(b))? as u32;
        hit = mask & translated;
        done += 1;
    }
    if hit != 0 {
        s.dest = s.dest.wrapping_sub(1);
        done -= 1;
        cpu.psd.cc |= CC_NEGATIVE;
    }
    if let Some(r) = s.source_reg {
        let value = (cpu.reg(r) & 0x00ff_ffff) | hit << 24;
        cpu.set_reg(r, value);
    }
    s.store_dest(cpu, s.count - done);
    Ok(())
}

/// Translate in place: every destination byte is replaced by its entry in
/// the table at source + displacement.
pub(crate) fn tbs(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let disp = op.value() as u32;
    let mut s = Strings::load(cpu, op.r);
    for _ in 0..s.count {
        let b = byte(cpu, s.dest)? as u32;
        let translated = byte(cpu, disp.wrapping_add(s.source).wrapping_add(b))?;
        cpu.mem.write_byte(s.dest, translated)?;
        s.dest = s.dest.wrapping_add(1);
    }
    s.store_dest(cpu, 0);
    Ok(())
}

/// Compare byte strings up to the first difference; CC3/CC4 give the
/// unsigned ordering of source against destination.
pub(crate) fn cbs(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let disp = op.value() as u32;
    let mut s = Strings::load(cpu, op.r);
    let mut done = 0;
    let (source_byte, dest_byte) = if s.source_reg.is_some() {
        let (mut bs, mut bd) = (None, None);
        while done < s.count && bs == bd {
            bs = Some(byte(cpu, disp.wrapping_add(s.source))?);
            bd = Some(byte(cpu, s.dest)?);
            s.source = s.source.wrapping_add(1);
            s.dest = s.dest.wrapping_add(1);
            done += 1;
        }
        if bs != bd {
            s.source = s.source.wrapping_sub(1);
            s.dest = s.dest.wrapping_sub(1);
            done -= 1;
        }
        (bs, bd)
    } else {
        let bs = Some(byte(cpu, disp)?);
        let mut bd = bs;
        while done < s.count && bs == bd {
            bd = Some(byte(cpu, s.dest)?);
            s.dest = s.dest.wrapping_add(1);
            done += 1;
        }
        if bs != bd {
            s.dest = s.dest.wrapping_sub(1);
            done -= 1;
        }
        (bs, bd)
    };
    s.store_source(cpu);
    s.store_dest(cpu, s.count - done);

    cpu.psd.cc &= CC_CARRY | CC_OVERFLOW;
    if let (Some(bs), Some(bd)) = (source_byte, dest_byte) {
        if bs < bd {
            cpu.psd.cc |= CC_NEGATIVE;
        } else if bs > bd {
            cpu.psd.cc |= CC_POSITIVE;
        }
    }
    Ok(())
}

/// Move bytes from source to destination. With R = 0 the byte at the
/// displacement fills the destination.
pub(crate) fn mbs(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let disp = op.value() as u32;
    let mut s = Strings::load(cpu, op.r);
    let fill = match s.source_reg {
        Some(_) => None,
        None => Some(byte(cpu, disp)?),
    };
    for _ in 0..s.count {
        let b = match fill {
            Some(b) => b,
            None => {
                let b = byte(cpu, disp.wrapping_add(s.source))?;
                s.source = s.source.wrapping_add(1);
                b
            }
        };
        cpu.mem.write_byte(s.dest, b)?;
        s.dest = s.dest.wrapping_add(1);
    }
    s.store_source(cpu);
    s.store_dest(cpu, 0);
    Ok(())
}
