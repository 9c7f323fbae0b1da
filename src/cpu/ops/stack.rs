//! Push-down stack instructions.
//!
//! A stack is described by a doubleword in memory: the top-of-stack word
//! address in word 0, and in word 1 the space count (bits 1-15), the word
//! count (bits 17-31) and two trap-inhibit bits (TS, bit 0; TW, bit 16).
//! Either count leaving 0..=0x7FFF traps to .42 unless its inhibit bit is
//! set, in which case nothing is transferred and CC reports the limit.

use super::multiple_count;
use crate::cpu::alu::sign_extend;
use crate::cpu::decode::{ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::{Exception, ExecResult, Fault};
use crate::cpu::memory::MemoryFault;

const TOP_MASK: u32 = 0x1_ffff;
const COUNT_LIMIT: i32 = 0x7fff;
const TRAP_INHIBITS: u32 = 0x8000_8000;

/// CC1: space limit reached with TS set.
const CC_SPACE_LIMIT: u8 = 0x8;
/// CC2: word limit reached with TW set.
const CC_WORD_LIMIT: u8 = 0x2;
/// CC3: space count is zero.
const CC_SPACE_EMPTY: u8 = 0x4;
/// CC4: word count is zero.
const CC_WORDS_EMPTY: u8 = 0x1;

/// Decoded stack pointer doubleword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StackPointer {
    word0: u32,
    word1: u32,
    top: u32,
    space: i32,
    words: i32,
}

impl StackPointer {
    fn read(cpu: &Cpu, ea: u32) -> Result<Self, MemoryFault> {
        let word0 = cpu.mem.read_word(ea)?;
        let word1 = cpu.mem.read_word(ea.wrapping_add(1))?;
        Ok(Self {
            word0,
            word1,
            top: word0 & TOP_MASK,
            space: ((word1 >> 16) & 0x7fff) as i32,
            words: (word1 & 0x7fff) as i32,
        })
    }

    fn write(&self, cpu: &mut Cpu, ea: u32) -> Result<(), MemoryFault> {
        let word0 = (self.word0 & !TOP_MASK) | (self.top & TOP_MASK);
        let word1 = (self.word1 & TRAP_INHIBITS)
            | (self.space as u32 & 0x7fff) << 16
            | (self.words as u32 & 0x7fff);
        cpu.mem.write_word(ea, word0)?;
        cpu.mem.write_word(ea.wrapping_add(1), word1)
    }

    fn tolerate_space(&self) -> bool {
        self.word1 & 0x8000_0000 != 0
    }

    fn tolerate_words(&self) -> bool {
        self.word1 & 0x0000_8000 != 0
    }

    fn status(&self) -> u8 {
        let mut cc = 0;
        if self.space == 0 {
            cc |= CC_SPACE_EMPTY;
        }
        if self.words == 0 {
            cc |= CC_WORDS_EMPTY;
        }
        cc
    }

    /// Move `delta` words onto (positive) or off (negative) the stack's
    /// counts. Returns `Ok(false)` when a tolerated limit stops the transfer.
    /// CC is set either way.
    fn adjust(&mut self, cpu: &mut Cpu, delta: i32) -> Result<bool, Exception> {
        let space = self.space - delta;
        let words = self.words + delta;
        let mut limit = 0;
        if !(0..=COUNT_LIMIT).contains(&words) {
            if !self.tolerate_words() {
                return Err(Fault::StackLimit.into());
            }
            limit |= CC_WORD_LIMIT;
        }
        if !(0..=COUNT_LIMIT).contains(&space) {
            if !self.tolerate_space() {
                return Err(Fault::StackLimit.into());
            }
            limit |= CC_SPACE_LIMIT;
        }
        if limit != 0 {
            cpu.psd.cc = limit | self.status();
            return Ok(false);
        }
        self.space = space;
        self.words = words;
        cpu.psd.cc = self.status();
        Ok(true)
    }
}

/// Pull word into R.
pub(crate) fn plw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let mut sp = StackPointer::read(cpu, op.ea)?;
    if !sp.adjust(cpu, -1)? {
        return Ok(());
    }
    let value = cpu.mem.read_word(sp.top)?;
    sp.top = sp.top.wrapping_sub(1);
    sp.write(cpu, op.ea)?;
    cpu.set_reg(op.r, value);
    Ok(())
}

/// Push R onto the stack.
pub(crate) fn psw(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let mut sp = StackPointer::read(cpu, op.ea)?;
    if !sp.adjust(cpu, 1)? {
        return Ok(());
    }
    sp.top = sp.top.wrapping_add(1);
    let value = cpu.reg(op.r);
    cpu.mem.write_word(sp.top, value)?;
    sp.write(cpu, op.ea)?;
    Ok(())
}

/// Pull CC registers (0 meaning 16); the top word goes to the last register.
/// No register changes unless the updated pointer was stored.
pub(crate) fn plm(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let count = multiple_count(cpu.psd.cc);
    let mut sp = StackPointer::read(cpu, op.ea)?;
    if !sp.adjust(cpu, -(count as i32))? {
        return Ok(());
    }
    let base = sp.top.wrapping_sub(count as u32 - 1);
    let mut pulled = [0u32; 16];
    for (i, slot) in pulled[..count].iter_mut().enumerate() {
        *slot = cpu.mem.read_word(base.wrapping_add(i as u32))?;
    }
    sp.top = sp.top.wrapping_sub(count as u32);
    sp.write(cpu, op.ea)?;
    for (i, &value) in pulled[..count].iter().enumerate() {
        cpu.set_reg((op.r + i) & 0xf, value);
    }
    Ok(())
}

/// Push CC registers (0 meaning 16) starting with R.
pub(crate) fn psm(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let count = multiple_count(cpu.psd.cc);
    let mut sp = StackPointer::read(cpu, op.ea)?;
    if !sp.adjust(cpu, count as i32)? {
        return Ok(());
    }
    for i in 0..count {
        let value = cpu.reg((op.r + i) & 0xf);
        cpu.mem.write_word(sp.top.wrapping_add(1 + i as u32), value)?;
    }
    sp.top = sp.top.wrapping_add(count as u32);
    sp.write(cpu, op.ea)?;
    Ok(())
}

/// Modify stack pointer by the signed halfword in R.
pub(crate) fn msp(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let modifier = sign_extend(cpu.reg(op.r), 16);
    let mut sp = StackPointer::read(cpu, op.ea)?;
    if !sp.adjust(cpu, modifier)? {
        return Ok(());
    }
    sp.top = sp.top.wrapping_add(modifier as u32);
    sp.write(cpu, op.ea)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::ops::testing::{cpu_with, set_psd, trap_to, HANDLER, START};

    const PLW: u8 = 0x08;
    const PSW: u8 = 0x09;
    const PLM: u8 = 0x0A;
    const PSM: u8 = 0x0B;
    const MSP: u8 = 0x13;
    const SP: u32 = 0x100;

    /// `opcode,r SP` with a stack whose top is at `top`.
    fn stack_cpu(opcode: u8, r: usize, top: u32, word1: u32) -> Cpu {
        let mut cpu = cpu_with(&[encode(opcode, r, 0, SP, false)]);
        cpu.load_words(SP, &[top, word1]).unwrap();
        trap_to(&mut cpu, 0x42);
        cpu
    }

    fn counts(space: u32, words: u32) -> u32 {
        space << 16 | words
    }

    fn pointer(space: i32, words: i32, inhibits: u32) -> StackPointer {
        StackPointer {
            word0: 0x1000,
            word1: inhibits | (space as u32) << 16 | words as u32,
            top: 0x1000,
            space,
            words,
        }
    }

    #[test]
    fn test_inhibit_bits() {
        assert!(pointer(1, 1, 0x8000_0000).tolerate_space());
        assert!(!pointer(1, 1, 0x8000_0000).tolerate_words());
        assert!(pointer(1, 1, 0x8000).tolerate_words());
    }

    #[test]
    fn test_status() {
        assert_eq!(pointer(0, 0, 0).status(), CC_SPACE_EMPTY | CC_WORDS_EMPTY);
        assert_eq!(pointer(3, 0, 0).status(), CC_WORDS_EMPTY);
        assert_eq!(pointer(0, 3, 0).status(), CC_SPACE_EMPTY);
    }

    #[test]
    fn test_push_then_pull_word() {
        let mut cpu = stack_cpu(PSW, 3, 0x400, counts(5, 0));
        cpu.write_word(START + 1, encode(PLW, 4, 0, SP, false)).unwrap();
        cpu.set_register(3, 0x77);
        cpu.step().unwrap();
        assert_eq!(cpu.read_word(0x401), Some(0x77));
        assert_eq!(cpu.read_word(SP), Some(0x401));
        assert_eq!(cpu.read_word(SP + 1), Some(counts(4, 1)));
        assert_eq!(cpu.psd().cc, 0);

        cpu.step().unwrap();
        assert_eq!(cpu.register(4), 0x77);
        assert_eq!(cpu.read_word(SP), Some(0x400));
        assert_eq!(cpu.read_word(SP + 1), Some(counts(5, 0)));
        assert_eq!(cpu.psd().cc, CC_WORDS_EMPTY);
    }

    #[test]
    fn test_space_exhausted_traps() {
        let mut cpu = stack_cpu(PSW, 3, 0x400, counts(0, 2));
        cpu.set_register(3, 0x77);
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, HANDLER);
        assert_eq!(cpu.read_word(0x401), Some(0));
        assert_eq!(cpu.read_word(SP), Some(0x400));
        assert_eq!(cpu.read_word(SP + 1), Some(counts(0, 2)));
    }

    #[test]
    fn test_space_limit_tolerated() {
        let word1 = 0x8000_0000 | counts(0, 3);
        let mut cpu = stack_cpu(PSW, 3, 0x400, word1);
        cpu.set_register(3, 0x77);
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, START + 1);
        assert_eq!(cpu.psd().cc, CC_SPACE_LIMIT | CC_SPACE_EMPTY);
        assert_eq!(cpu.read_word(0x401), Some(0));
        assert_eq!(cpu.read_word(SP), Some(0x400));
        assert_eq!(cpu.read_word(SP + 1), Some(word1));
    }

    #[test]
    fn test_word_limit_tolerated() {
        let word1 = 0x8000 | counts(5, 0);
        let mut cpu = stack_cpu(PLW, 4, 0x400, word1);
        cpu.set_register(4, 0x44);
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, START + 1);
        assert_eq!(cpu.psd().cc, CC_WORD_LIMIT | CC_WORDS_EMPTY);
        assert_eq!(cpu.register(4), 0x44);
        assert_eq!(cpu.read_word(SP + 1), Some(word1));
    }

    #[test]
    fn test_pull_from_empty_stack_traps() {
        let mut cpu = stack_cpu(PLW, 4, 0x400, counts(5, 0));
        cpu.set_register(4, 0x44);
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, HANDLER);
        assert_eq!(cpu.register(4), 0x44);
    }

    #[test]
    fn test_push_multiple_wraps_register_numbers() {
        let mut cpu = stack_cpu(PSM, 14, 0x400, counts(8, 0));
        cpu.write_word(START + 1, encode(PLM, 14, 0, SP, false)).unwrap();
        for (r, value) in [(14, 0xe), (15, 0xf), (0, 0xa0), (1, 0xa1)] {
            cpu.set_register(r, value);
        }
        set_psd(&mut cpu, |psd| psd.cc = 4);
        cpu.step().unwrap();
        assert_eq!(cpu.read_word(0x401), Some(0xe));
        assert_eq!(cpu.read_word(0x402), Some(0xf));
        assert_eq!(cpu.read_word(0x403), Some(0xa0));
        assert_eq!(cpu.read_word(0x404), Some(0xa1));
        assert_eq!(cpu.read_word(SP), Some(0x404));
        assert_eq!(cpu.read_word(SP + 1), Some(counts(4, 4)));
        assert_eq!(cpu.psd().cc, 0);

        for r in [14, 15, 0, 1] {
            cpu.set_register(r, 0);
        }
        set_psd(&mut cpu, |psd| psd.cc = 4);
        cpu.step().unwrap();
        assert_eq!(cpu.register(14), 0xe);
        assert_eq!(cpu.register(15), 0xf);
        assert_eq!(cpu.register(0), 0xa0);
        assert_eq!(cpu.register(1), 0xa1);
        assert_eq!(cpu.read_word(SP), Some(0x400));
        assert_eq!(cpu.psd().cc, CC_WORDS_EMPTY);
    }

    #[test]
    fn test_modify_stack_pointer() {
        let mut cpu = stack_cpu(MSP, 2, 0x410, counts(2, 5));
        cpu.write_word(START + 1, encode(MSP, 3, 0, SP, false)).unwrap();
        cpu.set_register(2, 0xffff_fffd);
        cpu.set_register(3, 3);
        cpu.step().unwrap();
        assert_eq!(cpu.read_word(SP), Some(0x40d));
        assert_eq!(cpu.read_word(SP + 1), Some(counts(5, 2)));

        cpu.step().unwrap();
        assert_eq!(cpu.read_word(SP), Some(0x410));
        assert_eq!(cpu.read_word(SP + 1), Some(counts(2, 5)));

        // Only the low halfword counts: +6 exceeds the space left
        set_psd(&mut cpu, |psd| psd.ia = START + 1);
        cpu.set_register(3, 0x1_0006);
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, HANDLER);
        assert_eq!(cpu.read_word(SP), Some(0x410));
    }

    #[test]
    fn test_pull_multiple_leaves_registers_when_pointer_store_fails() {
        let mut cpu = stack_cpu(PLM, 4, 0x401, counts(10, 2));
        // Relocate the pointer to page 1, locked against write key 1.
        cpu.write_word(START, encode(PLM, 4, 0, 0x200, false)).unwrap();
        cpu.load_words(0x200, &[0x401, counts(10, 2)]).unwrap();
        cpu.load_words(0x400, &[0xa, 0xb]).unwrap();
        cpu.write_word(0x500, 0x0001_0203).unwrap();
        cpu.write_word(0x501, 0x2000_0000).unwrap();
        cpu.mem.load_memory_map(0x500, 4, 0).unwrap();
        cpu.mem.load_write_locks(0x501, 4, 0).unwrap();
        trap_to(&mut cpu, 0x40);
        cpu.set_register(4, 0x44);
        cpu.set_register(5, 0x55);
        set_psd(&mut cpu, |psd| {
            psd.cc = 2;
            psd.mapped = true;
            psd.write_key = 1;
        });
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, HANDLER);
        assert_eq!(cpu.register(4), 0x44);
        assert_eq!(cpu.register(5), 0x55);
        assert_eq!(cpu.read_word(0x200), Some(0x401));

        let mut cpu = stack_cpu(PLM, 4, 0x401, counts(10, 2));
        cpu.load_words(0x400, &[0xa, 0xb]).unwrap();
        set_psd(&mut cpu, |psd| psd.cc = 2);
        cpu.step().unwrap();
        assert_eq!(cpu.register(4), 0xa);
        assert_eq!(cpu.register(5), 0xb);
        assert_eq!(cpu.read_word(SP + 1), Some(counts(12, 0)));
    }
}
