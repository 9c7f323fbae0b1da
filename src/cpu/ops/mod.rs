//! Instruction handlers, grouped by family.
//!
//! Every handler has the same shape: it receives the resolved [`Operand`]
//! and the [`ExecContext`] and returns an [`ExecResult`]. Memory faults
//! propagate with `?` and are turned into traps by the fetch loop.
//!
//! [`Operand`]: crate::cpu::decode::Operand
//! [`ExecContext`]: crate::cpu::decode::ExecContext

pub(crate) mod arith;
pub(crate) mod branch;
pub(crate) mod decimal;
pub(crate) mod io;
pub(crate) mod logic;
pub(crate) mod shift;
pub(crate) mod stack;
pub(crate) mod string;
pub(crate) mod system;
pub(crate) mod transfer;

use crate::cpu::execute::Cpu;
use crate::cpu::memory::MemoryFault;

/// Read the doubleword at an even word address, high word first.
pub(crate) fn read_doubleword(cpu: &Cpu, ea: u32) -> Result<u64, MemoryFault> {
    let hi = cpu.mem.read_word(ea)?;
    let lo = cpu.mem.read_word(ea.wrapping_add(1))?;
    Ok((hi as u64) << 32 | lo as u64)
}

/// Register count of the multiple-register instructions: CC, with 0 meaning 16.
#[inline]
pub(crate) fn multiple_count(cc: u8) -> usize {
    match cc & 0xf {
        0 => 16,
        n => n as usize,
    }
}

/// Shared setup for the handler tests.
#[cfg(test)]
pub(crate) mod testing {
    use crate::config::MachineConfig;
    use crate::cpu::decode::encode;
    use crate::cpu::execute::Cpu;
    use crate::cpu::registers::Psd;

    pub(crate) const START: u32 = 0x26;
    /// Where every trap handler installed by [`trap_to`] continues.
    pub(crate) const HANDLER: u32 = 0x300;

    /// A processor with `program` at the reset address and the clock off.
    pub(crate) fn cpu_with(program: &[u32]) -> Cpu {
        let mut cpu = Cpu::new(MachineConfig {
            clock_interval_ms: 0,
            ..MachineConfig::default()
        });
        cpu.load_words(START, program).unwrap();
        cpu
    }

    /// Route trap `vector` through an XPSD to [`HANDLER`]. The old PSD is
    /// stored at .1F0.
    pub(crate) fn trap_to(cpu: &mut Cpu, vector: u32) {
        cpu.write_word(vector, encode(0x0F, 0, 0, 0x1f0, false)).unwrap();
        cpu.load_words(0x1f2, &[HANDLER, 0]).unwrap();
    }

    pub(crate) fn set_psd(cpu: &mut Cpu, f: impl FnOnce(&mut Psd)) {
        let mut psd = *cpu.psd();
        f(&mut psd);
        cpu.set_psd(psd);
    }
}
