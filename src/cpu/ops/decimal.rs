//! Decimal load and store.
//!
//! The decimal accumulator is registers 12-15 of the active bank, holding
//! 31 packed BCD digits and a sign nibble in the least significant
//! position. Only the load and store instructions are provided.

use crate::cpu::decode::{ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::{ExecResult, Fault};
use crate::cpu::registers::{CC_CARRY, CC_NEGATIVE, CC_OVERFLOW, CC_POSITIVE};

const ACCUMULATOR: usize = 12;
const PLUS: u8 = 0xc;
const MINUS: u8 = 0xd;

/// Sixteen packed bytes, most significant first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Packed([u8; 16]);

impl Packed {
    fn from_accumulator(cpu: &Cpu) -> Self {
        let mut bytes = [0; 16];
        for (i, chunk) in bytes.chunks_mut(4).enumerate() {
            chunk.copy_from_slice(&cpu.reg(ACCUMULATOR + i).to_be_bytes());
        }
        Packed(bytes)
    }

    fn to_accumulator(self, cpu: &mut Cpu) {
        for (i, chunk) in self.0.chunks(4).enumerate() {
            let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            cpu.set_reg(ACCUMULATOR + i, word);
        }
    }

    /// Every digit nibble is 0-9 and the last nibble is a sign (A-F).
    fn is_valid(&self) -> bool {
        let (last, digits) = (self.0[15], &self.0[..15]);
        digits.iter().all(|&b| b >> 4 <= 9 && b & 0xf <= 9) && last >> 4 <= 9 && last & 0xf >= 0xa
    }

    fn is_zero(&self) -> bool {
        self.0[..15].iter().all(|&b| b == 0) && self.0[15] >> 4 == 0
    }

    fn is_negative(&self) -> bool {
        matches!(self.0[15] & 0xf, 0xb | 0xd)
    }

    /// Rewrite the sign as the preferred plus or minus code, zero being plus.
    /// Returns the CC3/CC4 bits for the value.
    fn normalize_sign(&mut self) -> u8 {
        let (sign, cc) = if self.is_zero() {
            (PLUS, 0)
        } else if self.is_negative() {
            (MINUS, CC_NEGATIVE)
        } else {
            (PLUS, CC_POSITIVE)
        };
        self.0[15] = (self.0[15] & 0xf0) | sign;
        cc
    }
}

/// Byte length from the R field, 0 meaning 16.
fn length(r: usize) -> usize {
    ((r.wrapping_sub(1)) & 0xf) + 1
}

fn invalid_data(cpu: &mut Cpu) -> ExecResult {
    cpu.psd.cc |= CC_CARRY;
    if cpu.psd.decimal_mask {
        return Err(Fault::DecimalData.into());
    }
    Ok(())
}

/// Decimal load: R bytes at the effective address, right-aligned in the
/// accumulator.
pub(crate) fn dl(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let len = length(op.r);
    let mut packed = Packed::default();
    for i in 0..len {
        packed.0[16 - len + i] = cpu.mem.read_byte(op.ea.wrapping_add(i as u32))? as u8;
    }
    cpu.psd.cc &= CC_POSITIVE | CC_NEGATIVE;
    if !packed.is_valid() {
        return invalid_data(cpu);
    }
    let sign = packed.normalize_sign();
    packed.to_accumulator(cpu);
    cpu.psd.cc |= sign;
    Ok(())
}

/// Decimal store: the low R bytes of the accumulator. CC2 reports nonzero
/// digits left behind in the bytes that were not stored.
pub(crate) fn dst(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let len = length(op.r);
    let mut packed = Packed::from_accumulator(cpu);
    cpu.psd.cc &= CC_POSITIVE | CC_NEGATIVE;
    if !packed.is_valid() {
        return invalid_data(cpu);
    }
    packed.normalize_sign();
    for i in 0..len {
        cpu.mem.write_byte(op.ea.wrapping_add(i as u32), packed.0[16 - len + i])?;
    }
    if packed.0[..16 - len].iter().any(|&b| b != 0) {
        cpu.psd.cc |= CC_OVERFLOW;
    }
    Ok(())
}
