//! Instruction word layout and operand resolution.
//!
//! ```text
//!  0 | 1..7   | 8..11 | 12..14 | 15..31
//!  * | opcode |   R   |   X    | reference address
//! ```
//!
//! Bit 0 requests one level of indirection. Immediate-format instructions
//! instead treat bits 12-31 as a signed 20-bit literal.

use crate::cpu::alu::sign_extend;
use serde::{Deserialize, Serialize};

const INDIRECT_BIT: u32 = 0x8000_0000;
const REFERENCE_MASK: u32 = 0x1_ffff;

/// A raw 32-bit instruction word with field accessors.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionWord(pub u32);

impl InstructionWord {
    #[inline]
    pub fn opcode(self) -> u8 {
        ((self.0 >> 24) & 0x7f) as u8
    }

    #[inline]
    pub fn indirect(self) -> bool {
        self.0 & INDIRECT_BIT != 0
    }

    /// Register field R.
    #[inline]
    pub fn r(self) -> usize {
        ((self.0 >> 20) & 0xf) as usize
    }

    /// Index register field X (0 means no indexing).
    #[inline]
    pub fn x(self) -> usize {
        ((self.0 >> 17) & 0x7) as usize
    }

    /// 17-bit reference address.
    #[inline]
    pub fn reference(self) -> u32 {
        self.0 & REFERENCE_MASK
    }

    /// Signed 20-bit literal of immediate-format instructions.
    #[inline]
    pub fn immediate(self) -> i32 {
        sign_extend(self.0 & 0xf_ffff, 20)
    }

    /// Test a single bit of the word.
    #[inline]
    pub fn has(self, mask: u32) -> bool {
        self.0 & mask != 0
    }
}

impl std::fmt::Debug for InstructionWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InstructionWord(.{:08X})", self.0)
    }
}

/// Build a reference-format instruction word.
pub fn encode(opcode: u8, r: usize, x: usize, reference: u32, indirect: bool) -> u32 {
    let mut word = (opcode as u32 & 0x7f) << 24
        | (r as u32 & 0xf) << 20
        | (x as u32 & 0x7) << 17
        | (reference & REFERENCE_MASK);
    if indirect {
        word |= INDIRECT_BIT;
    }
    word
}

/// Build an immediate-format instruction word.
pub fn encode_immediate(opcode: u8, r: usize, value: i32) -> u32 {
    (opcode as u32 & 0x7f) << 24 | (r as u32 & 0xf) << 20 | (value as u32 & 0xf_ffff)
}

/// How an opcode turns its instruction word into an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddrMode {
    /// Signed 20-bit literal; the indirect bit makes the instruction nonexistent.
    Immediate,
    /// Byte address: reference * 4 plus the index register.
    Byte,
    /// Halfword address: reference * 2 plus the index register.
    Halfword,
    /// Word address: reference plus the index register.
    Word,
    /// Even word address: reference rounded down plus twice the index register.
    Doubleword,
    /// Shift count/type: the (indirect) reference with the index register kept apart.
    Shift,
    /// No operand; the handler reads the instruction word itself.
    None,
}

/// Operand fields handed to an instruction handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    /// The instruction word being executed.
    pub word: InstructionWord,
    /// Register field R.
    pub r: usize,
    /// Effective address in the unit of the addressing mode, or the
    /// sign-extended literal for immediates.
    pub ea: u32,
    /// Contents of the index register, 0 when X is 0.
    pub index: u32,
}

impl Operand {
    /// The literal of an immediate-mode operand.
    #[inline]
    pub fn value(&self) -> i32 {
        self.ea as i32
    }
}

/// Whether a handler runs as ordinary program flow or as the single
/// instruction of a trap/interrupt vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecContext {
    Normal,
    /// Executing the instruction held at this vector location.
    InTrap(u32),
}

impl ExecContext {
    #[inline]
    pub fn in_trap(self) -> bool {
        matches!(self, ExecContext::InTrap(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields() {
        let w = InstructionWord(0xb234_5678);
        assert!(w.indirect());
        assert_eq!(w.opcode(), 0x32);
        assert_eq!(w.r(), 3);
        assert_eq!(w.x(), 2);
        assert_eq!(w.reference(), 0x1_5678);
    }

    #[test]
    fn test_immediate_sign() {
        assert_eq!(InstructionWord(0x2200_0005).immediate(), 5);
        assert_eq!(InstructionWord(0x220f_ffff).immediate(), -1);
        assert_eq!(InstructionWord(0x2208_0000).immediate(), -0x8_0000);
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(0x68, 4, 0, 0x10, false), 0x6840_0010);
        assert_eq!(encode(0x32, 3, 2, 0x1_5678, true), 0xb234_5678);
        assert_eq!(encode_immediate(0x22, 0, 5), 0x2200_0005);
        assert_eq!(encode_immediate(0x20, 1, -1), 0x201f_ffff);
    }

    #[test]
    fn test_context() {
        assert!(ExecContext::InTrap(0x40).in_trap());
        assert!(!ExecContext::Normal.in_trap());
    }
}
