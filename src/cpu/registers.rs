//! Sigma register banks and the Program Status Doubleword.
//!
//! The processor carries 32 banks of 16 general registers. The register
//! pointer in the PSD selects the active bank, and word addresses 0-15
//! alias that bank (see [`crate::cpu::Memory`]).

use serde::{Deserialize, Serialize};

/// Number of selectable register banks.
pub const REGISTER_BANKS: usize = 32;

/// Registers per bank.
pub const BANK_SIZE: usize = 16;

/// Condition-code bit 1 (most significant): carry.
pub const CC_CARRY: u8 = 0x8;
/// Condition-code bit 2: overflow.
pub const CC_OVERFLOW: u8 = 0x4;
/// Condition-code bit 3: result positive.
pub const CC_POSITIVE: u8 = 0x2;
/// Condition-code bit 4: result negative.
pub const CC_NEGATIVE: u8 = 0x1;

/// The 32 register banks plus the pointer selecting the active one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    banks: Vec<[u32; BANK_SIZE]>,
    pointer: usize,
}

impl RegisterFile {
    /// Create a register file with every bank zeroed and bank 0 active.
    pub fn new() -> Self {
        Self {
            banks: vec![[0; BANK_SIZE]; REGISTER_BANKS],
            pointer: 0,
        }
    }

    /// Zero every bank and select bank 0.
    pub fn reset(&mut self) {
        for bank in &mut self.banks {
            *bank = [0; BANK_SIZE];
        }
        self.pointer = 0;
    }

    /// Index of the active bank.
    #[inline]
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Select the active bank. Only the low five bits are significant.
    #[inline]
    pub fn select(&mut self, pointer: u32) {
        self.pointer = (pointer & 0x1f) as usize;
    }

    /// Read register `r` (mod 16) of the active bank.
    #[inline]
    pub fn get(&self, r: usize) -> u32 {
        self.banks[self.pointer][r & 0xf]
    }

    /// Write register `r` (mod 16) of the active bank.
    #[inline]
    pub fn set(&mut self, r: usize, value: u32) {
        self.banks[self.pointer][r & 0xf] = value;
    }

    /// Read register `r` as a signed value.
    #[inline]
    pub fn get_signed(&self, r: usize) -> i32 {
        self.get(r) as i32
    }

    /// Read the register pair `r`, `r|1` as a 64-bit value, `r` being the high half.
    ///
    /// With an odd `r` both halves are the same register.
    pub fn get_pair(&self, r: usize) -> u64 {
        ((self.get(r) as u64) << 32) | self.get(r | 1) as u64
    }

    /// Write the register pair `r`, `r|1`. The low half is written first, so an
    /// odd `r` ends up holding the high half.
    pub fn set_pair(&mut self, r: usize, value: u64) {
        self.set(r | 1, value as u32);
        self.set(r, (value >> 32) as u32);
    }

    /// The active bank.
    pub fn active(&self) -> &[u32; BANK_SIZE] {
        &self.banks[self.pointer]
    }

    /// Any bank, by index.
    pub fn bank(&self, index: usize) -> &[u32; BANK_SIZE] {
        &self.banks[index & 0x1f]
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterFile")
            .field("pointer", &self.pointer)
            .field("active", self.active())
            .finish()
    }
}

/// Program Status Doubleword.
///
/// Everything that describes the execution context and is swapped as a
/// unit by the exchange instruction on a trap or interrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psd {
    /// Instruction address (17 bits).
    pub ia: u32,
    /// Condition code (4 bits).
    pub cc: u8,
    /// Floating significance mode.
    pub float_significance: bool,
    /// Floating zero mode.
    pub float_zero: bool,
    /// Floating normalize mode.
    pub float_normalize: bool,
    /// Slave mode when set, master mode when clear.
    pub slave: bool,
    /// Memory map enable.
    pub mapped: bool,
    /// Decimal arithmetic trap mask.
    pub decimal_mask: bool,
    /// Fixed-point arithmetic trap mask.
    pub arith_mask: bool,
    /// Write key (2 bits).
    pub write_key: u8,
    /// Counter interrupt group inhibit.
    pub counter_inhibit: bool,
    /// I/O interrupt group inhibit.
    pub io_inhibit: bool,
    /// External interrupt group inhibit.
    pub external_inhibit: bool,
    /// Register pointer (5 bits).
    pub rp: u8,
}

pub mod bits {
    //! Bit positions of the PSD fields in their two memory words.

    pub const FS: u32 = 0x0400_0000;
    pub const FZ: u32 = 0x0200_0000;
    pub const FN: u32 = 0x0100_0000;
    pub const MS: u32 = 0x0080_0000;
    pub const MM: u32 = 0x0040_0000;
    pub const DM: u32 = 0x0020_0000;
    pub const AM: u32 = 0x0010_0000;
    pub const IA: u32 = 0x0001_ffff;

    pub const CI: u32 = 0x0400_0000;
    pub const II: u32 = 0x0200_0000;
    pub const EI: u32 = 0x0100_0000;
}

impl Psd {
    /// Encode the PSD as its two memory words.
    pub fn to_words(&self) -> (u32, u32) {
        let flag = |set: bool, bit: u32| if set { bit } else { 0 };
        let w0 = (self.ia & bits::IA)
            | (self.cc as u32 & 0xf) << 28
            | flag(self.float_significance, bits::FS)
            | flag(self.float_zero, bits::FZ)
            | flag(self.float_normalize, bits::FN)
            | flag(self.slave, bits::MS)
            | flag(self.mapped, bits::MM)
            | flag(self.decimal_mask, bits::DM)
            | flag(self.arith_mask, bits::AM);
        let w1 = (self.rp as u32 & 0x1f) << 4
            | (self.write_key as u32 & 0x3) << 28
            | flag(self.counter_inhibit, bits::CI)
            | flag(self.io_inhibit, bits::II)
            | flag(self.external_inhibit, bits::EI);
        (w0, w1)
    }

    /// Decode a full PSD from its two memory words.
    pub fn from_words(w0: u32, w1: u32) -> Self {
        Self {
            ia: w0 & bits::IA,
            cc: (w0 >> 28) as u8,
            float_significance: w0 & bits::FS != 0,
            float_zero: w0 & bits::FZ != 0,
            float_normalize: w0 & bits::FN != 0,
            slave: w0 & bits::MS != 0,
            mapped: w0 & bits::MM != 0,
            decimal_mask: w0 & bits::DM != 0,
            arith_mask: w0 & bits::AM != 0,
            write_key: ((w1 >> 28) & 0x3) as u8,
            counter_inhibit: w1 & bits::CI != 0,
            io_inhibit: w1 & bits::II != 0,
            external_inhibit: w1 & bits::EI != 0,
            rp: ((w1 >> 4) & 0x1f) as u8,
        }
    }

    /// The floating mode flags packed as the low three bits of a byte.
    pub fn float_flags(&self) -> u8 {
        (self.float_significance as u8) << 2
            | (self.float_zero as u8) << 1
            | self.float_normalize as u8
    }

    /// Load the floating mode flags from the low three bits of `value`.
    pub fn set_float_flags(&mut self, value: u32) {
        self.float_significance = value & 0x4 != 0;
        self.float_zero = value & 0x2 != 0;
        self.float_normalize = value & 0x1 != 0;
    }

    /// Set CC bits 3 and 4 from the sign of `value`, leaving the upper two alone.
    #[inline]
    pub fn set_sign_cc(&mut self, value: i32) {
        self.cc &= CC_CARRY | CC_OVERFLOW;
        self.cc |= sign_cc(value);
    }
}

/// CC bits 3 and 4 describing the sign of a 32-bit result.
#[inline]
pub fn sign_cc(value: i32) -> u8 {
    match value {
        v if v < 0 => CC_NEGATIVE,
        v if v > 0 => CC_POSITIVE,
        _ => 0,
    }
}

/// CC bits 3 and 4 describing the sign of a 64-bit result.
#[inline]
pub fn sign_cc64(value: i64) -> u8 {
    match value {
        v if v < 0 => CC_NEGATIVE,
        v if v > 0 => CC_POSITIVE,
        _ => 0,
    }
}
