//! The 128-slot instruction table.
//!
//! Each opcode maps to a descriptor naming its mnemonic, how its operand is
//! resolved, whether it needs master mode, and the handler that runs it.
//! Slots without an instruction are kept in the table so the fetch loop can
//! raise the right trap for them.

use crate::cpu::decode::{AddrMode, ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::ExecResult;
use crate::cpu::ops::{arith, branch, decimal, io, logic, shift, stack, string, system, transfer};
use AddrMode::{Byte, Doubleword, Halfword, Immediate, Shift, Word};

pub(crate) type Handler = fn(&mut Cpu, Operand, ExecContext) -> ExecResult;

/// What happens when an opcode is executed.
#[derive(Clone, Copy)]
pub(crate) enum OpKind {
    Implemented(Handler),
    /// Defined by the architecture but not emulated (trap .41).
    Unimplemented,
    /// Undefined slot (trap .40, nonexistent instruction).
    Nonexistent,
    /// Undefined slot in the privileged range; slave mode also reports
    /// the privileged-instruction reason.
    PrivilegedNonexistent,
}

/// One entry of the instruction table.
#[derive(Clone, Copy)]
pub struct OpDescriptor {
    pub code: u8,
    /// Assembler mnemonic; empty for undefined slots.
    pub mnemonic: &'static str,
    pub mode: AddrMode,
    /// Raises a privileged-instruction fault in slave mode.
    pub privileged: bool,
    pub(crate) kind: OpKind,
}

impl OpDescriptor {
    /// Whether the slot holds an architecturally defined instruction.
    pub fn exists(&self) -> bool {
        !matches!(self.kind, OpKind::Nonexistent | OpKind::PrivilegedNonexistent)
    }

    /// Whether the instruction is emulated.
    pub fn is_implemented(&self) -> bool {
        matches!(self.kind, OpKind::Implemented(_))
    }
}

impl std::fmt::Debug for OpDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpDescriptor")
            .field("code", &format_args!(".{:02X}", self.code))
            .field("mnemonic", &self.mnemonic)
            .field("mode", &self.mode)
            .field("privileged", &self.privileged)
            .field("implemented", &self.is_implemented())
            .finish()
    }
}

const fn op(code: u8, mnemonic: &'static str, mode: AddrMode, handler: Handler) -> OpDescriptor {
    OpDescriptor { code, mnemonic, mode, privileged: false, kind: OpKind::Implemented(handler) }
}

const fn privileged(code: u8, mnemonic: &'static str, mode: AddrMode, handler: Handler) -> OpDescriptor {
    OpDescriptor { code, mnemonic, mode, privileged: true, kind: OpKind::Implemented(handler) }
}

const fn unimplemented(code: u8, mnemonic: &'static str, mode: AddrMode) -> OpDescriptor {
    OpDescriptor { code, mnemonic, mode, privileged: false, kind: OpKind::Unimplemented }
}

const fn nonexistent(code: u8) -> OpDescriptor {
    OpDescriptor { code, mnemonic: "", mode: Word, privileged: false, kind: OpKind::Nonexistent }
}

const fn privileged_nonexistent(code: u8) -> OpDescriptor {
    OpDescriptor { code, mnemonic: "", mode: Word, privileged: false, kind: OpKind::PrivilegedNonexistent }
}

/// Look up the descriptor for a seven-bit opcode.
#[inline]
pub fn descriptor(opcode: u8) -> &'static OpDescriptor {
    &OPCODES[(opcode & 0x7f) as usize]
}

/// Look up an opcode by mnemonic (case-insensitive).
pub fn lookup(mnemonic: &str) -> Option<&'static OpDescriptor> {
    OPCODES
        .iter()
        .find(|d| !d.mnemonic.is_empty() && d.mnemonic.eq_ignore_ascii_case(mnemonic))
}

pub static OPCODES: [OpDescriptor; 128] = [
    // ==================== .00 - .0F ====================
    nonexistent(0x00),
    nonexistent(0x01),
    op(0x02, "LCFI", Immediate, transfer::lcfi),
    nonexistent(0x03),
    op(0x04, "CAL1", Word, system::cal),
    op(0x05, "CAL2", Word, system::cal),
    op(0x06, "CAL3", Word, system::cal),
    op(0x07, "CAL4", Word, system::cal),
    op(0x08, "PLW", Doubleword, stack::plw),
    op(0x09, "PSW", Doubleword, stack::psw),
    op(0x0A, "PLM", Doubleword, stack::plm),
    op(0x0B, "PSM", Doubleword, stack::psm),
    privileged_nonexistent(0x0C),
    privileged_nonexistent(0x0D),
    privileged(0x0E, "LPSD", Doubleword, system::lpsd),
    op(0x0F, "XPSD", AddrMode::None, system::xpsd),
    // ==================== .10 - .1F ====================
    op(0x10, "AD", Doubleword, arith::ad),
    op(0x11, "CD", Doubleword, arith::cd),
    op(0x12, "LD", Doubleword, transfer::ld),
    op(0x13, "MSP", Doubleword, stack::msp),
    nonexistent(0x14),
    op(0x15, "STD", Doubleword, transfer::std),
    nonexistent(0x16),
    nonexistent(0x17),
    op(0x18, "SD", Doubleword, arith::sd),
    op(0x19, "CLM", Doubleword, arith::clm),
    op(0x1A, "LCD", Doubleword, arith::lcd),
    op(0x1B, "LAD", Doubleword, arith::lad),
    unimplemented(0x1C, "FSL", Doubleword),
    unimplemented(0x1D, "FAL", Doubleword),
    unimplemented(0x1E, "FDL", Doubleword),
    unimplemented(0x1F, "FML", Doubleword),
    // ==================== .20 - .2F ====================
    op(0x20, "AI", Immediate, arith::ai),
    op(0x21, "CI", Immediate, arith::ci),
    op(0x22, "LI", Immediate, transfer::li),
    op(0x23, "MI", Immediate, arith::mi),
    op(0x24, "SF", Shift, shift::sf),
    op(0x25, "S", Shift, shift::s),
    op(0x26, "LAS", Word, transfer::las),
    nonexistent(0x27),
    op(0x28, "CVS", Word, arith::cvs),
    op(0x29, "CVA", Word, arith::cva),
    op(0x2A, "LM", Word, transfer::lm),
    op(0x2B, "STM", Word, transfer::stm),
    privileged_nonexistent(0x2C),
    privileged(0x2D, "LMS", Word, transfer::lms),
    privileged(0x2E, "WAIT", AddrMode::None, system::wait),
    privileged(0x2F, "LRP", Word, system::lrp),
    // ==================== .30 - .3F ====================
    op(0x30, "AW", Word, arith::aw),
    op(0x31, "CW", Word, arith::cw),
    op(0x32, "LW", Word, transfer::lw),
    op(0x33, "MTW", Word, arith::mtw),
    nonexistent(0x34),
    op(0x35, "STW", Word, transfer::stw),
    op(0x36, "DW", Word, arith::dw),
    op(0x37, "MW", Word, arith::mw),
    op(0x38, "SW", Word, arith::sw),
    op(0x39, "CLR", Word, arith::clr),
    op(0x3A, "LCW", Word, arith::lcw),
    op(0x3B, "LAW", Word, arith::law),
    unimplemented(0x3C, "FSS", Word),
    unimplemented(0x3D, "FAS", Word),
    unimplemented(0x3E, "FDS", Word),
    unimplemented(0x3F, "FMS", Word),
    // ==================== .40 - .4F ====================
    op(0x40, "TTBS", Immediate, string::ttbs),
    op(0x41, "TBS", Immediate, string::tbs),
    nonexistent(0x42),
    nonexistent(0x43),
    op(0x44, "ANLZ", Word, system::anlz),
    op(0x45, "CS", Word, logic::cs),
    op(0x46, "XW", Word, transfer::xw),
    op(0x47, "STS", Word, logic::sts),
    op(0x48, "EOR", Word, logic::eor),
    op(0x49, "OR", Word, logic::or),
    op(0x4A, "LS", Word, logic::ls),
    op(0x4B, "AND", Word, logic::and),
    privileged(0x4C, "SIO", Word, io::sio),
    privileged(0x4D, "TIO", Word, io::tio),
    privileged(0x4E, "TDV", Word, io::tdv),
    privileged(0x4F, "HIO", Word, io::hio),
    // ==================== .50 - .5F ====================
    op(0x50, "AH", Halfword, arith::ah),
    op(0x51, "CH", Halfword, arith::ch),
    op(0x52, "LH", Halfword, transfer::lh),
    op(0x53, "MTH", Halfword, arith::mth),
    nonexistent(0x54),
    op(0x55, "STH", Halfword, transfer::sth),
    op(0x56, "DH", Halfword, arith::dh),
    op(0x57, "MH", Halfword, arith::mh),
    op(0x58, "SH", Halfword, arith::sh),
    nonexistent(0x59),
    op(0x5A, "LCH", Halfword, arith::lch),
    op(0x5B, "LAH", Halfword, arith::lah),
    nonexistent(0x5C),
    nonexistent(0x5D),
    nonexistent(0x5E),
    nonexistent(0x5F),
    // ==================== .60 - .6F ====================
    op(0x60, "CBS", Immediate, string::cbs),
    op(0x61, "MBS", Immediate, string::mbs),
    nonexistent(0x62),
    unimplemented(0x63, "EBS", Immediate),
    op(0x64, "BDR", Word, branch::bdr),
    op(0x65, "BIR", Word, branch::bir),
    op(0x66, "AWM", Word, arith::awm),
    op(0x67, "EXU", Word, branch::exu),
    op(0x68, "BCR", Word, branch::bcr),
    op(0x69, "BCS", Word, branch::bcs),
    op(0x6A, "BAL", Word, branch::bal),
    op(0x6B, "INT", Word, transfer::int),
    privileged(0x6C, "RD", Word, system::rd),
    privileged(0x6D, "WD", Word, system::wd),
    privileged(0x6E, "AIO", Word, io::aio),
    privileged(0x6F, "MMC", AddrMode::None, system::mmc),
    // ==================== .70 - .7F ====================
    op(0x70, "LCF", Byte, transfer::lcf),
    op(0x71, "CB", Byte, arith::cb),
    op(0x72, "LB", Byte, transfer::lb),
    op(0x73, "MTB", Byte, arith::mtb),
    op(0x74, "STFC", Byte, transfer::stfc),
    op(0x75, "STB", Byte, transfer::stb),
    unimplemented(0x76, "PACK", Byte),
    unimplemented(0x77, "UNPK", Byte),
    unimplemented(0x78, "DS", Byte),
    unimplemented(0x79, "DA", Byte),
    unimplemented(0x7A, "DD", Byte),
    unimplemented(0x7B, "DM", Byte),
    unimplemented(0x7C, "DSA", Byte),
    unimplemented(0x7D, "DC", Byte),
    op(0x7E, "DL", Byte, decimal::dl),
    op(0x7F, "DST", Byte, decimal::dst),
];
