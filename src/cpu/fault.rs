//! Guest faults and host errors.
//!
//! A [`Fault`] is raised synchronously by an instruction and delivered to
//! the guest through a trap vector. A [`CpuError`] means the emulated
//! machine cannot continue (bad vector contents, undefined control
//! function, I/O misconfiguration) and is surfaced to the host.

use crate::cpu::memory::MemoryFault;
use crate::cpu::CpuState;
use crate::iop::IoError;
use thiserror::Error;

/// Non-allowed operation trap.
pub const TRAP_NONALLOWED: u32 = 0x40;
/// Unimplemented instruction trap.
pub const TRAP_UNIMPLEMENTED: u32 = 0x41;
/// Push-down stack limit trap.
pub const TRAP_STACK_LIMIT: u32 = 0x42;
/// Fixed-point arithmetic trap.
pub const TRAP_FIXED_POINT: u32 = 0x43;
/// Decimal arithmetic trap.
pub const TRAP_DECIMAL: u32 = 0x45;
/// First of the four CALn vectors.
pub const TRAP_CAL1: u32 = 0x48;

/// Non-allowed operation reason bits ORed into CC after the exchange.
pub mod reason {
    pub const NONEXISTENT_INSTRUCTION: u8 = 8;
    pub const NONEXISTENT_MEMORY: u8 = 4;
    pub const PRIVILEGED_INSTRUCTION: u8 = 2;
    pub const MEMORY_PROTECTION: u8 = 1;
}

/// A synchronous, guest-visible fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("memory protection fault")]
    MemoryProtection,
    #[error("memory write lock fault")]
    MemoryWriteLock,
    #[error("nonexistent memory")]
    NonexistentMemory,
    #[error("privileged instruction in slave mode")]
    PrivilegedInstruction,
    #[error("nonexistent instruction")]
    NonexistentInstruction,
    #[error("privileged nonexistent instruction in slave mode")]
    PrivilegedNonexistent,
    #[error("unimplemented instruction")]
    Unimplemented,
    #[error("push-down stack limit")]
    StackLimit,
    #[error("fixed-point overflow")]
    ArithmeticOverflow,
    #[error("divide fault")]
    Divide,
    #[error("invalid decimal data")]
    DecimalData,
    #[error("CAL{number} with R={r}")]
    Call { number: u8, r: u8 },
}

impl Fault {
    /// Trap vector location that receives this fault.
    pub fn vector(&self) -> u32 {
        match self {
            Fault::MemoryProtection
            | Fault::MemoryWriteLock
            | Fault::NonexistentMemory
            | Fault::PrivilegedInstruction
            | Fault::NonexistentInstruction
            | Fault::PrivilegedNonexistent => TRAP_NONALLOWED,
            Fault::Unimplemented => TRAP_UNIMPLEMENTED,
            Fault::StackLimit => TRAP_STACK_LIMIT,
            Fault::ArithmeticOverflow | Fault::Divide => TRAP_FIXED_POINT,
            Fault::DecimalData => TRAP_DECIMAL,
            Fault::Call { number, .. } => TRAP_CAL1 + (*number as u32 - 1),
        }
    }

    /// Bits ORed into CC (and added to IA when the vector's advance bit is
    /// set) after the exchange. `None` for plain traps.
    pub fn function(&self) -> Option<u8> {
        use reason::*;
        match self {
            Fault::MemoryProtection | Fault::MemoryWriteLock => Some(MEMORY_PROTECTION),
            Fault::NonexistentMemory => Some(NONEXISTENT_MEMORY),
            Fault::PrivilegedInstruction => Some(PRIVILEGED_INSTRUCTION),
            Fault::NonexistentInstruction => Some(NONEXISTENT_INSTRUCTION),
            Fault::PrivilegedNonexistent => Some(NONEXISTENT_INSTRUCTION | PRIVILEGED_INSTRUCTION),
            Fault::Call { r, .. } => Some(*r),
            _ => None,
        }
    }
}

impl From<MemoryFault> for Fault {
    fn from(fault: MemoryFault) -> Self {
        match fault {
            MemoryFault::Protection { .. } => Fault::MemoryProtection,
            MemoryFault::WriteLock { .. } => Fault::MemoryWriteLock,
            MemoryFault::Nonexistent { .. } => Fault::NonexistentMemory,
        }
    }
}

/// Errors that stop the emulated processor and are reported to the host.
#[derive(Debug, Clone, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("invalid trap instruction .{word:08X} (opcode .{opcode:02X}) at vector .{vector:X}")]
    InvalidTrapVector { vector: u32, word: u32, opcode: u8 },

    #[error("invalid interrupt instruction .{word:08X} (opcode .{opcode:02X}) at vector .{vector:X}")]
    InvalidInterruptVector { vector: u32, word: u32, opcode: u8 },

    #[error("fault while delivering trap .{vector:X}: {fault}")]
    DoubleFault { vector: u32, fault: Fault },

    #[error("WD undefined function: .{addr:X}")]
    UndefinedWriteDirect { addr: u32 },

    #[error("RD undefined mode/function: .{addr:X}")]
    UndefinedReadDirect { addr: u32 },

    #[error("AIO with nonzero I/O address field: .{addr:X}")]
    InvalidAcknowledge { addr: u32 },

    #[error("execute chain deeper than {depth} at .{addr:X}")]
    ExecuteChain { addr: u32, depth: usize },

    #[error("I/O error on unit .{unit:X}: {source}")]
    Io {
        unit: u32,
        #[source]
        source: IoError,
    },
}

/// Outcome of an instruction that did not complete normally.
#[derive(Debug, Clone)]
pub(crate) enum Exception {
    /// Deliver through the trap protocol.
    Fault(Fault),
    /// Stop the processor.
    Fatal(CpuError),
}

impl From<Fault> for Exception {
    fn from(fault: Fault) -> Self {
        Exception::Fault(fault)
    }
}

impl From<MemoryFault> for Exception {
    fn from(fault: MemoryFault) -> Self {
        Exception::Fault(fault.into())
    }
}

impl From<CpuError> for Exception {
    fn from(err: CpuError) -> Self {
        Exception::Fatal(err)
    }
}

/// Result type for instruction handlers.
pub(crate) type ExecResult = Result<(), Exception>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors() {
        assert_eq!(Fault::MemoryWriteLock.vector(), 0x40);
        assert_eq!(Fault::Divide.vector(), 0x43);
        assert_eq!(Fault::DecimalData.vector(), 0x45);
        assert_eq!(Fault::Call { number: 3, r: 0 }.vector(), 0x4a);
        assert_eq!(Fault::StackLimit.function(), None);
    }

    #[test]
    fn test_memory_fault_reasons() {
        let f: Fault = MemoryFault::Nonexistent { addr: 0x30000 }.into();
        assert_eq!(f.function(), Some(reason::NONEXISTENT_MEMORY));
        let f: Fault = MemoryFault::Protection { addr: 0x400 }.into();
        assert_eq!(f.function(), Some(reason::MEMORY_PROTECTION));
        assert_eq!(Fault::PrivilegedNonexistent.function(), Some(10));
    }
}
