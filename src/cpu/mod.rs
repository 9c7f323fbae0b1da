//! CPU emulation for the Sigma.
//!
//! This module implements the processor core:
//! - 32 register banks of 16 words, the active bank overlaying words 0-15
//! - Paged memory with access protection and write locks
//! - 320 priority interrupt levels and the trap vectors
//! - A 128-slot instruction table driving the fetch-execute loop

pub mod alu;
pub mod control;
pub mod decode;
pub mod execute;
pub mod fault;
pub mod interrupt;
pub mod memory;
pub(crate) mod ops;
pub mod registers;
pub mod table;
pub mod trace;

pub use control::{CpuRunner, RunnerError};
pub use decode::{AddrMode, ExecContext, InstructionWord};
pub use execute::{Breakpoint, Cpu, CpuSnapshot, CpuState};
pub use fault::{CpuError, Fault};
pub use interrupt::{InterruptController, InterruptLine};
pub use memory::{Memory, MemoryFault};
pub use registers::{Psd, RegisterFile};
pub use trace::{IaTracer, TraceEntry};
