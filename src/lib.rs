//! # Sigma Emulator
//!
//! An emulator of the Sigma family of 32-bit scientific mainframes.
//!
//! The processor is a general-register machine with sixteen registers per
//! bank, a paged memory unit with per-page access protection and write
//! locks, and a priority interrupt system. Guest faults are delivered
//! through trap vectors holding an exchange-PSD instruction, exactly as on
//! the real machine; only configuration errors reach the host.

pub mod asm;
pub mod config;
pub mod cpu;
pub mod iop;

// Re-export commonly used types
pub use asm::{disassemble, disassemble_instruction, load_image, parse_image, Image, ImageError};
pub use config::{ConfigError, MachineConfig};
pub use cpu::{Cpu, CpuError, CpuRunner, CpuSnapshot, CpuState, Fault, InterruptLine, Memory, MemoryFault, Psd};
pub use iop::{IoError, IoProcessor, IoResponse};
