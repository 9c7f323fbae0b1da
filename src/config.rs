//! Machine configuration.
//!
//! A [`MachineConfig`] is read from JSON; every field is optional and falls
//! back to the values of a stock 128K-word machine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod defaults {
    /// Physical memory in bytes (128K words).
    pub const MEMORY_BYTES: usize = 512 * 1024;

    /// Instruction address loaded by reset.
    pub const RESET_ADDRESS: u32 = 0x26;

    /// Entries kept in the branch trace ring.
    pub const TRACE_DEPTH: usize = 32;

    /// Wall-clock interval between clock counter interrupts.
    pub const CLOCK_INTERVAL_MS: u64 = 2;

    /// Instructions executed between clock checks.
    pub const CLOCK_BATCH: u32 = 100;
}

/// Memory is allocated in whole 512-word pages.
const PAGE_BYTES: usize = 2048;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("memory size {0} is not a non-zero multiple of 2048 bytes up to 512K")]
    MemorySize(usize),

    #[error("reset address .{0:X} is outside the 17-bit word space")]
    ResetAddress(u32),

    #[error("trace depth must be at least 1")]
    TraceDepth,
}

/// Machine-level parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Physical memory size in bytes.
    #[serde(default = "MachineConfig::default_memory_bytes")]
    pub memory_bytes: usize,

    /// IA loaded by reset.
    #[serde(default = "MachineConfig::default_reset_address")]
    pub reset_address: u32,

    /// Capacity of the branch trace ring.
    #[serde(default = "MachineConfig::default_trace_depth")]
    pub trace_depth: usize,

    /// Software clock period; 0 disables the clock interrupts.
    #[serde(default = "MachineConfig::default_clock_interval_ms")]
    pub clock_interval_ms: u64,

    /// Instructions between clock checks.
    #[serde(default = "MachineConfig::default_clock_batch")]
    pub clock_batch: u32,

    /// Control panel sense switches, returned in CC by read-direct.
    #[serde(default)]
    pub sense_switches: u8,
}

impl MachineConfig {
    fn default_memory_bytes() -> usize {
        defaults::MEMORY_BYTES
    }

    fn default_reset_address() -> u32 {
        defaults::RESET_ADDRESS
    }

    fn default_trace_depth() -> usize {
        defaults::TRACE_DEPTH
    }

    fn default_clock_interval_ms() -> u64 {
        defaults::CLOCK_INTERVAL_MS
    }

    fn default_clock_batch() -> u32 {
        defaults::CLOCK_BATCH
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bytes = self.memory_bytes;
        if bytes == 0 || bytes % PAGE_BYTES != 0 || bytes > defaults::MEMORY_BYTES {
            return Err(ConfigError::MemorySize(bytes));
        }
        if self.reset_address > 0x1_ffff {
            return Err(ConfigError::ResetAddress(self.reset_address));
        }
        if self.trace_depth == 0 {
            return Err(ConfigError::TraceDepth);
        }
        Ok(())
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_bytes: defaults::MEMORY_BYTES,
            reset_address: defaults::RESET_ADDRESS,
            trace_depth: defaults::TRACE_DEPTH,
            clock_interval_ms: defaults::CLOCK_INTERVAL_MS,
            clock_batch: defaults::CLOCK_BATCH,
            sense_switches: 0,
        }
    }
}
