//! I/O processor contract.
//!
//! Devices are driven by the privileged I/O instructions (SIO, TIO, TDV,
//! HIO, AIO) and signal completion by raising the I/O interrupt through an
//! [`InterruptLine`]. The processor owns its devices through an
//! [`IopManager`] and finds them by unit address.

use crate::cpu::interrupt::{InterruptLine, IO_INTERRUPT};
use crate::cpu::memory::{Memory, MemoryFault};
use thiserror::Error;

/// Order codes of a command doubleword (low bits of the order byte).
pub mod order {
    pub const WRITE: u8 = 1;
    pub const READ: u8 = 2;
    pub const CONTROL: u8 = 3;
    pub const SENSE: u8 = 4;
    pub const READ_BACKWARD: u8 = 6;
}

/// Flag bits of a command doubleword.
pub mod flags {
    /// Data chain.
    pub const DC: u8 = 0x80;
    /// Interrupt at zero byte count.
    pub const IZC: u8 = 0x40;
    /// Command chain.
    pub const CC: u8 = 0x20;
    /// Interrupt at channel end.
    pub const ICE: u8 = 0x10;
    /// Halt on transmission error.
    pub const HTE: u8 = 0x08;
    /// Interrupt on unusual end.
    pub const IUE: u8 = 0x04;
    /// Suppress incorrect length.
    pub const SIL: u8 = 0x02;
    /// Skip.
    pub const S: u8 = 0x01;
}

/// Errors raised by I/O configuration or a device.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    #[error("unit .{unit:X} is already attached")]
    DuplicateUnit { unit: u32 },

    #[error("cannot fetch command doubleword at .{addr:X}: {source}")]
    CommandFetch {
        addr: u32,
        #[source]
        source: MemoryFault,
    },

    #[error("device .{unit:X}: {message}")]
    Device { unit: u32, message: String },
}

/// How a device answered an I/O instruction; selects CC1/CC2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoResponse {
    /// Operation accepted, no status to report.
    Accepted,
    /// Accepted; status and command address are available (CC2).
    Status,
    /// Not accepted: queue full or device not ready (CC1).
    Busy,
}

impl IoResponse {
    /// Bits ORed into CC.
    pub fn cc(self) -> u8 {
        match self {
            IoResponse::Accepted => 0,
            IoResponse::Status => 0x4,
            IoResponse::Busy => 0x8,
        }
    }
}

/// A decoded command doubleword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDoubleword {
    pub order: u8,
    pub byte_address: u32,
    pub flags: u8,
    pub byte_count: u16,
}

impl CommandDoubleword {
    pub fn decode(w0: u32, w1: u32) -> Self {
        Self {
            order: (w0 >> 24) as u8,
            byte_address: w0 & 0x7_ffff,
            flags: (w1 >> 24) as u8,
            byte_count: w1 as u16,
        }
    }

    /// Read the command at doubleword address `dw_addr`.
    pub fn fetch(mem: &Memory, dw_addr: u32) -> Result<Self, IoError> {
        let addr = dw_addr << 1;
        let read = |a: u32| {
            mem.read_word(a)
                .map_err(|source| IoError::CommandFetch { addr: a, source })
        };
        Ok(Self::decode(read(addr)?, read(addr + 1)?))
    }

    /// Order type: the two low bits when nonzero, else the low nibble.
    pub fn order_type(&self) -> u8 {
        match self.order & 0x3 {
            0 => self.order & 0xf,
            t => t,
        }
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// A peripheral I/O processor as seen by the CPU.
///
/// Devices that complete asynchronously keep the [`InterruptLine`] handed to
/// [`attach`](IoProcessor::attach) and call [`request_interrupt`] from their
/// own thread, buffering the acknowledgement status for AIO.
pub trait IoProcessor: Send {
    /// Unit address selected by bits 21-31 of the I/O instruction address.
    fn unit(&self) -> u32;

    fn name(&self) -> &str;

    /// Called once when the device joins a processor.
    fn attach(&mut self, _line: InterruptLine) {}

    /// Start the operation described by the command doubleword at
    /// `command_dw` (a doubleword address).
    fn start_io(&mut self, mem: &mut Memory, command_dw: u32) -> Result<IoResponse, IoError>;

    fn test_io(&mut self) -> IoResponse;

    fn halt_io(&mut self) -> IoResponse;

    /// Test device: the response and a device status word.
    fn test_device(&mut self) -> (IoResponse, u32);

    /// Status word reported after SIO/TIO/HIO.
    fn status(&self) -> u32;

    /// Doubleword address of the current command.
    fn command_dword_addr(&self) -> u32;

    /// Whether an interrupt is waiting to be acknowledged.
    fn interrupt_pending(&self) -> bool;

    /// Consume the pending interrupt and return its status (0 when none).
    fn acknowledge(&mut self) -> u32;

    /// Return to the ready state.
    fn reset(&mut self);
}

/// Raise the processor's I/O interrupt on behalf of a device.
pub fn request_interrupt(line: &InterruptLine) {
    line.raise(IO_INTERRUPT);
}

/// The set of attached devices, in attachment order.
#[derive(Default)]
pub struct IopManager {
    devices: Vec<Box<dyn IoProcessor>>,
}

impl IopManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device. Unit addresses must be unique.
    pub fn add(&mut self, device: Box<dyn IoProcessor>) -> Result<(), IoError> {
        let unit = device.unit();
        if self.get(unit).is_some() {
            return Err(IoError::DuplicateUnit { unit });
        }
        tracing::info!(unit, name = device.name(), "I/O processor attached");
        self.devices.push(device);
        Ok(())
    }

    pub fn get(&self, unit: u32) -> Option<&dyn IoProcessor> {
        self.devices.iter().find(|d| d.unit() == unit).map(|d| d.as_ref())
    }

    pub fn get_mut(&mut self, unit: u32) -> Option<&mut (dyn IoProcessor + 'static)> {
        self.devices.iter_mut().find(|d| d.unit() == unit).map(|d| d.as_mut())
    }

    /// The first device (in attachment order) with an interrupt pending.
    pub fn first_pending(&mut self) -> Option<&mut (dyn IoProcessor + 'static)> {
        self.devices.iter_mut().find(|d| d.interrupt_pending()).map(|d| d.as_mut())
    }

    pub fn reset(&mut self) {
        self.devices.iter_mut().for_each(|d| d.reset());
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Unit addresses in attachment order.
    pub fn units(&self) -> Vec<u32> {
        self.devices.iter().map(|d| d.unit()).collect()
    }
}

impl std::fmt::Debug for IopManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.devices.iter().map(|d| (d.unit(), d.name().to_string())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        unit: u32,
        pending: bool,
    }

    impl IoProcessor for Stub {
        fn unit(&self) -> u32 {
            self.unit
        }
        fn name(&self) -> &str {
            "stub"
        }
        fn start_io(&mut self, _: &mut Memory, _: u32) -> Result<IoResponse, IoError> {
            Ok(IoResponse::Accepted)
        }
        fn test_io(&mut self) -> IoResponse {
            IoResponse::Accepted
        }
        fn halt_io(&mut self) -> IoResponse {
            IoResponse::Accepted
        }
        fn test_device(&mut self) -> (IoResponse, u32) {
            (IoResponse::Accepted, 0)
        }
        fn status(&self) -> u32 {
            0
        }
        fn command_dword_addr(&self) -> u32 {
            0
        }
        fn interrupt_pending(&self) -> bool {
            self.pending
        }
        fn acknowledge(&mut self) -> u32 {
            std::mem::take(&mut self.pending) as u32
        }
        fn reset(&mut self) {
            self.pending = false;
        }
    }

    #[test]
    fn test_duplicate_unit() {
        let mut mgr = IopManager::new();
        mgr.add(Box::new(Stub { unit: 0x2, pending: false })).unwrap();
        let err = mgr.add(Box::new(Stub { unit: 0x2, pending: false })).unwrap_err();
        assert!(matches!(err, IoError::DuplicateUnit { unit: 2 }));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_first_pending() {
        let mut mgr = IopManager::new();
        mgr.add(Box::new(Stub { unit: 0x1, pending: false })).unwrap();
        mgr.add(Box::new(Stub { unit: 0x3, pending: true })).unwrap();
        assert_eq!(mgr.first_pending().map(|d| d.unit()), Some(3));
        mgr.reset();
        assert!(mgr.first_pending().is_none());
    }

    #[test]
    fn test_command_decode() {
        let cmd = CommandDoubleword::decode(0x0200_1000, 0x2000_0050);
        assert_eq!(cmd.order_type(), order::READ);
        assert_eq!(cmd.byte_address, 0x1000);
        assert!(cmd.has_flag(flags::CC));
        assert_eq!(cmd.byte_count, 0x50);
        assert_eq!(CommandDoubleword::decode(0x0400_0000, 0).order_type(), order::SENSE);
    }

    #[test]
    fn test_response_cc() {
        assert_eq!(IoResponse::Busy.cc(), 8);
        assert_eq!(IoResponse::Status.cc(), 4);
    }
}
