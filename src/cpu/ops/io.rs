//! I/O instructions.
//!
//! The low eleven bits of the effective address select the device. An
//! unassigned unit answers with CC1 and CC2 set. When the device reports
//! status and R is nonzero, R receives the current command doubleword
//! address and R|1 the status word.

use crate::cpu::decode::{ExecContext, Operand};
use crate::cpu::execute::Cpu;
use crate::cpu::fault::{CpuError, Exception, ExecResult};
use crate::cpu::memory::Memory;
use crate::cpu::registers::{CC_NEGATIVE, CC_POSITIVE};
use crate::iop::{IoProcessor, IoResponse};

const UNIT_MASK: u32 = 0x7ff;
const NO_DEVICE: u8 = 0xc;

fn store_status(cpu: &mut Cpu, r: usize, command: u32, status: u32) {
    if r != 0 {
        cpu.set_reg(r, command);
        cpu.set_reg(r | 1, status);
    }
}

/// Run `f` against the addressed device. Returns `None` (with CC set) when
/// no device is attached at that unit.
fn with_device<T>(
    cpu: &mut Cpu,
    op: &Operand,
    f: impl FnOnce(&mut dyn IoProcessor, &mut Memory) -> T,
) -> Option<(T, u32, u32)> {
    let unit = op.ea & UNIT_MASK;
    cpu.psd.cc &= CC_POSITIVE | CC_NEGATIVE;
    let Some(device) = cpu.iops.get_mut(unit) else {
        tracing::warn!(unit, "no I/O processor at unit");
        cpu.psd.cc |= NO_DEVICE;
        return None;
    };
    let result = f(&mut *device, &mut cpu.mem);
    Some((result, device.command_dword_addr(), device.status()))
}

/// Start I/O with the command doubleword address in register 0.
pub(crate) fn sio(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    let unit = op.ea & UNIT_MASK;
    let command = cpu.reg(0);
    let Some((response, dw, status)) = with_device(cpu, &op, |d, mem| d.start_io(mem, command)) else {
        return Ok(());
    };
    let response = response.map_err(|source| Exception::from(CpuError::Io { unit, source }))?;
    tracing::debug!(unit, command, ?response, "start I/O");
    cpu.psd.cc |= response.cc();
    if response == IoResponse::Status {
        store_status(cpu, op.r, dw, status);
    }
    Ok(())
}

/// Test I/O.
pub(crate) fn tio(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    if let Some((response, dw, status)) = with_device(cpu, &op, |d, _| d.test_io()) {
        cpu.psd.cc |= response.cc();
        if response != IoResponse::Busy {
            store_status(cpu, op.r, dw, status);
        }
    }
    Ok(())
}

/// Test device; R|1 receives the device status word.
pub(crate) fn tdv(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    if let Some(((response, device_status), dw, _)) = with_device(cpu, &op, |d, _| d.test_device()) {
        cpu.psd.cc |= response.cc();
        if response != IoResponse::Busy {
            store_status(cpu, op.r, dw, device_status);
        }
    }
    Ok(())
}

/// Halt I/O; status is always returned.
pub(crate) fn hio(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    if let Some((response, dw, status)) = with_device(cpu, &op, |d, _| d.halt_io()) {
        cpu.psd.cc |= response.cc();
        store_status(cpu, op.r, dw, status);
    }
    Ok(())
}

/// Acknowledge I/O interrupt: the first device with an interrupt pending
/// gives up its acknowledgement status.
pub(crate) fn aio(cpu: &mut Cpu, op: Operand, _: ExecContext) -> ExecResult {
    if op.ea & 0x700 != 0 {
        return Err(CpuError::InvalidAcknowledge { addr: op.ea }.into());
    }
    cpu.psd.cc &= CC_POSITIVE | CC_NEGATIVE;
    let status = cpu.iops.first_pending().map(|d| d.acknowledge());
    match status {
        Some(status) => {
            if op.r != 0 {
                cpu.set_reg(op.r, status);
            }
        }
        None => cpu.psd.cc |= NO_DEVICE,
    }
    Ok(())
}
