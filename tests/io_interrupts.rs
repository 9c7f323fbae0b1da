//! I/O processors and the priority interrupt system seen from guest code.

use sigma::cpu::decode::{encode, encode_immediate};
use sigma::cpu::interrupt::{GroupOp, InterruptLine};
use sigma::iop::{order, request_interrupt, CommandDoubleword};
use sigma::{Cpu, CpuState, IoError, IoProcessor, IoResponse, MachineConfig, Memory};

const START: u32 = 0x26;
const XPSD: u8 = 0x0F;

fn machine() -> Cpu {
    Cpu::new(MachineConfig {
        clock_interval_ms: 0,
        ..MachineConfig::default()
    })
}

fn install_vector(cpu: &mut Cpu, vector: u32, area: u32, handler: u32) {
    cpu.write_word(vector, encode(XPSD, 0, 0, area, false)).unwrap();
    cpu.load_words(area + 2, &[handler, 0]).unwrap();
}

/// A device that completes every order at once and interrupts.
struct Tape {
    unit: u32,
    line: Option<InterruptLine>,
    command_dw: u32,
    pending: bool,
}

impl Tape {
    fn new(unit: u32) -> Self {
        Self {
            unit,
            line: None,
            command_dw: 0,
            pending: false,
        }
    }
}

impl IoProcessor for Tape {
    fn unit(&self) -> u32 {
        self.unit
    }

    fn name(&self) -> &str {
        "tape"
    }

    fn attach(&mut self, line: InterruptLine) {
        self.line = Some(line);
    }

    fn start_io(&mut self, mem: &mut Memory, command_dw: u32) -> Result<IoResponse, IoError> {
        let command = CommandDoubleword::fetch(mem, command_dw)?;
        if command.order_type() != order::READ {
            return Ok(IoResponse::Busy);
        }
        self.command_dw = command_dw;
        self.pending = true;
        if let Some(line) = &self.line {
            request_interrupt(line);
        }
        Ok(IoResponse::Status)
    }

    fn test_io(&mut self) -> IoResponse {
        IoResponse::Status
    }

    fn halt_io(&mut self) -> IoResponse {
        IoResponse::Status
    }

    fn test_device(&mut self) -> (IoResponse, u32) {
        (IoResponse::Status, 0)
    }

    fn status(&self) -> u32 {
        0x0c00_0000
    }

    fn command_dword_addr(&self) -> u32 {
        self.command_dw
    }

    fn interrupt_pending(&self) -> bool {
        self.pending
    }

    fn acknowledge(&mut self) -> u32 {
        if std::mem::take(&mut self.pending) {
            0x0800_0000 | self.unit
        } else {
            0
        }
    }

    fn reset(&mut self) {
        self.pending = false;
    }
}

#[test]
fn test_start_io_interrupt_and_acknowledge() {
    let mut cpu = machine();
    cpu.attach_iop(Box::new(Tape::new(3))).unwrap();

    // SIO,2 .3 ; WAIT
    cpu.load_words(START, &[encode(0x4C, 2, 0, 3, false), encode(0x2E, 0, 0, 0, false)])
        .unwrap();
    // Read order for 16 bytes at byte .800
    cpu.load_words(0x100, &[0x0200_0800, 0x0000_0010]).unwrap();
    cpu.set_register(0, 0x80);

    install_vector(&mut cpu, 0x5c, 0x120, 0x200);
    // AIO,4 .0 ; WAIT
    cpu.load_words(0x200, &[encode(0x6E, 4, 0, 0, false), encode(0x2E, 0, 0, 0, false)])
        .unwrap();
    cpu.interrupt_line().with(|c| c.apply_group(GroupOp::ArmEnable, 0, 0x0020));

    let executed = cpu.run_limited(10).unwrap();
    assert_eq!(executed, 3);
    assert_eq!(cpu.state(), CpuState::Waiting);
    assert_eq!(cpu.register(2), 0x80);
    assert_eq!(cpu.register(3), 0x0c00_0000);
    assert_eq!(cpu.register(4), 0x0800_0003);
    // The interrupted program resumes after the SIO
    assert_eq!(cpu.read_word(0x120).map(|w| w & 0x1_ffff), Some(START + 1));
    assert!(cpu.interrupt_line().state(0x5c).active);
}

#[test]
fn test_missing_unit_sets_cc() {
    let mut cpu = machine();
    cpu.attach_iop(Box::new(Tape::new(3))).unwrap();
    cpu.load_words(START, &[encode(0x4C, 2, 0, 7, false)]).unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.psd().cc & 0xc, 0xc);
    assert_eq!(cpu.register(2), 0);
}

#[test]
fn test_acknowledge_without_pending_device() {
    let mut cpu = machine();
    cpu.attach_iop(Box::new(Tape::new(3))).unwrap();
    cpu.set_register(4, 0x55);
    cpu.load_words(START, &[encode(0x6E, 4, 0, 0, false)]).unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.psd().cc & 0xc, 0xc);
    assert_eq!(cpu.register(4), 0x55);
}

#[test]
fn test_duplicate_unit_rejected() {
    let mut cpu = machine();
    cpu.attach_iop(Box::new(Tape::new(3))).unwrap();
    let err = cpu.attach_iop(Box::new(Tape::new(3))).unwrap_err();
    assert!(matches!(err, IoError::DuplicateUnit { unit: 3 }));
    assert_eq!(cpu.iops().units(), vec![3]);
}

#[test]
fn test_counter_reaching_zero_raises_its_vector() {
    let mut cpu = machine();
    // WAIT ; LI,1 7
    cpu.load_words(START, &[encode(0x2E, 0, 0, 0, false), encode_immediate(0x22, 1, 7)])
        .unwrap();
    // Counter 1 at .52 counts the word at .300 down by one.
    cpu.write_word(0x52, encode(0x33, 0xF, 0, 0x300, false)).unwrap();
    cpu.write_word(0x300, 1).unwrap();
    install_vector(&mut cpu, 0x58, 0x140, 0x400);
    // LI,2 9 ; WAIT
    cpu.load_words(0x400, &[encode_immediate(0x22, 2, 9), encode(0x2E, 0, 0, 0, false)])
        .unwrap();
    // Arm and enable .52 and its zero vector .58
    cpu.interrupt_line()
        .with(|c| c.apply_group(GroupOp::ArmEnable, 0, 0x8000 | 0x0200));
    cpu.interrupt(0x52);

    let executed = cpu.run_limited(10).unwrap();
    assert_eq!(executed, 4);
    assert_eq!(cpu.state(), CpuState::Waiting);
    assert_eq!(cpu.read_word(0x300), Some(0));
    assert_eq!(cpu.register(1), 7);
    assert_eq!(cpu.register(2), 9);
    assert_eq!(cpu.read_word(0x140).map(|w| w & 0x1_ffff), Some(START + 2));

    let line = cpu.interrupt_line();
    assert!(line.state(0x52).armed);
    assert!(!line.state(0x52).active);
    assert!(line.state(0x58).active);
}

#[test]
fn test_counter_not_yet_zero() {
    let mut cpu = machine();
    // WAIT ; WAIT
    let wait = encode(0x2E, 0, 0, 0, false);
    cpu.load_words(START, &[wait, wait]).unwrap();
    cpu.write_word(0x52, encode(0x33, 0xF, 0, 0x300, false)).unwrap();
    cpu.write_word(0x300, 5).unwrap();
    cpu.interrupt_line()
        .with(|c| c.apply_group(GroupOp::ArmEnable, 0, 0x8000 | 0x0200));
    cpu.interrupt(0x52);
    cpu.run_limited(10).unwrap();
    assert_eq!(cpu.read_word(0x300), Some(4));
    assert!(!cpu.interrupt_line().state(0x58).waiting);
    assert!(!cpu.interrupt_line().state(0x58).active);
}

#[test]
fn test_external_waits_behind_io() {
    let line = InterruptLine::new();
    line.with(|c| {
        c.set_inhibits(false, false, false);
        c.apply_group(GroupOp::ArmEnable, 0, 0x0020);
        c.apply_group(GroupOp::ArmEnable, 2, 0x8000);
    });
    line.raise(0x5c);
    line.raise(0x60);
    // The active I/O level holds off the lower external level
    assert_eq!(line.with(|c| c.active()), Some(0x5c));
    assert!(line.state(0x60).waiting);
    line.clear(0x5c);
    assert_eq!(line.with(|c| c.active()), Some(0x60));
}
