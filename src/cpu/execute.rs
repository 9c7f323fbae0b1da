//! CPU execution engine for the Sigma.
//!
//! Implements the fetch-execute cycle, operand resolution, and the trap and
//! interrupt exchange protocols. Instruction semantics live in the handler
//! modules under `ops`; this file only moves control between them.

use crate::config::MachineConfig;
use crate::cpu::decode::{AddrMode, ExecContext, InstructionWord, Operand};
use crate::cpu::fault::{CpuError, Exception, ExecResult, Fault};
use crate::cpu::interrupt::{InterruptLine, CLOCK_INTERRUPTS, MAPPED_VECTOR};
use crate::cpu::memory::{Memory, MemoryFault};
use crate::cpu::ops::system::XPSD_ADVANCE;
use crate::cpu::registers::{Psd, BANK_SIZE};
use crate::cpu::table::{self, OpKind};
use crate::cpu::trace::IaTracer;
use crate::iop::{IoError, IoProcessor, IopManager};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const IA_MASK: u32 = 0x1_ffff;

/// Deepest chain of EXU instructions executing one another.
pub const MAX_EXECUTE_DEPTH: usize = 32;

const XPSD_OPCODE: u8 = 0x0F;

/// Opcodes allowed in an interrupt vector: XPSD and the modify-and-test family.
const INTERRUPT_OPCODES: [u8; 4] = [0x0F, 0x33, 0x53, 0x73];

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Fetching and executing instructions.
    Running,
    /// Halted at an instruction boundary by the host or a breakpoint.
    Stopped,
    /// Executed WAIT; resumes when an interrupt becomes pending.
    Waiting,
    /// A fatal error was reported; only reset recovers.
    Error,
}

/// Stop on the `count`-th arrival at `addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub addr: u32,
    pub count: u32,
}

/// Serializable view of the processor for debugging and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub state: CpuState,
    pub psd: Psd,
    /// The active register bank.
    pub registers: [u32; BANK_SIZE],
    pub instruction_count: u64,
    /// Rendered IA trace, oldest first.
    pub trace: Vec<String>,
}

/// Best-effort wall clock raising the clock interrupts.
#[derive(Debug)]
struct Clock {
    interval: Option<Duration>,
    batch: u32,
    countdown: u32,
    start: Instant,
}

impl Clock {
    fn new(config: &MachineConfig) -> Self {
        let batch = config.clock_batch.max(1);
        Self {
            interval: (config.clock_interval_ms > 0)
                .then(|| Duration::from_millis(config.clock_interval_ms)),
            batch,
            countdown: batch,
            start: Instant::now(),
        }
    }

    fn restart(&mut self) {
        self.countdown = self.batch;
        self.start = Instant::now();
    }

    /// Count one instruction; true when a batch ends and the interval elapsed.
    fn tick(&mut self) -> bool {
        if self.interval.is_none() {
            return false;
        }
        self.countdown -= 1;
        if self.countdown > 0 {
            return false;
        }
        self.countdown = self.batch;
        self.due()
    }

    fn due(&mut self) -> bool {
        match self.interval {
            Some(interval) if self.start.elapsed() >= interval => {
                self.start += interval;
                true
            }
            _ => false,
        }
    }

    fn remaining(&self) -> Option<Duration> {
        self.interval.map(|i| i.saturating_sub(self.start.elapsed()))
    }
}

/// The Sigma CPU.
pub struct Cpu {
    pub(crate) psd: Psd,
    /// Main memory, including the register banks it overlays.
    pub(crate) mem: Memory,
    pub(crate) interrupts: InterruptLine,
    pub(crate) iops: IopManager,
    tracer: IaTracer,
    config: MachineConfig,
    state: CpuState,
    /// Instructions executed since reset.
    count: u64,
    breakpoint: Option<Breakpoint>,
    /// Word of the instruction being executed (for the IA trace).
    current: u32,
    exu_depth: usize,
    /// Set when a run resumes; the breakpoint is not checked for the
    /// instruction it resumes at.
    skip_breakpoint: bool,
    clock: Clock,
}

impl Cpu {
    /// Create a processor for `config`, reset and ready to run at the
    /// configured reset address. The configuration is expected to be valid.
    pub fn new(config: MachineConfig) -> Self {
        let mut cpu = Self {
            psd: Psd::default(),
            mem: Memory::new(config.memory_bytes),
            interrupts: InterruptLine::new(),
            iops: IopManager::new(),
            tracer: IaTracer::new(config.trace_depth),
            clock: Clock::new(&config),
            config,
            state: CpuState::Running,
            count: 0,
            breakpoint: None,
            current: 0,
            exu_depth: 0,
            skip_breakpoint: true,
        };
        cpu.reset();
        cpu
    }

    /// Reset the processor: zero PSD and registers, clear the paging tables
    /// and interrupt state, reset every device. Core memory is kept so a
    /// loaded image survives.
    pub fn reset(&mut self) {
        self.mem.reset();
        self.interrupts.with(|c| c.reset());
        self.iops.reset();
        self.tracer.reset();
        self.psd = Psd {
            ia: self.config.reset_address & IA_MASK,
            ..Psd::default()
        };
        self.sync_mode();
        self.sync_inhibits();
        self.state = CpuState::Running;
        self.count = 0;
        self.current = 0;
        self.exu_depth = 0;
        self.skip_breakpoint = true;
        self.clock.restart();
    }

    // ==================== Host interface ====================

    pub fn state(&self) -> CpuState {
        self.state
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn psd(&self) -> &Psd {
        &self.psd
    }

    /// Replace the whole PSD, keeping memory and interrupt inhibits in step.
    pub fn set_psd(&mut self, psd: Psd) {
        self.psd = Psd {
            ia: psd.ia & IA_MASK,
            ..psd
        };
        self.sync_mode();
        self.sync_inhibits();
    }

    /// Set the instruction address without recording a trace entry.
    pub fn set_entry(&mut self, addr: u32) {
        self.psd.ia = addr & IA_MASK;
    }

    /// Register `r` of the active bank.
    pub fn register(&self, r: usize) -> u32 {
        self.reg(r)
    }

    pub fn set_register(&mut self, r: usize, value: u32) {
        self.set_reg(r, value);
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    /// Physical read bypassing the map; `None` beyond the end of memory.
    pub fn read_word(&self, addr: u32) -> Option<u32> {
        self.mem.peek(addr)
    }

    /// Physical write bypassing the map and protection.
    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<(), MemoryFault> {
        self.mem.poke(addr, value)
    }

    /// Seed physical memory with a block of words.
    pub fn load_words(&mut self, origin: u32, words: &[u32]) -> Result<(), MemoryFault> {
        self.mem.load_words(origin, words)
    }

    /// A handle devices and hosts use to raise interrupts from any thread.
    pub fn interrupt_line(&self) -> InterruptLine {
        self.interrupts.clone()
    }

    /// Request an interrupt at vector `loc`.
    pub fn interrupt(&self, loc: u32) {
        self.interrupts.raise(loc);
    }

    /// Attach an I/O processor, handing it the interrupt line.
    pub fn attach_iop(&mut self, mut device: Box<dyn IoProcessor>) -> Result<(), IoError> {
        device.attach(self.interrupts.clone());
        self.iops.add(device)
    }

    pub fn iops(&self) -> &IopManager {
        &self.iops
    }

    pub fn set_breakpoint(&mut self, addr: u32, count: u32) {
        self.breakpoint = Some(Breakpoint {
            addr: addr & IA_MASK,
            count,
        });
    }

    pub fn clear_breakpoint(&mut self) {
        self.breakpoint = None;
    }

    pub fn breakpoint(&self) -> Option<Breakpoint> {
        self.breakpoint
    }

    pub fn tracer(&self) -> &IaTracer {
        &self.tracer
    }

    /// Instructions executed since reset.
    pub fn instruction_count(&self) -> u64 {
        self.count
    }

    /// Halt at the current instruction boundary.
    pub fn stop(&mut self) {
        if self.state == CpuState::Running {
            tracing::info!(ia = self.psd.ia, "stopped");
            self.state = CpuState::Stopped;
        }
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            state: self.state,
            psd: self.psd,
            registers: *self.mem.registers().active(),
            instruction_count: self.count,
            trace: self.tracer.render(),
        }
    }

    // ==================== Run control ====================

    /// Leave `Stopped`, and dispatch a pending interrupt out of `Waiting`.
    fn ensure_runnable(&mut self) -> Result<(), CpuError> {
        match self.state {
            CpuState::Error => Err(CpuError::NotRunning(self.state)),
            CpuState::Stopped => {
                self.resume();
                Ok(())
            }
            CpuState::Waiting if self.interrupts.is_pending() => {
                self.state = CpuState::Running;
                self.service_interrupt()
            }
            _ => Ok(()),
        }
    }

    /// Execute a single instruction, ignoring the breakpoint. A waiting
    /// processor only checks for a pending interrupt.
    pub fn step(&mut self) -> Result<(), CpuError> {
        let waiting = self.state == CpuState::Waiting;
        self.ensure_runnable()?;
        if waiting || self.state != CpuState::Running {
            return Ok(());
        }
        self.skip_breakpoint = true;
        self.cycle()
    }

    /// Leave the stopped state. The next run does not break at the
    /// current address.
    pub fn resume(&mut self) {
        if self.state == CpuState::Stopped {
            self.state = CpuState::Running;
        }
        self.skip_breakpoint = true;
    }

    /// Run until stop, WAIT, breakpoint or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        self.run_limited(u64::MAX)
    }

    /// Run for at most `max_steps` instructions. After a resume the
    /// breakpoint is not checked for the first instruction, so a run can
    /// continue from it.
    pub fn run_limited(&mut self, max_steps: u64) -> Result<u64, CpuError> {
        self.ensure_runnable()?;
        let start = self.count;
        while self.state == CpuState::Running && self.count - start < max_steps {
            if !std::mem::take(&mut self.skip_breakpoint) && self.at_breakpoint() {
                tracing::info!(ia = self.psd.ia, "breakpoint");
                self.state = CpuState::Stopped;
                break;
            }
            self.cycle()?;
        }
        Ok(self.count - start)
    }

    /// While waiting, block for at most `timeout` until an interrupt is
    /// pending and dispatch it. Returns whether the processor woke up.
    pub fn idle(&mut self, timeout: Duration) -> Result<bool, CpuError> {
        if self.state != CpuState::Waiting {
            return Ok(false);
        }
        let wake = self.clock.remaining().map_or(timeout, |r| r.min(timeout));
        if !self.interrupts.wait_pending(wake) && self.clock.due() {
            self.raise_clock();
        }
        if !self.interrupts.is_pending() {
            return Ok(false);
        }
        self.state = CpuState::Running;
        self.service_interrupt()?;
        Ok(true)
    }

    fn at_breakpoint(&mut self) -> bool {
        match &mut self.breakpoint {
            Some(bp) if bp.addr == self.psd.ia => {
                bp.count = bp.count.saturating_sub(1);
                bp.count == 0
            }
            _ => false,
        }
    }

    /// One fetch-execute cycle followed by clock and interrupt checks.
    fn cycle(&mut self) -> Result<(), CpuError> {
        let ia = self.psd.ia;
        self.psd.ia = (ia + 1) & IA_MASK;
        self.exu_depth = 0;
        let outcome = match self.mem.fetch_instruction(ia) {
            Ok(word) => {
                self.current = word;
                self.execute(word, ExecContext::Normal)
            }
            Err(fault) => Err(fault.into()),
        };
        self.count += 1;
        match outcome {
            Ok(()) => {}
            Err(Exception::Fault(fault)) => self.trap(fault)?,
            Err(Exception::Fatal(err)) => return Err(self.fail(err)),
        }
        if self.clock.tick() {
            self.raise_clock();
        }
        if self.interrupts.is_pending() {
            self.service_interrupt()?;
        }
        Ok(())
    }

    fn raise_clock(&self) {
        for loc in CLOCK_INTERRUPTS {
            self.interrupts.raise(loc);
        }
    }

    /// Record a fatal error and enter the error state.
    fn fail(&mut self, err: CpuError) -> CpuError {
        tracing::error!(ia = self.psd.ia, error = %err, "CPU stopped");
        self.state = CpuState::Error;
        err
    }

    // ==================== Dispatch ====================

    /// Execute one instruction word.
    pub(crate) fn execute(&mut self, word: u32, ctx: ExecContext) -> ExecResult {
        let word = InstructionWord(word);
        let desc = table::descriptor(word.opcode());
        let handler = match desc.kind {
            OpKind::Implemented(handler) => handler,
            OpKind::Unimplemented => return Err(Fault::Unimplemented.into()),
            OpKind::Nonexistent => return Err(Fault::NonexistentInstruction.into()),
            OpKind::PrivilegedNonexistent if self.psd.slave => {
                return Err(Fault::PrivilegedNonexistent.into())
            }
            OpKind::PrivilegedNonexistent => return Err(Fault::NonexistentInstruction.into()),
        };
        if desc.privileged && self.psd.slave {
            return Err(Fault::PrivilegedInstruction.into());
        }
        let op = self.resolve(desc.mode, word)?;
        tracing::trace!(ia = self.psd.ia.wrapping_sub(1), word = word.0, mnemonic = desc.mnemonic, ea = op.ea);
        handler(self, op, ctx)
    }

    /// Execute the subject of an EXU.
    pub(crate) fn execute_subject(&mut self, addr: u32, word: u32, ctx: ExecContext) -> ExecResult {
        if self.exu_depth >= MAX_EXECUTE_DEPTH {
            return Err(CpuError::ExecuteChain {
                addr,
                depth: MAX_EXECUTE_DEPTH,
            }
            .into());
        }
        self.exu_depth += 1;
        let result = self.execute(word, ctx);
        self.exu_depth -= 1;
        result
    }

    /// Compute the operand of `word` for addressing mode `mode`.
    fn resolve(&self, mode: AddrMode, word: InstructionWord) -> Result<Operand, Exception> {
        let index = match word.x() {
            0 => 0,
            x => self.reg(x),
        };
        let base = || -> Result<u32, MemoryFault> {
            if word.indirect() {
                Ok(self.mem.read_word(word.reference())? & IA_MASK)
            } else {
                Ok(word.reference())
            }
        };
        let ea = match mode {
            AddrMode::Immediate => {
                if word.indirect() {
                    return Err(Fault::NonexistentInstruction.into());
                }
                word.immediate() as u32
            }
            AddrMode::Byte => (base()? << 2).wrapping_add(index),
            AddrMode::Halfword => (base()? << 1).wrapping_add(index),
            AddrMode::Word => base()?.wrapping_add(index),
            AddrMode::Doubleword => (base()? & !1).wrapping_add(index << 1),
            AddrMode::Shift => base()?,
            AddrMode::None => word.reference(),
        };
        Ok(Operand {
            word,
            r: word.r(),
            ea,
            index,
        })
    }

    /// Fetch the word at a trap or interrupt vector with the map off.
    fn vector_word(&mut self, vector: u32) -> Result<u32, MemoryFault> {
        self.mem.set_map_enabled(false);
        let word = self.mem.fetch_instruction(vector);
        self.mem.set_map_enabled(self.psd.mapped);
        word
    }

    /// Deliver a synchronous fault through its trap vector.
    fn trap(&mut self, fault: Fault) -> Result<(), CpuError> {
        let vector = fault.vector();
        tracing::debug!(vector, ia = self.psd.ia.wrapping_sub(1), %fault, "trap");
        let word = match self.vector_word(vector) {
            Ok(word) => word,
            Err(f) => {
                return Err(self.fail(CpuError::DoubleFault {
                    vector,
                    fault: f.into(),
                }))
            }
        };
        let opcode = InstructionWord(word).opcode();
        if opcode != XPSD_OPCODE {
            return Err(self.fail(CpuError::InvalidTrapVector { vector, word, opcode }));
        }
        self.current = word;
        self.psd.ia = self.psd.ia.wrapping_sub(1) & IA_MASK;
        match self.execute(word, ExecContext::InTrap(vector)) {
            Ok(()) => {}
            Err(Exception::Fault(f)) => {
                return Err(self.fail(CpuError::DoubleFault { vector, fault: f }))
            }
            Err(Exception::Fatal(err)) => return Err(self.fail(err)),
        }
        if let Some(function) = fault.function() {
            self.psd.cc |= function;
            if InstructionWord(word).has(XPSD_ADVANCE) {
                self.psd.ia = (self.psd.ia + function as u32) & IA_MASK;
            }
        }
        Ok(())
    }

    /// Dispatch the active interrupt, if one is pending.
    fn service_interrupt(&mut self) -> Result<(), CpuError> {
        let Some(vector) = self.interrupts.with(|c| c.take_pending()) else {
            return Ok(());
        };
        if self.state == CpuState::Waiting {
            self.state = CpuState::Running;
        }
        let word = match self.vector_word(vector) {
            Ok(word) => word,
            Err(f) => {
                return Err(self.fail(CpuError::DoubleFault {
                    vector,
                    fault: f.into(),
                }))
            }
        };
        let opcode = InstructionWord(word).opcode();
        if !INTERRUPT_OPCODES.contains(&opcode) {
            return Err(self.fail(CpuError::InvalidInterruptVector { vector, word, opcode }));
        }
        tracing::debug!(vector, ia = self.psd.ia, "interrupt");
        self.current = word;
        self.mem.set_write_key(0);
        if vector != MAPPED_VECTOR {
            self.mem.set_map_enabled(false);
        }
        let result = self.execute(word, ExecContext::InTrap(vector));
        self.mem.set_map_enabled(self.psd.mapped);
        self.mem.set_write_key(self.psd.write_key);
        match result {
            Ok(()) => Ok(()),
            Err(Exception::Fault(fault)) => Err(self.fail(CpuError::DoubleFault { vector, fault })),
            Err(Exception::Fatal(err)) => Err(self.fail(err)),
        }
    }

    // ==================== Handler support ====================

    #[inline]
    pub(crate) fn reg(&self, r: usize) -> u32 {
        self.mem.registers().get(r)
    }

    #[inline]
    pub(crate) fn reg_signed(&self, r: usize) -> i32 {
        self.mem.registers().get_signed(r)
    }

    #[inline]
    pub(crate) fn set_reg(&mut self, r: usize, value: u32) {
        self.mem.registers_mut().set(r, value);
    }

    #[inline]
    pub(crate) fn pair(&self, r: usize) -> u64 {
        self.mem.registers().get_pair(r)
    }

    #[inline]
    pub(crate) fn set_pair(&mut self, r: usize, value: u64) {
        self.mem.registers_mut().set_pair(r, value);
    }

    /// Transfer control, recording the branch in the IA trace.
    pub(crate) fn set_ia(&mut self, to: u32) {
        let from = self.psd.ia.wrapping_sub(1) & IA_MASK;
        self.tracer.record(from, self.current, to & IA_MASK);
        self.psd.ia = to & IA_MASK;
    }

    /// Install a new PSD (LPSD/XPSD).
    pub(crate) fn load_psd(&mut self, next: Psd) {
        self.set_ia(next.ia);
        self.psd = Psd {
            ia: self.psd.ia,
            ..next
        };
        self.sync_mode();
        self.sync_inhibits();
    }

    pub(crate) fn set_rp(&mut self, rp: u8) {
        self.psd.rp = rp & 0x1f;
        self.mem.registers_mut().select(self.psd.rp as u32);
    }

    pub(crate) fn set_inhibits(&mut self, counter: bool, io: bool, external: bool) {
        self.psd.counter_inhibit = counter;
        self.psd.io_inhibit = io;
        self.psd.external_inhibit = external;
        self.sync_inhibits();
    }

    pub(crate) fn enter_wait(&mut self) {
        tracing::info!(ia = self.psd.ia, "waiting for interrupt");
        self.state = CpuState::Waiting;
    }

    pub(crate) fn sense_switches(&self) -> u8 {
        self.config.sense_switches
    }

    /// Push the PSD mode bits into memory.
    fn sync_mode(&mut self) {
        let psd = self.psd;
        self.mem.set_map_enabled(psd.mapped);
        self.mem.set_slave_mode(psd.slave);
        self.mem.set_write_key(psd.write_key);
        self.mem.registers_mut().select(psd.rp as u32);
    }

    /// Push the PSD inhibits into the controller and rescan.
    fn sync_inhibits(&self) {
        let psd = self.psd;
        self.interrupts
            .with(|c| c.set_inhibits(psd.counter_inhibit, psd.io_inhibit, psd.external_inhibit));
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("psd", &self.psd)
            .field("count", &self.count)
            .field("iops", &self.iops)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;

    const START: u32 = 0x26;

    fn cpu_with(program: &[u32]) -> Cpu {
        let mut cpu = Cpu::new(MachineConfig {
            clock_interval_ms: 0,
            ..MachineConfig::default()
        });
        cpu.load_words(START, program).unwrap();
        cpu
    }

    /// Route trap `vector` through an XPSD at `psd_area`, continuing at `handler`.
    fn install_vector(cpu: &mut Cpu, vector: u32, psd_area: u32, handler: u32, flags: u32) {
        cpu.write_word(vector, encode(0x0F, 0, 0, psd_area, false) | flags).unwrap();
        cpu.write_word(psd_area + 2, handler).unwrap();
        cpu.write_word(psd_area + 3, 0).unwrap();
    }

    #[test]
    fn test_reset_state() {
        let cpu = Cpu::default();
        assert_eq!(cpu.state(), CpuState::Running);
        assert_eq!(cpu.psd().ia, START);
        assert_eq!(cpu.instruction_count(), 0);
    }

    #[test]
    fn test_load_immediate() {
        let mut cpu = cpu_with(&[0x2200_0005]);
        cpu.step().unwrap();
        assert_eq!(cpu.register(0), 5);
        assert_eq!(cpu.psd().cc, 0x2);
        assert_eq!(cpu.psd().ia, START + 1);
    }

    #[test]
    fn test_branch_on_conditions_reset() {
        // R=4 against CC=4: a selected bit is set, no branch
        let mut cpu = cpu_with(&[0x6840_0010]);
        cpu.set_psd(Psd { cc: 4, ia: START, ..Psd::default() });
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, START + 1);

        let mut cpu = cpu_with(&[0x6880_0010]);
        cpu.set_psd(Psd { cc: 4, ia: START, ..Psd::default() });
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, 0x10);
        let entry = cpu.tracer().last().unwrap();
        assert_eq!((entry.from, entry.to), (START, 0x10));
    }

    #[test]
    fn test_nonexistent_instruction_trap() {
        let mut cpu = cpu_with(&[0x0000_0000]);
        install_vector(&mut cpu, 0x40, 0x100, 0x200, 0);
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, 0x200);
        assert_eq!(cpu.psd().cc, 0x8);
        assert_eq!(cpu.read_word(0x100).map(|w| w & IA_MASK), Some(START));
    }

    #[test]
    fn test_trap_advance() {
        let mut cpu = cpu_with(&[0x0000_0000]);
        install_vector(&mut cpu, 0x40, 0x100, 0x200, XPSD_ADVANCE);
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, 0x208);
    }

    #[test]
    fn test_privileged_in_slave_mode() {
        let mut cpu = cpu_with(&[encode(0x0E, 0, 0, 0x300, false)]);
        install_vector(&mut cpu, 0x40, 0x100, 0x200, 0);
        cpu.set_psd(Psd { ia: START, slave: true, ..Psd::default() });
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, 0x200);
        assert_eq!(cpu.psd().cc, 0x2);
        assert!(!cpu.psd().slave);
    }

    #[test]
    fn test_invalid_trap_vector() {
        let mut cpu = cpu_with(&[0x0000_0000]);
        let err = cpu.step().unwrap_err();
        assert!(matches!(err, CpuError::InvalidTrapVector { vector: 0x40, opcode: 0, .. }));
        assert_eq!(cpu.state(), CpuState::Error);
        assert!(matches!(cpu.step(), Err(CpuError::NotRunning(CpuState::Error))));
    }

    #[test]
    fn test_unimplemented_trap() {
        // floating add word
        let mut cpu = cpu_with(&[encode(0x3D, 0, 0, 0x300, false)]);
        install_vector(&mut cpu, 0x41, 0x110, 0x210, 0);
        cpu.step().unwrap();
        assert_eq!(cpu.psd().ia, 0x210);
        assert_eq!(cpu.psd().cc, 0);
    }

    #[test]
    fn test_breakpoint_count() {
        // BCR 0 always branches: a one-instruction loop
        let mut cpu = cpu_with(&[encode(0x68, 0, 0, START, false)]);
        cpu.set_breakpoint(START, 3);
        assert_eq!(cpu.run_limited(100).unwrap(), 3);
        assert_eq!(cpu.state(), CpuState::Stopped);
        assert_eq!(cpu.psd().ia, START);
        // Resuming executes the instruction under the breakpoint first
        assert_eq!(cpu.run_limited(100).unwrap(), 1);
    }

    #[test]
    fn test_run_limited_count() {
        let mut cpu = cpu_with(&[encode(0x68, 0, 0, START, false)]);
        assert_eq!(cpu.run_limited(25).unwrap(), 25);
        assert_eq!(cpu.instruction_count(), 25);
        assert_eq!(cpu.state(), CpuState::Running);
    }

    #[test]
    fn test_wait_then_interrupt() {
        let mut cpu = cpu_with(&[encode(0x2E, 0, 0, 0, false)]);
        cpu.write_word(0x5c, encode(0x0F, 0, 0, 0x120, false)).unwrap();
        cpu.write_word(0x122, 0x400).unwrap();
        assert_eq!(cpu.run_limited(10).unwrap(), 1);
        assert_eq!(cpu.state(), CpuState::Waiting);
        assert!(!cpu.idle(Duration::ZERO).unwrap());

        cpu.interrupt_line().with(|c| {
            c.apply_group(crate::cpu::interrupt::GroupOp::ArmEnable, 0, 0x0020);
        });
        cpu.interrupt(0x5c);
        assert!(cpu.idle(Duration::from_millis(10)).unwrap());
        assert_eq!(cpu.state(), CpuState::Running);
        assert_eq!(cpu.psd().ia, 0x400);
        assert_eq!(cpu.read_word(0x120).map(|w| w & IA_MASK), Some(START + 1));
    }

    #[test]
    fn test_execute_chain_limit() {
        let mut cpu = cpu_with(&[encode(0x67, 0, 0, START, false)]);
        let err = cpu.step().unwrap_err();
        assert!(matches!(err, CpuError::ExecuteChain { addr: START, .. }));
    }

    #[test]
    fn test_execute_subject() {
        let mut cpu = cpu_with(&[encode(0x67, 0, 0, 0x300, false)]);
        cpu.write_word(0x300, 0x2270_0009).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.register(7), 9);
        assert_eq!(cpu.psd().ia, START + 1);
    }

    #[test]
    fn test_indexed_operand() {
        // LW,3 .300,1 with R1 = 2
        let mut cpu = cpu_with(&[encode(0x32, 3, 1, 0x300, false)]);
        cpu.set_register(1, 2);
        cpu.write_word(0x302, 0xdead_beef).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.register(3), 0xdead_beef);
    }

    #[test]
    fn test_indirect_operand() {
        let mut cpu = cpu_with(&[encode(0x32, 3, 0, 0x300, true)]);
        cpu.write_word(0x300, 0x0400).unwrap();
        cpu.write_word(0x400, 77).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.register(3), 77);
    }

    #[test]
    fn test_indirect_immediate_is_nonexistent() {
        let mut cpu = cpu_with(&[0x2200_0005 | 0x8000_0000]);
        install_vector(&mut cpu, 0x40, 0x100, 0x200, 0);
        cpu.step().unwrap();
        assert_eq!(cpu.psd().cc, 0x8);
        assert_eq!(cpu.register(0), 0);
    }

    #[test]
    fn test_reset_keeps_core() {
        let mut cpu = cpu_with(&[0x2200_0005]);
        cpu.run_limited(1).unwrap();
        cpu.reset();
        assert_eq!(cpu.read_word(START), Some(0x2200_0005));
        assert_eq!(cpu.register(0), 0);
        assert_eq!(cpu.psd().ia, START);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut cpu = cpu_with(&[0x2200_0005]);
        cpu.step().unwrap();
        let snap = cpu.snapshot();
        assert_eq!(snap.registers[0], 5);
        let json = serde_json::to_string(&snap).unwrap();
        let back: CpuSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
