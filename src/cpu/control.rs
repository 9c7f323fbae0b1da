//! Threaded run control.
//!
//! A [`CpuRunner`] moves the processor onto a worker thread so the host
//! stays responsive. Requests arrive over a channel and are only looked at
//! between instructions; interrupts are raised through the processor's
//! [`InterruptLine`] from any thread.

use crate::cpu::execute::{Cpu, CpuSnapshot, CpuState};
use crate::cpu::fault::CpuError;
use crate::cpu::interrupt::InterruptLine;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Instructions executed between looks at the request channel.
const BATCH: u64 = 1000;

/// Longest a waiting processor sleeps before checking for requests.
const IDLE_POLL: Duration = Duration::from_millis(5);

enum Command {
    Start,
    Step(u64, Sender<Result<CpuSnapshot, CpuError>>),
    Stop(Sender<CpuSnapshot>),
    Snapshot(Sender<CpuSnapshot>),
}

/// Errors talking to the worker thread.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("runner thread is gone")]
    Disconnected,

    #[error("runner thread panicked")]
    Panicked,

    #[error(transparent)]
    Cpu(#[from] CpuError),
}

/// Handle to a processor running on its own thread.
pub struct CpuRunner {
    commands: Sender<Command>,
    line: InterruptLine,
    handle: Option<JoinHandle<Cpu>>,
}

impl CpuRunner {
    /// Move `cpu` onto a new worker thread. It stays stopped until
    /// [`start`](Self::start) or [`step`](Self::step).
    pub fn spawn(cpu: Cpu) -> Self {
        let (tx, rx) = channel();
        let line = cpu.interrupt_line();
        let handle = thread::spawn(move || worker(cpu, rx));
        Self {
            commands: tx,
            line,
            handle: Some(handle),
        }
    }

    fn send(&self, command: Command) -> Result<(), RunnerError> {
        self.commands.send(command).map_err(|_| RunnerError::Disconnected)
    }

    /// Run freely until stopped, a breakpoint, or an error.
    pub fn start(&self) -> Result<(), RunnerError> {
        self.send(Command::Start)
    }

    /// Stop free running and execute `count` instructions.
    pub fn step(&self, count: u64) -> Result<CpuSnapshot, RunnerError> {
        let (tx, rx) = channel();
        self.send(Command::Step(count, tx))?;
        Ok(rx.recv().map_err(|_| RunnerError::Disconnected)??)
    }

    /// Stop at the next instruction boundary.
    pub fn stop(&self) -> Result<CpuSnapshot, RunnerError> {
        let (tx, rx) = channel();
        self.send(Command::Stop(tx))?;
        rx.recv().map_err(|_| RunnerError::Disconnected)
    }

    pub fn snapshot(&self) -> Result<CpuSnapshot, RunnerError> {
        let (tx, rx) = channel();
        self.send(Command::Snapshot(tx))?;
        rx.recv().map_err(|_| RunnerError::Disconnected)
    }

    /// Interrupt line of the processor being run.
    pub fn interrupt_line(&self) -> &InterruptLine {
        &self.line
    }

    /// End the worker thread and take the processor back.
    pub fn shutdown(mut self) -> Result<Cpu, RunnerError> {
        let handle = self.handle.take().ok_or(RunnerError::Disconnected)?;
        drop(self);
        handle.join().map_err(|_| RunnerError::Panicked)
    }
}

impl Drop for CpuRunner {
    fn drop(&mut self) {
        // Replacing the sender disconnects the worker, which then exits.
        let (tx, _) = channel();
        self.commands = tx;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker(mut cpu: Cpu, commands: Receiver<Command>) -> Cpu {
    let mut running = false;
    loop {
        let command = if running {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };

        match command {
            Some(Command::Start) => {
                tracing::info!(ia = cpu.psd().ia, "run");
                cpu.resume();
                running = true;
            }
            Some(Command::Step(count, reply)) => {
                running = false;
                let result = cpu.run_limited(count).map(|_| cpu.snapshot());
                let _ = reply.send(result);
            }
            Some(Command::Stop(reply)) => {
                running = false;
                cpu.stop();
                let _ = reply.send(cpu.snapshot());
            }
            Some(Command::Snapshot(reply)) => {
                let _ = reply.send(cpu.snapshot());
            }
            None => {}
        }

        if !running {
            continue;
        }
        let outcome = match cpu.state() {
            CpuState::Waiting => cpu.idle(IDLE_POLL).map(|_| ()),
            _ => cpu.run_limited(BATCH).map(|_| ()),
        };
        if outcome.is_err() || matches!(cpu.state(), CpuState::Stopped | CpuState::Error) {
            running = false;
        }
    }
    cpu
}
