//! Priority interrupt controller.
//!
//! Every vector location from .00 to .13F carries an (armed, waiting,
//! enabled, active) state. Locations .50 onward are scanned in fixed bands;
//! an active vector blocks everything after it, so at most one vector is
//! active at a time. The controller is shared between the fetch loop and
//! I/O processors through an [`InterruptLine`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Number of interrupt/trap vector slots.
pub const INTERRUPT_VECTORS: usize = 320;

/// Counter-equals-zero vectors start here.
pub const COUNTER_ZERO_BASE: u32 = 0x58;
/// I/O interrupt vector raised by I/O processors.
pub const IO_INTERRUPT: u32 = 0x5c;
/// Control panel interrupt.
pub const PANEL_INTERRUPT: u32 = 0x5d;
/// Clock counter vectors raised by the software clock.
pub const CLOCK_INTERRUPTS: [u32; 2] = [0x54, 0x55];
/// The one vector whose handler instruction runs with mapping left on.
pub const MAPPED_VECTOR: u32 = 0x55;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorState {
    pub armed: bool,
    pub waiting: bool,
    pub enabled: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// Power on/off: cannot be disabled.
    Unmaskable,
    /// Counters and parity: enable bit only, no PSD inhibit.
    Enabled,
    Counter,
    Io,
    External,
}

struct Band {
    first: u32,
    last: u32,
    gate: Gate,
}

const BANDS: [Band; 5] = [
    Band { first: 0x50, last: 0x51, gate: Gate::Unmaskable },
    Band { first: 0x52, last: 0x57, gate: Gate::Enabled },
    Band { first: 0x58, last: 0x5b, gate: Gate::Counter },
    Band { first: 0x5c, last: 0x5d, gate: Gate::Io },
    Band { first: 0x60, last: 0x13f, gate: Gate::External },
];

/// Group operation selected by a write-direct interrupt control function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    Disarm,
    ArmEnable,
    ArmDisable,
    Enable,
    Disable,
    /// Enable levels whose mask bit is one, disable the rest.
    SetEnables,
    Trigger,
}

impl GroupOp {
    /// Decode the three-bit function code; code 0 is undefined.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(GroupOp::Disarm),
            2 => Some(GroupOp::ArmEnable),
            3 => Some(GroupOp::ArmDisable),
            4 => Some(GroupOp::Enable),
            5 => Some(GroupOp::Disable),
            6 => Some(GroupOp::SetEnables),
            7 => Some(GroupOp::Trigger),
            _ => None,
        }
    }
}

/// Vector locations covered by an interrupt group, highest priority first.
/// Group 0 is the twelve internal levels .52-.5D; groups 2-15 are sixteen
/// external levels each; group 1 selects nothing.
pub fn group_levels(group: u32) -> std::ops::Range<u32> {
    match group {
        0 => 0x52..0x5e,
        2..=15 => {
            let base = 0x60 + ((group - 2) << 4);
            base..base + 16
        }
        _ => 0..0,
    }
}

/// Interrupt state tables and group inhibits.
#[derive(Debug, Clone)]
pub struct InterruptController {
    vectors: Vec<VectorState>,
    counter_inhibit: bool,
    io_inhibit: bool,
    external_inhibit: bool,
    pending: bool,
}

impl InterruptController {
    /// All vectors disarmed and disabled, all groups inhibited.
    pub fn new() -> Self {
        Self {
            vectors: vec![VectorState::default(); INTERRUPT_VECTORS],
            counter_inhibit: true,
            io_inhibit: true,
            external_inhibit: true,
            pending: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn slot(&mut self, loc: u32) -> Option<&mut VectorState> {
        self.vectors.get_mut(loc as usize)
    }

    /// State of one vector.
    pub fn state(&self, loc: u32) -> VectorState {
        self.vectors.get(loc as usize).copied().unwrap_or_default()
    }

    /// Request an interrupt. An armed vector becomes waiting and is disarmed;
    /// an unarmed one ignores the request.
    pub fn interrupt(&mut self, loc: u32) {
        let fired = match self.slot(loc) {
            Some(v) if v.armed => {
                v.waiting = true;
                v.armed = false;
                true
            }
            _ => false,
        };
        if fired {
            self.check();
        }
    }

    /// Finish servicing a vector: deactivate, re-arm, rescan.
    pub fn clear(&mut self, loc: u32) {
        if let Some(v) = self.slot(loc) {
            v.active = false;
            v.armed = true;
        }
        self.check();
    }

    /// Deactivate the highest-priority active vector, re-arming it only if
    /// `rearm` is set, then rescan.
    pub fn clear_active(&mut self, rearm: bool) {
        if let Some(loc) = self.active() {
            if let Some(v) = self.slot(loc) {
                v.active = false;
                v.armed = rearm;
            }
        }
        self.check();
    }

    fn gate_open(&self, gate: Gate, v: &VectorState) -> bool {
        match gate {
            Gate::Unmaskable => true,
            Gate::Enabled => v.enabled,
            Gate::Counter => !self.counter_inhibit && v.enabled,
            Gate::Io => !self.io_inhibit && v.enabled,
            Gate::External => !self.external_inhibit && v.enabled,
        }
    }

    /// Priority scan. Stops at the first active vector; otherwise activates
    /// the first waiting vector whose gate is open and raises the pending flag.
    pub fn check(&mut self) {
        for band in &BANDS {
            for loc in band.first..=band.last {
                let v = self.vectors[loc as usize];
                if v.active {
                    return;
                }
                if v.waiting && self.gate_open(band.gate, &v) {
                    let slot = &mut self.vectors[loc as usize];
                    slot.waiting = false;
                    slot.active = true;
                    self.pending = true;
                    return;
                }
            }
        }
    }

    /// The highest-priority active vector, if any.
    pub fn active(&self) -> Option<u32> {
        BANDS
            .iter()
            .flat_map(|band| band.first..=band.last)
            .find(|&loc| self.vectors[loc as usize].active)
    }

    /// Whether an activation is waiting to be dispatched.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Consume the pending flag and return the vector to dispatch.
    pub fn take_pending(&mut self) -> Option<u32> {
        if !std::mem::take(&mut self.pending) {
            return None;
        }
        self.active()
    }

    /// Current (counter, io, external) group inhibits.
    pub fn inhibits(&self) -> (bool, bool, bool) {
        (self.counter_inhibit, self.io_inhibit, self.external_inhibit)
    }

    /// Replace the group inhibits and rescan.
    pub fn set_inhibits(&mut self, counter: bool, io: bool, external: bool) {
        self.counter_inhibit = counter;
        self.io_inhibit = io;
        self.external_inhibit = external;
        self.check();
    }

    /// Apply a write-direct group operation. Bit 15 of `mask` selects the
    /// first level of the group.
    pub fn apply_group(&mut self, op: GroupOp, group: u32, mask: u32) {
        for (i, loc) in group_levels(group).enumerate() {
            let selected = mask & (0x8000 >> i) != 0;
            if op == GroupOp::Trigger {
                if selected {
                    self.interrupt(loc);
                }
                continue;
            }
            let Some(v) = self.slot(loc) else { continue };
            match op {
                GroupOp::SetEnables => v.enabled = selected,
                _ if !selected => {}
                GroupOp::Disarm => *v = VectorState { enabled: v.enabled, ..VectorState::default() },
                GroupOp::ArmEnable => *v = VectorState { armed: true, enabled: true, ..VectorState::default() },
                GroupOp::ArmDisable => *v = VectorState { armed: true, ..VectorState::default() },
                GroupOp::Enable => v.enabled = true,
                GroupOp::Disable => v.enabled = false,
                GroupOp::Trigger => {}
            }
        }
        self.check();
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

struct Shared {
    controller: Mutex<InterruptController>,
    pending: AtomicBool,
    signal: Condvar,
}

/// Cloneable handle to the interrupt controller.
///
/// Every mutation happens under one lock; the pending flag is mirrored in
/// an atomic so the fetch loop can poll it without locking.
#[derive(Clone)]
pub struct InterruptLine {
    shared: Arc<Shared>,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                controller: Mutex::new(InterruptController::new()),
                pending: AtomicBool::new(false),
                signal: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InterruptController> {
        self.shared.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the controller.
    pub fn with<R>(&self, f: impl FnOnce(&mut InterruptController) -> R) -> R {
        let mut ctrl = self.lock();
        let result = f(&mut ctrl);
        let pending = ctrl.is_pending();
        self.shared.pending.store(pending, Ordering::Release);
        if pending {
            self.shared.signal.notify_all();
        }
        result
    }

    /// Request an interrupt at vector `loc`. Safe to call from any thread.
    pub fn raise(&self, loc: u32) {
        self.with(|c| c.interrupt(loc));
    }

    /// Deactivate and re-arm vector `loc`.
    pub fn clear(&self, loc: u32) {
        self.with(|c| c.clear(loc));
    }

    /// Cheap check of the pending flag.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Block until an activation is pending or `timeout` elapses.
    pub fn wait_pending(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .shared
            .signal
            .wait_timeout_while(guard, timeout, |c| !c.is_pending())
            .unwrap_or_else(PoisonError::into_inner);
        guard.is_pending()
    }

    /// Snapshot of one vector's state.
    pub fn state(&self, loc: u32) -> VectorState {
        self.lock().state(loc)
    }
}

impl Default for InterruptLine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptLine")
            .field("pending", &self.is_pending())
            .finish()
    }
}
