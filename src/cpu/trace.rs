//! Branch trace ring.
//!
//! Every explicit change of IA (branches, exchanges, traps) is recorded as a
//! (from, word, to) triple. The ring keeps the most recent entries and
//! silently drops older ones.

use crate::asm::disasm::disassemble_instruction;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// One IA transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Address of the instruction that transferred control.
    pub from: u32,
    /// That instruction's word.
    pub word: u32,
    /// New IA.
    pub to: u32,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ".{:05X}  {:08X}  {:<24} -> .{:05X}",
            self.from,
            self.word,
            disassemble_instruction(self.word),
            self.to
        )
    }
}

/// Fixed-capacity ring of [`TraceEntry`].
#[derive(Debug, Clone)]
pub struct IaTracer {
    entries: VecDeque<TraceEntry>,
    capacity: usize,
}

impl IaTracer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, from: u32, word: u32, to: u32) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(TraceEntry { from, word, to });
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    /// The most recent entry.
    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.back()
    }

    /// One rendered line per entry, oldest first.
    pub fn render(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

impl Default for IaTracer {
    fn default() -> Self {
        Self::new(32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_drops_oldest() {
        let mut tracer = IaTracer::new(3);
        for i in 0..5 {
            tracer.record(i, 0, i + 1);
        }
        assert_eq!(tracer.len(), 3);
        let froms: Vec<u32> = tracer.entries().map(|e| e.from).collect();
        assert_eq!(froms, vec![2, 3, 4]);
        assert_eq!(tracer.last().map(|e| e.to), Some(5));
    }

    #[test]
    fn test_reset() {
        let mut tracer = IaTracer::default();
        tracer.record(1, 2, 3);
        tracer.reset();
        assert!(tracer.is_empty());
        assert_eq!(tracer.capacity(), 32);
    }

    #[test]
    fn test_render() {
        let mut tracer = IaTracer::new(4);
        tracer.record(0x100, 0x6800_0200, 0x200);
        let lines = tracer.render();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(".00100  68000200  B"));
        assert!(lines[0].ends_with("-> .00200"));
    }
}
