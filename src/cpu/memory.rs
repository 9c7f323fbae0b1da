//! Sigma memory unit.
//!
//! Physical core is a flat array of 32-bit words. On top of it sit:
//! - the register overlay: word addresses 0-15 always reach the active
//!   register bank, bypassing translation and protection,
//! - a 256-entry page map (512-word pages), consulted when mapping is on,
//! - a two-bit access code per page, enforced in slave mode,
//! - a two-bit write lock per physical page, checked against the write key.

use crate::cpu::registers::RegisterFile;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Vendor default physical memory size in bytes.
pub const DEFAULT_MEMORY_BYTES: usize = 512 * 1024;

/// Words per page.
pub const PAGE_WORDS: u32 = 512;

/// Entries in each of the page tables.
pub const PAGE_COUNT: usize = 256;

const BYTE_ADDR_MASK: u32 = 0x7_ffff;
const HALFWORD_ADDR_MASK: u32 = 0x3_ffff;
const WORD_ADDR_MASK: u32 = 0x1_ffff;
const PAGE_OFFSET_MASK: u32 = 0x1ff;

/// Kind of access being checked against the page protection code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

/// Per-page access protection code, as loaded by the memory-control instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageAccess {
    /// Code 0: read, write and execute.
    #[default]
    ReadWriteExecute,
    /// Code 1: read and execute.
    ReadExecute,
    /// Code 2: read only.
    ReadOnly,
    /// Code 3: no access.
    NoAccess,
}

impl PageAccess {
    /// Decode a two-bit protection code.
    pub fn from_code(code: u8) -> Self {
        match code & 0x3 {
            0 => PageAccess::ReadWriteExecute,
            1 => PageAccess::ReadExecute,
            2 => PageAccess::ReadOnly,
            _ => PageAccess::NoAccess,
        }
    }

    /// Whether this code permits the given access.
    pub fn permits(self, access: Access) -> bool {
        match access {
            Access::Read => self != PageAccess::NoAccess,
            Access::Execute => matches!(self, PageAccess::ReadWriteExecute | PageAccess::ReadExecute),
            Access::Write => self == PageAccess::ReadWriteExecute,
        }
    }
}

/// A failed memory access. These are guest-visible and delivered through
/// the non-allowed-operation trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryFault {
    #[error("memory protection fault at word .{addr:X}")]
    Protection { addr: u32 },

    #[error("memory write lock fault at word .{addr:X} (lock {lock}, key {key})")]
    WriteLock { addr: u32, lock: u8, key: u8 },

    #[error("nonexistent memory at physical word .{addr:X}")]
    Nonexistent { addr: u32 },
}

/// Sigma main memory with the register overlay and paging tables.
#[derive(Clone)]
pub struct Memory {
    words: Vec<u32>,
    registers: RegisterFile,
    map: Vec<u32>,
    protection: Vec<PageAccess>,
    locks: Vec<u8>,
    map_enabled: bool,
    slave_mode: bool,
    write_key: u8,
}

impl Memory {
    /// Create a zeroed memory of `size_bytes` bytes (rounded down to whole words).
    pub fn new(size_bytes: usize) -> Self {
        Self {
            words: vec![0; size_bytes / 4],
            registers: RegisterFile::new(),
            map: vec![0; PAGE_COUNT],
            protection: vec![PageAccess::default(); PAGE_COUNT],
            locks: vec![0; PAGE_COUNT],
            map_enabled: false,
            slave_mode: false,
            write_key: 0,
        }
    }

    /// Physical size in words.
    pub fn size_words(&self) -> usize {
        self.words.len()
    }

    /// Clear registers, page tables and access mode. Core is kept.
    pub fn reset(&mut self) {
        self.registers.reset();
        self.map.iter_mut().for_each(|m| *m = 0);
        self.protection.iter_mut().for_each(|p| *p = PageAccess::default());
        self.locks.iter_mut().for_each(|l| *l = 0);
        self.map_enabled = false;
        self.slave_mode = false;
        self.write_key = 0;
    }

    // ==================== Access mode ====================

    pub fn set_map_enabled(&mut self, enabled: bool) {
        self.map_enabled = enabled;
    }

    pub fn map_enabled(&self) -> bool {
        self.map_enabled
    }

    pub fn set_slave_mode(&mut self, slave: bool) {
        self.slave_mode = slave;
    }

    pub fn slave_mode(&self) -> bool {
        self.slave_mode
    }

    pub fn set_write_key(&mut self, key: u8) {
        self.write_key = key & 0x3;
    }

    pub fn write_key(&self) -> u8 {
        self.write_key
    }

    /// The register banks overlaid on word addresses 0-15.
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    // ==================== Translation ====================

    /// Resolve a word address (>= 16) to a physical word index, applying
    /// the page map, protection and write locks as the current mode requires.
    fn translate(&self, word_addr: u32, access: Access) -> Result<usize, MemoryFault> {
        let mut physical = word_addr;
        if self.map_enabled {
            let page = (word_addr >> 9) as usize;
            if self.slave_mode && !self.protection[page].permits(access) {
                return Err(MemoryFault::Protection { addr: word_addr });
            }
            physical = self.map[page] | (word_addr & PAGE_OFFSET_MASK);
            if access == Access::Write {
                let lock = self.locks[(physical >> 9) as usize & (PAGE_COUNT - 1)];
                if lock != 0 && self.write_key != 0 && lock != self.write_key {
                    return Err(MemoryFault::WriteLock {
                        addr: word_addr,
                        lock,
                        key: self.write_key,
                    });
                }
            }
        }
        let index = physical as usize;
        if index >= self.words.len() {
            return Err(MemoryFault::Nonexistent { addr: physical });
        }
        Ok(index)
    }

    fn load(&self, word_addr: u32, access: Access) -> Result<u32, MemoryFault> {
        if word_addr < 16 {
            return Ok(self.registers.get(word_addr as usize));
        }
        let index = self.translate(word_addr, access)?;
        Ok(self.words[index])
    }

    fn store(&mut self, word_addr: u32, f: impl FnOnce(u32) -> u32) -> Result<(), MemoryFault> {
        if word_addr < 16 {
            let r = word_addr as usize;
            let old = self.registers.get(r);
            self.registers.set(r, f(old));
            return Ok(());
        }
        let index = self.translate(word_addr, Access::Write)?;
        self.words[index] = f(self.words[index]);
        Ok(())
    }

    // ==================== Guest access ====================

    /// Read a byte, sign-extended. The address is masked to 19 bits.
    pub fn read_byte(&self, byte_addr: u32) -> Result<i8, MemoryFault> {
        let byte_addr = byte_addr & BYTE_ADDR_MASK;
        let word = self.load(byte_addr >> 2, Access::Read)?;
        let shift = 24 - ((byte_addr & 3) << 3);
        Ok((word >> shift) as u8 as i8)
    }

    /// Write a byte. The address is masked to 19 bits.
    pub fn write_byte(&mut self, byte_addr: u32, value: u8) -> Result<(), MemoryFault> {
        let byte_addr = byte_addr & BYTE_ADDR_MASK;
        let shift = 24 - ((byte_addr & 3) << 3);
        self.store(byte_addr >> 2, |word| {
            (word & !(0xff << shift)) | (value as u32) << shift
        })
    }

    /// Read a halfword, sign-extended. The address is masked to 18 bits.
    pub fn read_halfword(&self, halfword_addr: u32) -> Result<i16, MemoryFault> {
        let halfword_addr = halfword_addr & HALFWORD_ADDR_MASK;
        let word = self.load(halfword_addr >> 1, Access::Read)?;
        let shift = 16 - ((halfword_addr & 1) << 4);
        Ok((word >> shift) as u16 as i16)
    }

    /// Write a halfword. The address is masked to 18 bits.
    pub fn write_halfword(&mut self, halfword_addr: u32, value: u16) -> Result<(), MemoryFault> {
        let halfword_addr = halfword_addr & HALFWORD_ADDR_MASK;
        let shift = 16 - ((halfword_addr & 1) << 4);
        self.store(halfword_addr >> 1, |word| {
            (word & !(0xffff << shift)) | (value as u32) << shift
        })
    }

    /// Read a word. The address is masked to 17 bits.
    pub fn read_word(&self, word_addr: u32) -> Result<u32, MemoryFault> {
        self.load(word_addr & WORD_ADDR_MASK, Access::Read)
    }

    /// Write a word. The address is masked to 17 bits.
    pub fn write_word(&mut self, word_addr: u32, value: u32) -> Result<(), MemoryFault> {
        self.store(word_addr & WORD_ADDR_MASK, |_| value)
    }

    /// Read a word for execution; checks the execute permission instead of read.
    pub fn fetch_instruction(&self, word_addr: u32) -> Result<u32, MemoryFault> {
        self.load(word_addr & WORD_ADDR_MASK, Access::Execute)
    }

    // ==================== Page tables ====================

    /// Load `count` page-map entries starting at `page`, one source byte per
    /// entry, reading bytes from word address `word_addr` onward.
    pub fn load_memory_map(&mut self, word_addr: u32, count: usize, page: usize) -> Result<(), MemoryFault> {
        let base = word_addr << 2;
        for i in 0..count {
            let byte = self.read_byte(base.wrapping_add(i as u32))? as u8;
            self.map[(page + i) & (PAGE_COUNT - 1)] = (byte as u32) << 9;
        }
        Ok(())
    }

    /// Load `count` access-protection codes starting at `page`, four two-bit
    /// codes per source byte, most significant pair first.
    pub fn load_access_protection(&mut self, word_addr: u32, count: usize, page: usize) -> Result<(), MemoryFault> {
        let codes = self.read_packed_pairs(word_addr, count)?;
        for (i, code) in codes.into_iter().enumerate() {
            self.protection[(page + i) & (PAGE_COUNT - 1)] = PageAccess::from_code(code);
        }
        Ok(())
    }

    /// Load `count` write locks starting at `page`, packed like the protection codes.
    pub fn load_write_locks(&mut self, word_addr: u32, count: usize, page: usize) -> Result<(), MemoryFault> {
        let locks = self.read_packed_pairs(word_addr, count)?;
        for (i, lock) in locks.into_iter().enumerate() {
            self.locks[(page + i) & (PAGE_COUNT - 1)] = lock;
        }
        Ok(())
    }

    fn read_packed_pairs(&self, word_addr: u32, count: usize) -> Result<Vec<u8>, MemoryFault> {
        let base = word_addr << 2;
        let mut out = Vec::with_capacity(count);
        for i in 0..count.div_ceil(4) {
            let byte = self.read_byte(base.wrapping_add(i as u32))? as u8;
            for shift in [6, 4, 2, 0] {
                if out.len() < count {
                    out.push((byte >> shift) & 0x3);
                }
            }
        }
        Ok(out)
    }

    /// Physical page base (word index) for a virtual page.
    pub fn map_entry(&self, page: usize) -> u32 {
        self.map[page & (PAGE_COUNT - 1)]
    }

    pub fn page_access(&self, page: usize) -> PageAccess {
        self.protection[page & (PAGE_COUNT - 1)]
    }

    pub fn write_lock(&self, page: usize) -> u8 {
        self.locks[page & (PAGE_COUNT - 1)]
    }

    // ==================== Host access ====================

    /// Read a word by physical address, bypassing the map and protection.
    /// Addresses 0-15 still reach the active register bank.
    pub fn peek(&self, word_addr: u32) -> Option<u32> {
        if word_addr < 16 {
            return Some(self.registers.get(word_addr as usize));
        }
        self.words.get(word_addr as usize).copied()
    }

    /// Write a word by physical address, bypassing the map and protection.
    pub fn poke(&mut self, word_addr: u32, value: u32) -> Result<(), MemoryFault> {
        if word_addr < 16 {
            self.registers.set(word_addr as usize, value);
            return Ok(());
        }
        match self.words.get_mut(word_addr as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(MemoryFault::Nonexistent { addr: word_addr }),
        }
    }

    /// Copy a block of words into physical memory starting at `origin`.
    pub fn load_words(&mut self, origin: u32, words: &[u32]) -> Result<(), MemoryFault> {
        for (i, &word) in words.iter().enumerate() {
            self.poke(origin + i as u32, word)?;
        }
        Ok(())
    }

    /// Dump a range of physical words (for debugging).
    pub fn dump(&self, start: u32, count: usize) -> Vec<(u32, u32)> {
        (start..start.saturating_add(count as u32))
            .map_while(|addr| self.peek(addr).map(|w| (addr, w)))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_BYTES)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.words.iter().filter(|w| **w != 0).count();
        f.debug_struct("Memory")
            .field("non_zero_words", &non_zero)
            .field("total_words", &self.words.len())
            .field("map_enabled", &self.map_enabled)
            .field("slave_mode", &self.slave_mode)
            .field("write_key", &self.write_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mapped_identity(mem: &mut Memory) {
        // Identity map: page n -> byte n at word .1000 onward.
        for page in 0..PAGE_COUNT as u32 {
            mem.poke(0x1000 + page / 4, 0).unwrap();
        }
        for page in 0..PAGE_COUNT as u32 {
            let word = 0x1000 + page / 4;
            let old = mem.peek(word).unwrap();
            let shift = 24 - (page % 4) * 8;
            mem.poke(word, old | (page & 0xff) << shift).unwrap();
        }
        mem.load_memory_map(0x1000, PAGE_COUNT, 0).unwrap();
    }

    #[test]
    fn test_word_read_write() {
        let mut mem = Memory::default();
        mem.write_word(0x200, 0xdead_beef).unwrap();
        assert_eq!(mem.read_word(0x200).unwrap(), 0xdead_beef);
        assert_eq!(mem.peek(0x200), Some(0xdead_beef));
    }

    #[test]
    fn test_register_overlay() {
        let mut mem = Memory::default();
        mem.write_word(3, 42).unwrap();
        assert_eq!(mem.registers().get(3), 42);

        mem.registers_mut().select(1);
        assert_eq!(mem.read_word(3).unwrap(), 0);
        mem.write_word(3, 7).unwrap();
        mem.registers_mut().select(0);
        assert_eq!(mem.read_word(3).unwrap(), 42);
    }

    #[test]
    fn test_register_overlay_ignores_map() {
        let mut mem = Memory::default();
        mem.registers_mut().set(5, 99);
        mem.set_map_enabled(true);
        mem.set_slave_mode(true);
        mem.protection[0] = PageAccess::NoAccess;
        assert_eq!(mem.read_word(5).unwrap(), 99);
        assert_eq!(mem.read_byte(5 * 4 + 3).unwrap(), 99);
        assert!(mem.read_word(16).is_err());
    }

    #[test]
    fn test_byte_sign_extension() {
        let mut mem = Memory::default();
        mem.write_word(0x40, 0x80_7f_01_ff).unwrap();
        assert_eq!(mem.read_byte(0x100).unwrap(), -128);
        assert_eq!(mem.read_byte(0x101).unwrap(), 127);
        assert_eq!(mem.read_byte(0x102).unwrap(), 1);
        assert_eq!(mem.read_byte(0x103).unwrap(), -1);
    }

    #[test]
    fn test_halfword_access() {
        let mut mem = Memory::default();
        mem.write_halfword(0x80, 0x8001).unwrap();
        mem.write_halfword(0x81, 0x1234).unwrap();
        assert_eq!(mem.read_word(0x40).unwrap(), 0x8001_1234);
        assert_eq!(mem.read_halfword(0x80).unwrap(), -0x7fff);
        assert_eq!(mem.read_halfword(0x81).unwrap(), 0x1234);
    }

    #[test]
    fn test_address_masking() {
        let mut mem = Memory::default();
        mem.write_word(0x2_0020, 5).unwrap();
        assert_eq!(mem.read_word(0x20).unwrap(), 5);
    }

    #[test]
    fn test_nonexistent_memory() {
        let mut mem = Memory::new(64 * 1024);
        assert_eq!(
            mem.read_word(0x4000),
            Err(MemoryFault::Nonexistent { addr: 0x4000 })
        );
        assert!(mem.write_word(0x3fff, 1).is_ok());
    }

    #[test]
    fn test_map_translation() {
        let mut mem = Memory::default();
        // Virtual page 2 -> physical page 5.
        mem.poke(0x300, 0x0000_0500).unwrap();
        mem.load_memory_map(0x300, 4, 0).unwrap();
        assert_eq!(mem.map_entry(2), 5 << 9);

        mem.poke(5 * 512 + 7, 0x1234).unwrap();
        mem.set_map_enabled(true);
        assert_eq!(mem.read_word(2 * 512 + 7).unwrap(), 0x1234);
    }

    #[test]
    fn test_map_page_wraps() {
        let mut mem = Memory::default();
        mem.poke(0x300, 0x0102_0304).unwrap();
        mem.load_memory_map(0x300, 4, 254).unwrap();
        assert_eq!(mem.map_entry(254), 1 << 9);
        assert_eq!(mem.map_entry(255), 2 << 9);
        assert_eq!(mem.map_entry(0), 3 << 9);
        assert_eq!(mem.map_entry(1), 4 << 9);
    }

    #[test]
    fn test_packed_loaders() {
        let mut mem = Memory::default();
        // codes 0,1,2,3 then 3,2,1,0
        mem.poke(0x300, 0b00_01_10_11_11_10_01_00 << 16).unwrap();
        mem.load_access_protection(0x300, 8, 4).unwrap();
        assert_eq!(mem.page_access(4), PageAccess::ReadWriteExecute);
        assert_eq!(mem.page_access(5), PageAccess::ReadExecute);
        assert_eq!(mem.page_access(6), PageAccess::ReadOnly);
        assert_eq!(mem.page_access(7), PageAccess::NoAccess);
        assert_eq!(mem.page_access(8), PageAccess::NoAccess);
        assert_eq!(mem.page_access(11), PageAccess::ReadWriteExecute);

        mem.load_write_locks(0x300, 6, 0).unwrap();
        assert_eq!(mem.write_lock(0), 0);
        assert_eq!(mem.write_lock(3), 3);
        assert_eq!(mem.write_lock(5), 2);
        assert_eq!(mem.write_lock(6), 0);
    }

    #[test]
    fn test_write_lock() {
        let mut mem = Memory::default();
        mapped_identity(&mut mem);
        mem.locks[4] = 2;
        mem.set_map_enabled(true);

        mem.set_write_key(1);
        let addr = 4 * 512 + 10;
        assert!(matches!(mem.write_word(addr, 1), Err(MemoryFault::WriteLock { lock: 2, key: 1, .. })));
        mem.set_write_key(2);
        assert!(mem.write_word(addr, 1).is_ok());
        mem.set_write_key(0);
        assert!(mem.write_word(addr, 2).is_ok());
        // Locks are only enforced while mapping is active.
        mem.set_map_enabled(false);
        mem.set_write_key(3);
        assert!(mem.write_word(addr, 3).is_ok());
    }

    #[test]
    fn test_fetch_needs_execute() {
        let mut mem = Memory::default();
        mapped_identity(&mut mem);
        mem.protection[3] = PageAccess::ReadOnly;
        mem.set_map_enabled(true);
        mem.set_slave_mode(true);
        let addr = 3 * 512;
        assert!(mem.read_word(addr).is_ok());
        assert_eq!(mem.fetch_instruction(addr), Err(MemoryFault::Protection { addr }));
        mem.set_slave_mode(false);
        assert!(mem.fetch_instruction(addr).is_ok());
    }

    #[test]
    fn test_reset_clears_tables() {
        let mut mem = Memory::default();
        mapped_identity(&mut mem);
        mem.locks[1] = 1;
        mem.set_map_enabled(true);
        mem.reset();
        assert!(!mem.map_enabled());
        assert_eq!(mem.map_entry(5), 0);
        assert_eq!(mem.write_lock(1), 0);
        assert_eq!(mem.peek(0x1001), Some(0));
    }

    proptest! {
        #[test]
        fn prop_word_round_trip(addr in 16u32..0x2_0000, value: u32, mapped: bool) {
            let mut mem = Memory::default();
            if mapped {
                mapped_identity(&mut mem);
                mem.set_map_enabled(true);
            }
            mem.write_word(addr, value).unwrap();
            prop_assert_eq!(mem.read_word(addr).unwrap(), value);
        }

        #[test]
        fn prop_byte_composition(addr in 16u32..0x2_0000, value: u32, order in Just(vec![0u32, 1, 2, 3]).prop_shuffle()) {
            let mut bytes = Memory::default();
            for off in order {
                let byte = (value >> (24 - off * 8)) as u8;
                bytes.write_byte(addr * 4 + off, byte).unwrap();
            }
            let mut whole = Memory::default();
            whole.write_word(addr, value).unwrap();
            prop_assert_eq!(bytes.read_word(addr).unwrap(), whole.read_word(addr).unwrap());
        }

        #[test]
        fn prop_protection_truth_table(page in 1usize..PAGE_COUNT, code in 0u8..4, slave: bool) {
            let mut mem = Memory::default();
            mapped_identity(&mut mem);
            let packed = (code as u32) << 30;
            mem.poke(0x1100, packed).unwrap();
            mem.load_access_protection(0x1100, 1, page).unwrap();
            mem.set_map_enabled(true);
            mem.set_slave_mode(slave);

            let access = PageAccess::from_code(code);
            let addr = page as u32 * PAGE_WORDS + 1;
            let allowed = |a: Access| !slave || access.permits(a);
            prop_assert_eq!(mem.read_word(addr).is_ok(), allowed(Access::Read));
            prop_assert_eq!(mem.fetch_instruction(addr).is_ok(), allowed(Access::Execute));
            prop_assert_eq!(mem.write_word(addr, 1).is_ok(), allowed(Access::Write));
        }
    }
}
